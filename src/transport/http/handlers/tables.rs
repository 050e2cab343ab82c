use crate::app::{export, parse_ids, search, SubmissionMode};
use crate::domain::model::OutcomeRecord;
use crate::transport::http::handlers::common::{api_error, batch_response, internal_error, parse_table};
use crate::transport::http::types::{json_422, ApiResponse, AppState, IdsQuery};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

const BATCH_BODY: &str = "[{...}, ...] (a JSON array of records)";

async fn submit(
    state: AppState,
    table: &str,
    mode: SubmissionMode,
    body: Result<Json<Vec<JsonValue>>, JsonRejection>,
) -> Response {
    let table = match parse_table(table) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let Json(items) = match body {
        Ok(v) => v,
        Err(e) => return json_422(e, BATCH_BODY).into_response(),
    };

    match state.service.submit(table, mode, items).await {
        Ok(batch) => batch_response(batch),
        Err(e) => internal_error("Failed to process batch", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/{table}/create/",
    params(("table" = String, Path, description = "Table name (e.g. participant)")),
    request_body = Vec<Object>,
    responses(
        (status = 200, description = "All records created", body = [OutcomeRecord]),
        (status = 207, description = "Some records rejected", body = [OutcomeRecord]),
        (status = 400, description = "All records rejected", body = [OutcomeRecord]),
        (status = 404, description = "Unknown table", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn create_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<Vec<JsonValue>>, JsonRejection>,
) -> Response {
    submit(state, &table, SubmissionMode::Create, body).await
}

#[utoipa::path(
    post,
    path = "/api/{table}/update/",
    params(("table" = String, Path, description = "Table name (e.g. participant)")),
    request_body = Vec<Object>,
    responses(
        (status = 200, description = "All records updated", body = [OutcomeRecord]),
        (status = 207, description = "Some records rejected or not found", body = [OutcomeRecord]),
        (status = 400, description = "All records rejected", body = [OutcomeRecord]),
        (status = 404, description = "Unknown table", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn update_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<Vec<JsonValue>>, JsonRejection>,
) -> Response {
    submit(state, &table, SubmissionMode::Update, body).await
}

#[utoipa::path(
    post,
    path = "/api/{table}/upsert/",
    params(("table" = String, Path, description = "Table name (e.g. participant)")),
    request_body = Vec<Object>,
    responses(
        (status = 200, description = "All records accepted", body = [OutcomeRecord]),
        (status = 207, description = "Some records rejected", body = [OutcomeRecord]),
        (status = 400, description = "All records rejected", body = [OutcomeRecord]),
        (status = 404, description = "Unknown table", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn upsert_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<Vec<JsonValue>>, JsonRejection>,
) -> Response {
    submit(state, &table, SubmissionMode::Upsert, body).await
}

fn required_ids(query: &IdsQuery) -> Result<Vec<String>, Response> {
    let ids = parse_ids(query.ids.as_deref().unwrap_or_default());
    if ids.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Query parameter 'ids' must list at least one identifier",
        ));
    }
    Ok(ids)
}

#[utoipa::path(
    get,
    path = "/api/{table}/",
    params(("table" = String, Path, description = "Table name"), IdsQuery),
    responses(
        (status = 200, description = "All records found", body = [OutcomeRecord]),
        (status = 207, description = "Some records not found", body = [OutcomeRecord]),
        (status = 400, description = "No records found, or no ids given", body = [OutcomeRecord]),
        (status = 404, description = "Unknown table", body = ApiResponse)
    )
)]
pub async fn read_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<IdsQuery>,
) -> Response {
    let table = match parse_table(&table) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let ids = match required_ids(&query) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    match state.service.read_batch(table, &ids).await {
        Ok(batch) => batch_response(batch),
        Err(e) => internal_error("Failed to read records", e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/{table}/delete/",
    params(("table" = String, Path, description = "Table name"), IdsQuery),
    responses(
        (status = 200, description = "All records deleted", body = [OutcomeRecord]),
        (status = 207, description = "Some records not found", body = [OutcomeRecord]),
        (status = 400, description = "No records deleted, or no ids given", body = [OutcomeRecord]),
        (status = 404, description = "Unknown table", body = ApiResponse)
    )
)]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<IdsQuery>,
) -> Response {
    let table = match parse_table(&table) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let ids = match required_ids(&query) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    match state.service.delete_batch(table, &ids).await {
        Ok(batch) => batch_response(batch),
        Err(e) => internal_error("Failed to delete records", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/{table}/export/",
    params(("table" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Tab-separated export of every row", body = String, content_type = "text/tab-separated-values"),
        (status = 404, description = "Unknown table", body = ApiResponse),
        (status = 500, description = "Internal server error", body = ApiResponse)
    )
)]
pub async fn export_handler(State(state): State<AppState>, Path(table): Path<String>) -> Response {
    let table = match parse_table(&table) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let service = &state.service;
    match export::generate_tsv(service.store().as_ref(), service.validator(), table).await {
        Ok(tsv) => (
            [
                (header::CONTENT_TYPE, "text/tab-separated-values; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}.tsv\"", table)),
            ],
            tsv,
        )
            .into_response(),
        Err(e) => internal_error("Failed to export table", e),
    }
}

#[utoipa::path(
    get,
    path = "/tables",
    responses(
        (status = 200, description = "Every table and lookup table", body = ApiResponse),
        (status = 500, description = "Internal server error", body = ApiResponse)
    )
)]
pub async fn dump_handler(State(state): State<AppState>) -> Response {
    match state.service.dump().await {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => internal_error("Failed to list tables", e),
    }
}

/// Rows whose fields equal every `field=value` query pair; unknown fields are ignored.
#[utoipa::path(
    get,
    path = "/search/{table}/",
    params(("table" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Matching rows", body = [Object]),
        (status = 404, description = "Unknown table", body = ApiResponse),
        (status = 500, description = "Internal server error", body = ApiResponse)
    )
)]
pub async fn search_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let table = match parse_table(&table) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let service = &state.service;
    match search::find_records(service.store().as_ref(), service.validator(), table, &params).await {
        Ok(rows) => {
            let rows: Vec<JsonValue> = rows.into_iter().map(JsonValue::Object).collect();
            (StatusCode::OK, Json(rows)).into_response()
        }
        Err(e) => internal_error("Failed to search table", e),
    }
}

#[utoipa::path(
    get,
    path = "/tables/download",
    responses(
        (status = 200, description = "Zip archive with one TSV per table", body = String, content_type = "application/zip"),
        (status = 500, description = "Internal server error", body = ApiResponse)
    )
)]
pub async fn download_handler(State(state): State<AppState>) -> Response {
    let service = &state.service;
    match export::generate_bundle(service.store().as_ref(), service.validator()).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/zip"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"data.zip\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => internal_error("Failed to build table bundle", e),
    }
}
