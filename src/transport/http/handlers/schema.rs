use crate::domain::validate::SchemaError;
use crate::transport::http::handlers::common::{api_error, parse_table};
use crate::transport::http::types::{ApiResponse, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[utoipa::path(
    get,
    path = "/schemas/{table}",
    params(("table" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Active schema with external references inlined", body = ApiResponse),
        (status = 404, description = "Unknown table or missing schema file", body = ApiResponse),
        (status = 500, description = "Schema could not be loaded", body = ApiResponse)
    )
)]
pub async fn get_schema_handler(State(state): State<AppState>, Path(table): Path<String>) -> Response {
    let table = match parse_table(&table) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let validator = state.service.validator();
    match validator.schema(table.schema_name()) {
        Ok(schema) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({
                "table": table.name(),
                "version": validator.version(),
                "schema": schema.as_ref(),
            }))),
        )
            .into_response(),
        Err(e @ SchemaError::NotFound(_)) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            tracing::error!(table = %table, error = %e, "schema load failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[utoipa::path(
    post,
    path = "/schemas/reload",
    responses(
        (status = 200, description = "Schema cache cleared", body = ApiResponse)
    )
)]
pub async fn reload_schemas_handler(State(state): State<AppState>) -> impl IntoResponse {
    let validator = state.service.validator();
    validator.reload();
    (
        StatusCode::OK,
        Json(ApiResponse::ok(json!({ "reloaded": true, "version": validator.version() }))),
    )
}
