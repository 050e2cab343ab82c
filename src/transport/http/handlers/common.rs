use crate::domain::model::{BatchResult, TableKind};
use crate::transport::http::types::ApiResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub fn api_error(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ApiResponse::err(error))).into_response()
}

/// Logged 500 for failures outside any per-item outcome (e.g. the pre-fetch).
pub fn internal_error(context: &str, err: anyhow::Error) -> Response {
    tracing::error!(error = %err, "{}", context);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, err))
}

/// Resolves a `{table}` path segment, or the 404 response for unknown names.
pub fn parse_table(table: &str) -> Result<TableKind, Response> {
    table.parse::<TableKind>().map_err(|e| api_error(StatusCode::NOT_FOUND, e))
}

/// The outcome list in input order, under the batch's aggregate status.
pub fn batch_response(batch: BatchResult) -> Response {
    let status = StatusCode::from_u16(batch.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(batch.outcomes)).into_response()
}
