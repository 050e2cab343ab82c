use crate::domain::model::{FieldError, OutcomeRecord, RequestStatus};
use crate::transport::http::handlers::{health, schema, tables};
use crate::transport::http::types::{ApiResponse, AppState};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        tables::create_handler,
        tables::update_handler,
        tables::upsert_handler,
        tables::read_handler,
        tables::delete_handler,
        tables::export_handler,
        tables::dump_handler,
        tables::search_handler,
        tables::download_handler,
        schema::get_schema_handler,
        schema::reload_schemas_handler
    ),
    components(schemas(ApiResponse, OutcomeRecord, RequestStatus, FieldError))
)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/tables", get(tables::dump_handler))
        .route("/tables/download", get(tables::download_handler))
        .route("/search/:table/", get(tables::search_handler))
        .route("/api/:table/", get(tables::read_handler))
        .route("/api/:table/create/", post(tables::create_handler))
        .route("/api/:table/update/", post(tables::update_handler))
        .route("/api/:table/upsert/", post(tables::upsert_handler))
        .route("/api/:table/delete/", delete(tables::delete_handler))
        .route("/api/:table/export/", get(tables::export_handler))
        .route("/schemas/reload", post(schema::reload_schemas_handler))
        .route("/schemas/:table", get(schema::get_schema_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
