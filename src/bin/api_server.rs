// src/bin/api_server.rs

use gregor_submission::infra::{logging, Settings};
use gregor_submission::storage::{MemoryRecordStore, PgRecordStore, RecordStore};
use gregor_submission::transport;
use gregor_submission::{SchemaValidator, SubmissionService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;
    let settings = Settings::from_env()?;

    // --- Store Initialization ---
    let store: Arc<dyn RecordStore> = match settings.database_url.as_deref() {
        Some(url) => {
            tracing::info!(max_connections = settings.db_max_connections, "connecting to Postgres");
            Arc::new(PgRecordStore::connect(url, settings.db_max_connections).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; records are kept in memory only");
            Arc::new(MemoryRecordStore::new())
        }
    };

    // --- Schema Validator Initialization ---
    let schema_root = settings.schema_dir.join(&settings.schema_version);
    if !schema_root.is_dir() {
        anyhow::bail!("schema directory {} does not exist", schema_root.display());
    }
    let validator = Arc::new(SchemaValidator::new(&settings.schema_dir, &settings.schema_version));
    tracing::info!(dir = %schema_root.display(), "schema directory ready");

    let app_state = transport::http::AppState {
        service: Arc::new(SubmissionService::new(store, validator)),
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "API server listening");
    tracing::info!("Swagger UI available at /swagger-ui");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
