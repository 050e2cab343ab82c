pub mod app;
pub mod domain;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{SubmissionMode, SubmissionService};
pub use domain::model::{BatchResult, OutcomeRecord, Record, RequestStatus, TableKind};
pub use domain::validate::SchemaValidator;
pub use storage::{MemoryRecordStore, PgRecordStore, RecordStore};
