pub mod export;
pub mod resolver;
pub mod search;
pub mod submission_service;

pub use submission_service::{parse_ids, SubmissionMode, SubmissionService, Upserted};
