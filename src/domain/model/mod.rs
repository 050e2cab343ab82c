//! Domain model definitions for submitted records and their tables.

use serde_json::Value as JsonValue;

pub mod outcome;
pub mod registry;
pub mod table;

pub use outcome::{aggregate_status, BatchResult, Classification, FieldError, OutcomeRecord, RequestStatus};
pub use registry::{ForeignKey, LookupTable, SubEntityRef};
pub use table::{SequencingKind, TableKind};

/// One row of a named table: field name -> value.
pub type Record = serde_json::Map<String, JsonValue>;

/// Renders an identifier-like JSON value as a key string.
pub fn pk_json_to_string(pk: &JsonValue) -> Option<String> {
    if let Some(s) = pk.as_str() {
        return Some(s.to_string());
    }
    if let Some(i) = pk.as_i64() {
        return Some(i.to_string());
    }
    if let Some(u) = pk.as_u64() {
        return Some(u.to_string());
    }
    None
}

/// Returns `existing` with every field of `patch` written over it.
///
/// Fields absent from `patch` keep their stored values. Neither input is
/// modified.
pub fn merge_fields(existing: Option<&Record>, patch: &Record) -> Record {
    let mut merged = existing.cloned().unwrap_or_default();
    for (field, value) in patch {
        merged.insert(field.clone(), value.clone());
    }
    merged
}
