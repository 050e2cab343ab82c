//! Record persistence.
//!
//! Records of every table live behind one [`RecordStore`]; the Postgres and
//! in-memory implementations enforce the same referential checks on write.

use crate::domain::model::{pk_json_to_string, FieldError, ForeignKey, LookupTable, Record, TableKind};
use crate::domain::validate::field_label;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// One entry per field whose referenced row does not exist.
    #[error("referenced rows are missing: {}", summarize(.0))]
    Constraint(Vec<FieldError>),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

fn summarize(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.error.as_str()).collect::<Vec<_>>().join("; ")
}

/// A row to insert or replace.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    pub table: TableKind,
    pub id: String,
    pub record: Record,
}

impl RowWrite {
    pub fn new(table: TableKind, id: impl Into<String>, record: Record) -> Self {
        Self {
            table,
            id: id.into(),
            record,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, table: TableKind, id: &str) -> Result<Option<Record>, StoreError>;

    /// Existing records among `ids`, keyed by identifier. Missing ids are absent.
    async fn get_many(&self, table: TableKind, ids: &[String]) -> Result<HashMap<String, Record>, StoreError>;

    /// Every record of `table`, ordered by identifier.
    async fn list(&self, table: TableKind) -> Result<Vec<(String, Record)>, StoreError>;

    /// Writes all rows atomically, in order.
    ///
    /// Foreign keys of each row are checked against what is stored, including
    /// rows written earlier in the same call. Any missing reference aborts the
    /// whole write with [`StoreError::Constraint`].
    async fn save_all(&self, rows: &[RowWrite]) -> Result<(), StoreError>;

    /// Deletes the given rows atomically; returns how many rows were removed.
    ///
    /// Deletion cascades: a removed sequencing record takes its index row,
    /// rows whose foreign key names a removed row are removed too, and a
    /// removed key is dropped from list-valued references.
    async fn delete_all(&self, keys: &[(TableKind, String)]) -> Result<u64, StoreError>;

    /// Returns the natural key, inserting the lookup row if it is new.
    async fn get_or_create_lookup(&self, lookup: LookupTable, key: &str) -> Result<String, StoreError>;

    async fn lookup_keys(&self, lookup: LookupTable) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Identifiers named by `field` of `record`, whether stored as a scalar or a list.
pub fn referenced_keys(record: &Record, field: &str) -> Vec<String> {
    match record.get(field) {
        Some(JsonValue::Array(items)) => items.iter().filter_map(pk_json_to_string).collect(),
        Some(value) => pk_json_to_string(value).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Effect of deleting `key` on a row whose `field` may reference it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Detach {
    /// The row references the key directly and is deleted with it.
    Delete,
    /// The key was one entry of a list; the row is kept without it.
    Rewrite(Record),
    Unrelated,
}

pub(crate) fn detach(record: &Record, field: &str, key: &str) -> Detach {
    match record.get(field) {
        Some(JsonValue::Array(items)) => {
            let kept: Vec<JsonValue> = items
                .iter()
                .filter(|v| pk_json_to_string(v).as_deref() != Some(key))
                .cloned()
                .collect();
            if kept.len() == items.len() {
                return Detach::Unrelated;
            }
            let mut record = record.clone();
            if kept.is_empty() {
                record.remove(field);
            } else {
                record.insert(field.to_string(), JsonValue::Array(kept));
            }
            Detach::Rewrite(record)
        }
        Some(value) if pk_json_to_string(value).as_deref() == Some(key) => Detach::Delete,
        _ => Detach::Unrelated,
    }
}

pub(crate) fn missing_reference(fk: &ForeignKey, key: &str) -> FieldError {
    FieldError::new(
        field_label(&[fk.field.to_string()]),
        format!("{} {} does not exist.", fk.target.name(), key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn referenced_keys_reads_scalars_and_lists() {
        let record = json!({"participant_id": "P1", "additional_family_members_with_variant": ["P2", "P3"]})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(referenced_keys(&record, "participant_id"), vec!["P1"]);
        assert_eq!(
            referenced_keys(&record, "additional_family_members_with_variant"),
            vec!["P2", "P3"]
        );
        assert!(referenced_keys(&record, "analyte_id").is_empty());
    }

    #[test]
    fn detach_deletes_direct_references_and_trims_lists() {
        let finding = json!({
            "genetic_findings_id": "G1",
            "participant_id": "P1",
            "additional_family_members_with_variant": ["P2", "P3"]
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_eq!(detach(&finding, "participant_id", "P1"), Detach::Delete);
        assert_eq!(detach(&finding, "participant_id", "P2"), Detach::Unrelated);

        let Detach::Rewrite(updated) = detach(&finding, "additional_family_members_with_variant", "P2") else {
            panic!("expected the list to be rewritten");
        };
        assert_eq!(updated["additional_family_members_with_variant"], json!(["P3"]));
        assert_eq!(updated["participant_id"], "P1");

        let Detach::Rewrite(emptied) = detach(&updated, "additional_family_members_with_variant", "P3") else {
            panic!("expected the list to be rewritten");
        };
        assert!(!emptied.contains_key("additional_family_members_with_variant"));
    }

    #[test]
    fn missing_reference_names_the_field() {
        let fk = ForeignKey {
            field: "analyte_id",
            target: TableKind::Analyte,
        };
        let err = missing_reference(&fk, "A-9");
        assert_eq!(err.field, "Analyte_Id");
        assert_eq!(err.error, "analyte A-9 does not exist.");
    }
}
