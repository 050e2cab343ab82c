//! Get-or-create resolution of lookup references.

use crate::domain::model::{pk_json_to_string, Record, TableKind};
use crate::storage::{RecordStore, StoreError};
use serde_json::Value as JsonValue;

fn key_text(value: &JsonValue) -> String {
    pk_json_to_string(value).unwrap_or_else(|| value.to_string())
}

/// Ensures every lookup row named by `record` exists and rewrites the
/// referencing fields to the resolved natural keys.
///
/// List fields resolve element by element and keep their order; scalar fields
/// stay scalar. Tables without lookup references pass through untouched.
pub async fn resolve(store: &dyn RecordStore, table: TableKind, mut record: Record) -> Result<Record, StoreError> {
    for sub in table.sub_entity_refs() {
        let Some(value) = record.get(sub.field) else {
            continue;
        };
        let resolved = match value {
            JsonValue::Array(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    let key = store.get_or_create_lookup(sub.lookup, &key_text(item)).await?;
                    keys.push(JsonValue::String(key));
                }
                JsonValue::Array(keys)
            }
            scalar => JsonValue::String(store.get_or_create_lookup(sub.lookup, &key_text(scalar)).await?),
        };
        tracing::debug!(table = %table, field = sub.field, "resolved lookup references");
        record.insert(sub.field.to_string(), resolved);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::LookupTable;
    use crate::storage::MemoryRecordStore;
    use serde_json::json;

    #[tokio::test]
    async fn participant_references_are_created_once() {
        let store = MemoryRecordStore::new();
        let record = json!({
            "participant_id": "P1",
            "family_id": "F1",
            "pmid_id": ["111", "222"],
            "internal_project_id": ["proj"]
        })
        .as_object()
        .cloned()
        .unwrap();

        let first = resolve(&store, TableKind::Participant, record.clone()).await.unwrap();
        let second = resolve(&store, TableKind::Participant, record.clone()).await.unwrap();

        assert_eq!(first, record);
        assert_eq!(second, record);
        assert_eq!(store.lookup_keys(LookupTable::PmidId).await.unwrap(), vec!["111", "222"]);
        assert_eq!(store.lookup_keys(LookupTable::Family).await.unwrap(), vec!["F1"]);
        assert!(store.lookup_keys(LookupTable::TwinId).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn numeric_keys_resolve_to_their_text() {
        let store = MemoryRecordStore::new();
        let record = json!({"biobank_id": "B1", "experiment_id": [42]}).as_object().cloned().unwrap();
        let resolved = resolve(&store, TableKind::Biobank, record).await.unwrap();
        assert_eq!(resolved["experiment_id"], json!(["42"]));
    }

    #[tokio::test]
    async fn tables_without_references_pass_through() {
        let store = MemoryRecordStore::new();
        let record = json!({"phenotype_id": "PH1", "participant_id": "P1"}).as_object().cloned().unwrap();
        let resolved = resolve(&store, TableKind::Phenotype, record.clone()).await.unwrap();
        assert_eq!(resolved, record);
    }
}
