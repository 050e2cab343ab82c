//! In-process record store, used when no database is configured and in tests.

use crate::domain::model::{LookupTable, Record, TableKind};
use crate::storage::{detach, missing_reference, referenced_keys, Detach, RecordStore, RowWrite, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    records: HashMap<TableKind, BTreeMap<String, Record>>,
    lookups: HashMap<LookupTable, BTreeSet<String>>,
}

impl Tables {
    fn contains(&self, table: TableKind, id: &str) -> bool {
        self.records.get(&table).is_some_and(|rows| rows.contains_key(id))
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, table: TableKind, id: &str) -> Result<Option<Record>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(&table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn get_many(&self, table: TableKind, ids: &[String]) -> Result<HashMap<String, Record>, StoreError> {
        let inner = self.inner.read().await;
        let Some(rows) = inner.records.get(&table) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn list(&self, table: TableKind) -> Result<Vec<(String, Record)>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn save_all(&self, rows: &[RowWrite]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        // Check every row before touching anything, counting earlier rows of this call.
        let mut pending: BTreeSet<(TableKind, &str)> = BTreeSet::new();
        let mut errors = Vec::new();
        for row in rows {
            for fk in row.table.foreign_keys() {
                for key in referenced_keys(&row.record, fk.field) {
                    let exists = inner.contains(fk.target, &key) || pending.contains(&(fk.target, key.as_str()));
                    if !exists {
                        errors.push(missing_reference(&fk, &key));
                    }
                }
            }
            if !errors.is_empty() {
                return Err(StoreError::Constraint(errors));
            }
            pending.insert((row.table, row.id.as_str()));
        }

        for row in rows {
            inner
                .records
                .entry(row.table)
                .or_default()
                .insert(row.id.clone(), row.record.clone());
        }
        Ok(())
    }

    async fn delete_all(&self, keys: &[(TableKind, String)]) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut queue: VecDeque<(TableKind, String)> = keys.iter().cloned().collect();
        let mut deleted = 0;
        while let Some((table, id)) = queue.pop_front() {
            let removed = inner.records.get_mut(&table).and_then(|rows| rows.remove(&id));
            if removed.is_none() {
                continue;
            }
            deleted += 1;
            if let Some(index) = table.parent_index() {
                queue.push_back((index, table.index_row_id(&id)));
            }
            for (owner, fk) in table.dependents() {
                let Some(rows) = inner.records.get_mut(&owner) else {
                    continue;
                };
                for (child_id, record) in rows.iter_mut() {
                    match detach(record, fk.field, &id) {
                        Detach::Delete => queue.push_back((owner, child_id.clone())),
                        Detach::Rewrite(updated) => *record = updated,
                        Detach::Unrelated => {}
                    }
                }
            }
        }
        Ok(deleted)
    }

    async fn get_or_create_lookup(&self, lookup: LookupTable, key: &str) -> Result<String, StoreError> {
        let mut inner = self.inner.write().await;
        match lookup {
            LookupTable::Family => {
                let families = inner.records.entry(TableKind::Family).or_default();
                families.entry(key.to_string()).or_insert_with(|| {
                    let mut record = Record::new();
                    record.insert(lookup.natural_key_field().to_string(), key.into());
                    record
                });
            }
            _ => {
                inner.lookups.entry(lookup).or_default().insert(key.to_string());
            }
        }
        Ok(key.to_string())
    }

    async fn lookup_keys(&self, lookup: LookupTable) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        let keys = match lookup {
            LookupTable::Family => inner
                .records
                .get(&TableKind::Family)
                .map(|rows| rows.keys().cloned().collect())
                .unwrap_or_default(),
            _ => inner
                .lookups
                .get(&lookup)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default(),
        };
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SequencingKind;
    use serde_json::{json, Value as JsonValue};

    fn record(v: JsonValue) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn lookup_get_or_create_is_idempotent() {
        let store = MemoryRecordStore::new();
        for _ in 0..3 {
            let key = store.get_or_create_lookup(LookupTable::PmidId, "12345").await.unwrap();
            assert_eq!(key, "12345");
        }
        store.get_or_create_lookup(LookupTable::PmidId, "678").await.unwrap();
        assert_eq!(store.lookup_keys(LookupTable::PmidId).await.unwrap(), vec!["12345", "678"]);
        assert!(store.lookup_keys(LookupTable::TwinId).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn family_lookup_keeps_an_existing_record() {
        let store = MemoryRecordStore::new();
        let full = record(json!({"family_id": "F1", "consanguinity": "Present"}));
        store
            .save_all(&[RowWrite::new(TableKind::Family, "F1", full.clone())])
            .await
            .unwrap();

        store.get_or_create_lookup(LookupTable::Family, "F1").await.unwrap();
        store.get_or_create_lookup(LookupTable::Family, "F2").await.unwrap();

        assert_eq!(store.get(TableKind::Family, "F1").await.unwrap(), Some(full));
        assert_eq!(
            store.get(TableKind::Family, "F2").await.unwrap(),
            Some(record(json!({"family_id": "F2"})))
        );
    }

    #[tokio::test]
    async fn missing_reference_aborts_the_whole_write() {
        let store = MemoryRecordStore::new();
        let analyte = RowWrite::new(
            TableKind::Analyte,
            "A1",
            record(json!({"analyte_id": "A1", "participant_id": "P404"})),
        );
        let family = RowWrite::new(TableKind::Family, "F1", record(json!({"family_id": "F1"})));

        let err = store.save_all(&[family, analyte]).await.unwrap_err();
        match err {
            StoreError::Constraint(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "Participant_Id");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(store.list(TableKind::Family).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rows_earlier_in_the_call_satisfy_references() {
        let store = MemoryRecordStore::new();
        let participant = RowWrite::new(TableKind::Participant, "P1", record(json!({"participant_id": "P1"})));
        let phenotype = RowWrite::new(
            TableKind::Phenotype,
            "PH1",
            record(json!({"phenotype_id": "PH1", "participant_id": "P1"})),
        );
        store.save_all(&[participant, phenotype]).await.unwrap();

        let found = store
            .get_many(TableKind::Phenotype, &["PH1".to_string(), "PH2".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            store
                .delete_all(&[(TableKind::Phenotype, "PH1".into()), (TableKind::Phenotype, "PH2".into())])
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn deleting_a_participant_cascades_to_dependent_rows() {
        let store = MemoryRecordStore::new();
        let experiment = TableKind::Experiment(SequencingKind::DnaShortRead);
        let aligned = TableKind::Aligned(SequencingKind::DnaShortRead);
        store
            .save_all(&[
                RowWrite::new(TableKind::Participant, "P1", record(json!({"participant_id": "P1"}))),
                RowWrite::new(TableKind::Participant, "P2", record(json!({"participant_id": "P2"}))),
                RowWrite::new(
                    TableKind::Analyte,
                    "A1",
                    record(json!({"analyte_id": "A1", "participant_id": "P1"})),
                ),
                RowWrite::new(
                    experiment,
                    "E1",
                    record(json!({"experiment_dna_short_read_id": "E1", "analyte_id": "A1"})),
                ),
                RowWrite::new(
                    TableKind::ExperimentIndex,
                    experiment.index_row_id("E1"),
                    record(json!({"participant_id": "P1", "id_in_table": "E1"})),
                ),
                RowWrite::new(
                    aligned,
                    "AL1",
                    record(json!({"aligned_dna_short_read_id": "AL1", "experiment_dna_short_read_id": "E1"})),
                ),
                RowWrite::new(
                    TableKind::AlignedIndex,
                    aligned.index_row_id("AL1"),
                    record(json!({"participant_id": "P1", "id_in_table": "AL1"})),
                ),
                RowWrite::new(
                    TableKind::GeneticFindings,
                    "G1",
                    record(json!({
                        "genetic_findings_id": "G1",
                        "participant_id": "P2",
                        "additional_family_members_with_variant": ["P1"]
                    })),
                ),
                RowWrite::new(
                    TableKind::GeneticFindings,
                    "G2",
                    record(json!({"genetic_findings_id": "G2", "participant_id": "P1"})),
                ),
            ])
            .await
            .unwrap();

        let deleted = store.delete_all(&[(TableKind::Participant, "P1".into())]).await.unwrap();
        assert_eq!(deleted, 7);

        assert!(store.get(TableKind::Analyte, "A1").await.unwrap().is_none());
        assert!(store.list(experiment).await.unwrap().is_empty());
        assert!(store.list(aligned).await.unwrap().is_empty());
        assert!(store.list(TableKind::ExperimentIndex).await.unwrap().is_empty());
        assert!(store.list(TableKind::AlignedIndex).await.unwrap().is_empty());
        assert!(store.get(TableKind::GeneticFindings, "G2").await.unwrap().is_none());
        assert_eq!(
            store.get(TableKind::GeneticFindings, "G1").await.unwrap(),
            Some(record(json!({"genetic_findings_id": "G1", "participant_id": "P2"})))
        );
        assert!(store.get(TableKind::Participant, "P2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_an_experiment_takes_its_index_row() {
        let store = MemoryRecordStore::new();
        let experiment = TableKind::Experiment(SequencingKind::Nanopore);
        store
            .save_all(&[
                RowWrite::new(TableKind::Participant, "P1", record(json!({"participant_id": "P1"}))),
                RowWrite::new(
                    TableKind::Analyte,
                    "A1",
                    record(json!({"analyte_id": "A1", "participant_id": "P1"})),
                ),
                RowWrite::new(experiment, "N1", record(json!({"analyte_id": "A1"}))),
                RowWrite::new(
                    TableKind::ExperimentIndex,
                    experiment.index_row_id("N1"),
                    record(json!({"participant_id": "P1"})),
                ),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_all(&[(experiment, "N1".into())]).await.unwrap(), 2);
        assert!(store.list(TableKind::ExperimentIndex).await.unwrap().is_empty());
        assert!(store.get(TableKind::Analyte, "A1").await.unwrap().is_some());
    }
}
