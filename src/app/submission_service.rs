//! Validate-then-upsert pipeline and the batch operations built on it.

use crate::app::resolver;
use crate::domain::diff::diff;
use crate::domain::model::{
    merge_fields, pk_json_to_string, BatchResult, Classification, LookupTable, OutcomeRecord, Record,
    RequestStatus, TableKind,
};
use crate::domain::normalize::normalize;
use crate::domain::validate::SchemaValidator;
use crate::storage::{RecordStore, RowWrite, StoreError};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// How a batch treats identifiers that are (or are not) already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Stored identifiers are rejected.
    Create,
    /// Unknown identifiers are `NOT FOUND`.
    Update,
    Upsert,
}

impl fmt::Display for SubmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmissionMode::Create => "create",
            SubmissionMode::Update => "update",
            SubmissionMode::Upsert => "upsert",
        })
    }
}

/// Result of one upsert, plus the row as stored when a write happened.
#[derive(Debug, Clone)]
pub struct Upserted {
    pub outcome: OutcomeRecord,
    pub classification: Classification,
    pub stored: Option<Record>,
}

impl Upserted {
    fn rejected(outcome: OutcomeRecord) -> Self {
        Self {
            outcome,
            classification: Classification::Rejected,
            stored: None,
        }
    }
}

/// Splits a comma-separated id list, trimming entries and skipping blanks.
pub fn parse_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// The identifier of a submitted item, or `""` when its key is missing.
pub fn identifier_of(table: TableKind, item: &Record) -> String {
    item.get(table.primary_key_field())
        .and_then(pk_json_to_string)
        .map(|id| id.trim().to_string())
        .unwrap_or_default()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct SubmissionService {
    store: Arc<dyn RecordStore>,
    validator: Arc<SchemaValidator>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn RecordStore>, validator: Arc<SchemaValidator>) -> Self {
        Self { store, validator }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn validator(&self) -> &Arc<SchemaValidator> {
        &self.validator
    }

    /// Builds the parent index row for a sequencing record.
    ///
    /// Returns the row, or the `BAD REQUEST` outcome when the record's parent
    /// (analyte or experiment) is not stored. `None` when the table has no
    /// parent index or the parent reference is absent (the schema reports that).
    async fn index_row(
        &self,
        table: TableKind,
        identifier: &str,
        record: &Record,
    ) -> anyhow::Result<Option<Result<(TableKind, Record), OutcomeRecord>>> {
        let Some(index) = table.parent_index() else {
            return Ok(None);
        };

        let (parent_table, parent_id) = match table {
            TableKind::Experiment(_) => (TableKind::Analyte, "analyte_id".to_string()),
            TableKind::Aligned(kind) => {
                let experiment = TableKind::Experiment(kind);
                (TableKind::ExperimentIndex, experiment.primary_key_field().to_string())
            }
            _ => return Ok(None),
        };
        let Some(parent_key) = record.get(&parent_id).and_then(pk_json_to_string) else {
            return Ok(None);
        };

        let parent = match table {
            TableKind::Aligned(kind) => {
                let index_id = TableKind::Experiment(kind).index_row_id(&parent_key);
                self.store.get(parent_table, &index_id).await?
            }
            _ => self.store.get(parent_table, &parent_key).await?,
        };
        let Some(parent) = parent else {
            let noun = match table {
                TableKind::Aligned(kind) => capitalize(TableKind::Experiment(kind).name()),
                _ => capitalize(parent_table.name()),
            };
            let outcome = OutcomeRecord::new(identifier, RequestStatus::BadRequest)
                .with_message(format!("{} {} does not exist.", noun, parent_key));
            return Ok(Some(Err(outcome)));
        };

        let mut row = Record::new();
        row.insert(index.primary_key_field().to_string(), table.index_row_id(identifier).into());
        row.insert("table_name".to_string(), table.name().into());
        row.insert("id_in_table".to_string(), identifier.into());
        if let Some(participant) = parent.get("participant_id") {
            row.insert("participant_id".to_string(), participant.clone());
        }
        if index == TableKind::AlignedIndex {
            for (source, target) in [("file", "aligned_file"), ("index_file", "aligned_index_file")] {
                if let Some(value) = record.get(&format!("{}_{}", table.name(), source)) {
                    row.insert(target.to_string(), value.clone());
                }
            }
        }
        Ok(Some(Ok((index, row))))
    }

    /// Normalizes, validates and persists one record.
    ///
    /// `existing` is the stored row for `identifier`, if any. Validation and
    /// referential failures come back as rejected outcomes; only unexpected
    /// store failures are errors.
    pub async fn upsert(
        &self,
        table: TableKind,
        identifier: &str,
        existing: Option<&Record>,
        raw: &Record,
    ) -> anyhow::Result<Upserted> {
        let record = normalize(table, raw);

        let mut errors = self
            .validator
            .validate(&JsonValue::Object(record.clone()), table.schema_name())
            .errors;

        let index_row = match self.index_row(table, identifier, &record).await? {
            Some(Ok((index, row))) => {
                let index_result = self.validator.validate(&JsonValue::Object(row.clone()), index.schema_name());
                errors.extend(index_result.errors);
                Some((index, row))
            }
            Some(Err(outcome)) => return Ok(Upserted::rejected(outcome)),
            None => None,
        };

        if !errors.is_empty() {
            tracing::debug!(table = %table, identifier, errors = errors.len(), "record failed validation");
            return Ok(Upserted::rejected(OutcomeRecord::bad_request(identifier, &errors)));
        }

        let changes = diff(existing, &record, table.primary_key_field());
        if existing.is_some() && changes.is_empty() {
            let outcome = OutcomeRecord::new(identifier, RequestStatus::Success)
                .with_message(format!("{} {} had no changes.", table, identifier));
            return Ok(Upserted {
                outcome,
                classification: Classification::Accepted,
                stored: None,
            });
        }

        let resolved = resolver::resolve(self.store.as_ref(), table, record).await?;
        let merged = merge_fields(existing, &resolved);

        let mut rows = vec![RowWrite::new(table, identifier, merged.clone())];
        if let Some((index, row)) = index_row {
            rows.push(RowWrite::new(index, table.index_row_id(identifier), row));
        }
        match self.store.save_all(&rows).await {
            Ok(()) => {}
            Err(StoreError::Constraint(errors)) => {
                tracing::debug!(table = %table, identifier, "referenced rows missing");
                return Ok(Upserted::rejected(OutcomeRecord::bad_request(identifier, &errors)));
            }
            Err(e) => return Err(e.into()),
        }

        let (status, verb) = if existing.is_some() {
            (RequestStatus::Updated, "updated")
        } else {
            (RequestStatus::Created, "created")
        };
        let outcome = OutcomeRecord::new(identifier, status)
            .with_message(format!("{} {} {}.", table, identifier, verb))
            .with_data(json!({
                "updates": changes.to_json(),
                "instance": JsonValue::Object(merged.clone()),
            }));
        Ok(Upserted {
            outcome,
            classification: Classification::Accepted,
            stored: Some(merged),
        })
    }

    /// Processes a submitted batch in input order.
    ///
    /// Existing rows are fetched once up front. A failure on one item becomes a
    /// `SERVER ERROR` outcome and the rest of the batch still runs.
    pub async fn submit(
        &self,
        table: TableKind,
        mode: SubmissionMode,
        items: Vec<JsonValue>,
    ) -> anyhow::Result<BatchResult> {
        let mut ids: Vec<String> = items
            .iter()
            .filter_map(JsonValue::as_object)
            .map(|item| identifier_of(table, item))
            .filter(|id| !id.is_empty())
            .collect();
        ids.sort();
        ids.dedup();
        let mut existing = self.store.get_many(table, &ids).await?;

        let mut batch = BatchResult::with_capacity(items.len());
        for item in &items {
            let Some(raw) = item.as_object() else {
                let outcome =
                    OutcomeRecord::new("", RequestStatus::BadRequest).with_message("Record must be a JSON object");
                batch.push(outcome, Classification::Rejected);
                continue;
            };
            let identifier = identifier_of(table, raw);
            let current = existing.get(&identifier);

            match (mode, current) {
                (SubmissionMode::Create, Some(_)) => {
                    let outcome = OutcomeRecord::new(&identifier, RequestStatus::BadRequest)
                        .with_message(format!("{} {} already exists.", table, identifier));
                    batch.push(outcome, Classification::Rejected);
                    continue;
                }
                (SubmissionMode::Update, None) => {
                    let outcome = OutcomeRecord::new(&identifier, RequestStatus::NotFound)
                        .with_message(format!("{} {} not found.", table, identifier));
                    batch.push(outcome, Classification::Rejected);
                    continue;
                }
                _ => {}
            }

            match self.upsert(table, &identifier, current, raw).await {
                Ok(done) => {
                    tracing::debug!(
                        table = %table,
                        identifier = %identifier,
                        status = done.outcome.status_code,
                        "item processed"
                    );
                    if let Some(stored) = done.stored {
                        existing.insert(identifier.clone(), stored);
                    }
                    batch.push(done.outcome, done.classification);
                }
                Err(e) => {
                    tracing::warn!(table = %table, identifier = %identifier, error = %e, "item failed");
                    let outcome =
                        OutcomeRecord::new(&identifier, RequestStatus::ServerError).with_data(json!(e.to_string()));
                    batch.push(outcome, Classification::Rejected);
                }
            }
        }

        tracing::info!(
            table = %table,
            mode = %mode,
            items = items.len(),
            accepted = batch.accepted_count(),
            rejected = batch.rejected_count(),
            status = batch.status(),
            "batch processed"
        );
        Ok(batch)
    }

    /// Fetches each id: `SUCCESS` with the row, or `NOT FOUND`.
    pub async fn read_batch(&self, table: TableKind, ids: &[String]) -> anyhow::Result<BatchResult> {
        let found = self.store.get_many(table, ids).await?;
        let mut batch = BatchResult::with_capacity(ids.len());
        for id in ids {
            match found.get(id) {
                Some(record) => batch.push(
                    OutcomeRecord::new(id, RequestStatus::Success).with_data(JsonValue::Object(record.clone())),
                    Classification::Accepted,
                ),
                None => batch.push(
                    OutcomeRecord::new(id, RequestStatus::NotFound).with_message(format!("{} {} not found.", table, id)),
                    Classification::Rejected,
                ),
            }
        }
        tracing::info!(table = %table, ids = ids.len(), found = batch.accepted_count(), "bulk read");
        Ok(batch)
    }

    /// Deletes each id; the store cascades to index rows and dependent records.
    pub async fn delete_batch(&self, table: TableKind, ids: &[String]) -> anyhow::Result<BatchResult> {
        let found = self.store.get_many(table, ids).await?;
        let mut batch = BatchResult::with_capacity(ids.len());
        for id in ids {
            if !found.contains_key(id) {
                batch.push(
                    OutcomeRecord::new(id, RequestStatus::NotFound).with_message(format!("{} {} not found.", table, id)),
                    Classification::Rejected,
                );
                continue;
            }

            match self.store.delete_all(&[(table, id.clone())]).await {
                Ok(removed) => {
                    tracing::debug!(table = %table, identifier = %id, rows = removed, "record deleted");
                    batch.push(
                        OutcomeRecord::new(id, RequestStatus::Deleted)
                            .with_message(format!("{} {} deleted successfully.", table, id)),
                        Classification::Accepted,
                    );
                }
                Err(e) => {
                    tracing::warn!(table = %table, identifier = %id, error = %e, "delete failed");
                    batch.push(
                        OutcomeRecord::new(id, RequestStatus::ServerError).with_data(json!(e.to_string())),
                        Classification::Rejected,
                    );
                }
            }
        }
        tracing::info!(table = %table, ids = ids.len(), deleted = batch.accepted_count(), "bulk delete");
        Ok(batch)
    }

    /// Every stored table plus the lookup tables, keyed by name.
    pub async fn dump(&self) -> anyhow::Result<JsonValue> {
        let mut tables = serde_json::Map::new();
        for table in TableKind::ALL {
            let rows = self.store.list(table).await?;
            let rows: Vec<JsonValue> = rows.into_iter().map(|(_, r)| JsonValue::Object(r)).collect();
            tables.insert(table.name().to_string(), JsonValue::Array(rows));
        }
        let mut lookups = serde_json::Map::new();
        for lookup in [
            LookupTable::InternalProjectId,
            LookupTable::PmidId,
            LookupTable::TwinId,
            LookupTable::ExperimentId,
            LookupTable::AlignedId,
        ] {
            let keys = self.store.lookup_keys(lookup).await?;
            lookups.insert(lookup.name().to_string(), json!(keys));
        }
        Ok(json!({ "tables": tables, "lookups": lookups }))
    }
}
