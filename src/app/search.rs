//! Field-equality search over the rows of one table.

use crate::domain::model::{Record, TableKind};
use crate::domain::validate::SchemaValidator;
use crate::storage::RecordStore;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};

/// Whether a stored value equals the query text.
///
/// Lists match when any element does; numbers compare numerically and
/// booleans ignore case, so `?was_barcoded=True` finds `true`.
pub fn value_matches(value: &JsonValue, wanted: &str) -> bool {
    match value {
        JsonValue::Array(items) => items.iter().any(|item| value_matches(item, wanted)),
        JsonValue::String(s) => s == wanted,
        JsonValue::Bool(b) => b.to_string().eq_ignore_ascii_case(wanted.trim()),
        JsonValue::Number(n) => match wanted.trim().parse::<f64>() {
            Ok(parsed) => n.as_f64() == Some(parsed),
            Err(_) => false,
        },
        JsonValue::Null | JsonValue::Object(_) => false,
    }
}

/// Keeps the filters that name a column of `table`; the rest are ignored.
pub fn known_filters(
    table: TableKind,
    validator: &SchemaValidator,
    params: &HashMap<String, String>,
) -> anyhow::Result<BTreeMap<String, String>> {
    let schema = validator.schema(table.schema_name())?;
    let properties = schema.get("properties").and_then(JsonValue::as_object);
    let filters: BTreeMap<String, String> = params
        .iter()
        .filter(|(field, _)| {
            field.as_str() == table.primary_key_field() || properties.is_some_and(|p| p.contains_key(field.as_str()))
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    if filters.len() < params.len() {
        tracing::debug!(table = %table, ignored = params.len() - filters.len(), "unknown search fields ignored");
    }
    Ok(filters)
}

/// Rows of `table` where every filter field equals its value.
pub fn filter_records(records: Vec<Record>, filters: &BTreeMap<String, String>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| {
            filters
                .iter()
                .all(|(field, wanted)| record.get(field).is_some_and(|v| value_matches(v, wanted)))
        })
        .collect()
}

pub async fn find_records(
    store: &dyn RecordStore,
    validator: &SchemaValidator,
    table: TableKind,
    params: &HashMap<String, String>,
) -> anyhow::Result<Vec<Record>> {
    let filters = known_filters(table, validator, params)?;
    let records: Vec<Record> = store.list(table).await?.into_iter().map(|(_, r)| r).collect();
    let found = filter_records(records, &filters);
    tracing::info!(table = %table, filters = filters.len(), found = found.len(), "search");
    Ok(found)
}
