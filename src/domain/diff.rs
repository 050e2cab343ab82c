//! Field-level change detection between a stored record and a submission.

use crate::domain::model::Record;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Value recorded against the primary key field when a record is new.
pub const CREATED: &str = "CREATED";

/// field -> `"{old} to {new}"`, or the creation marker `{pk_field: "CREATED"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, String>);

impl ChangeSet {
    pub fn created(pk_field: &str) -> Self {
        let mut changes = BTreeMap::new();
        changes.insert(pk_field.to_string(), CREATED.to_string());
        ChangeSet(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect(),
        )
    }
}

/// Strings render bare, everything else as JSON text.
fn render(value: &JsonValue) -> Result<String, serde_json::Error> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other),
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn describe(field: &str, old: Option<&JsonValue>, new: &JsonValue) -> Result<Option<String>, serde_json::Error> {
    let new_text = render(new)?;
    match old {
        None => Ok(Some(format!("NA to {}", new_text))),
        Some(old) => {
            // A stored string equal to the new value's text is the same value;
            // booleans also match their capitalised spelling ("True").
            let same_text = old.as_str().is_some_and(|text| {
                text == new_text || (new.is_boolean() && text.eq_ignore_ascii_case(&new_text))
            });
            if values_equal(old, new) || same_text {
                Ok(None)
            } else {
                tracing::trace!(field, "field changed");
                Ok(Some(format!("{} to {}", render(old)?, new_text)))
            }
        }
    }
}

/// Computes what `new` changes relative to `old`.
///
/// Only fields present in `new` are considered; a field that fails to render
/// is reported as `"Error with {field}: ..."` and the rest are still compared.
pub fn diff(old: Option<&Record>, new: &Record, pk_field: &str) -> ChangeSet {
    let Some(old) = old else {
        return ChangeSet::created(pk_field);
    };

    let mut changes = BTreeMap::new();
    for (field, value) in new {
        match describe(field, old.get(field), value) {
            Ok(Some(change)) => {
                changes.insert(field.clone(), change);
            }
            Ok(None) => {}
            Err(e) => {
                changes.insert(field.clone(), format!("Error with {}: {}", field, e));
            }
        }
    }
    ChangeSet(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: JsonValue) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn new_record_is_marked_created() {
        let changes = diff(None, &record(json!({"family_id": "F1"})), "family_id");
        assert_eq!(changes.to_json(), json!({"family_id": "CREATED"}));
    }

    #[test]
    fn changed_and_added_fields_are_reported() {
        let old = record(json!({"family_id": "F1", "consanguinity": "Unknown"}));
        let new = record(json!({"family_id": "F1", "consanguinity": "Present", "pedigree_file": "f.ped"}));
        let changes = diff(Some(&old), &new, "family_id");
        assert_eq!(
            changes.to_json(),
            json!({"consanguinity": "Unknown to Present", "pedigree_file": "NA to f.ped"})
        );
    }

    #[test]
    fn identical_submission_has_no_changes() {
        let old = record(json!({"participant_id": "P1", "pmid_id": ["1", "2"], "age_at_enrollment": 4.0}));
        let new = record(json!({"participant_id": "P1", "pmid_id": ["1", "2"], "age_at_enrollment": 4}));
        assert!(diff(Some(&old), &new, "participant_id").is_empty());
    }

    #[test]
    fn string_matching_rendered_number_is_unchanged() {
        let old = record(json!({"read_length": "151"}));
        let new = record(json!({"read_length": 151}));
        assert!(diff(Some(&old), &new, "x").is_empty());

        let new = record(json!({"read_length": 150}));
        assert_eq!(diff(Some(&old), &new, "x").get("read_length"), Some("151 to 150"));
    }

    #[test]
    fn bool_against_capitalised_string_is_unchanged() {
        let old = record(json!({"was_barcoded": "True", "methylation_called": "False"}));
        let new = record(json!({"was_barcoded": true, "methylation_called": false}));
        assert!(diff(Some(&old), &new, "x").is_empty());

        let flipped = record(json!({"was_barcoded": false}));
        assert_eq!(diff(Some(&old), &flipped, "x").get("was_barcoded"), Some("True to false"));
    }

    #[test]
    fn fields_missing_from_submission_are_ignored() {
        let old = record(json!({"family_id": "F1", "consanguinity": "Unknown", "notes": "x"}));
        let new = record(json!({"family_id": "F1", "consanguinity": "Unknown"}));
        assert_eq!(diff(Some(&old), &new, "family_id").len(), 0);
    }
}
