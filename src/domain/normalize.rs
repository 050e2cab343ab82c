//! Field normalization applied to every submitted record before validation.
//!
//! All functions are pure: they take a record and return a new one. Numeric
//! fields that cannot be parsed are set to the `"NA"` sentinel, which
//! [`remove_na`] then drops, so a malformed number ends up as an absent field
//! and the schema decides whether absence is acceptable.

use crate::domain::model::{Record, SequencingKind, TableKind};
use serde_json::{Number, Value as JsonValue};

/// Sentinel used by submitters for "not available".
pub const NA: &str = "NA";

/// Delimiter separating values of a multi-value field.
pub const MULTI_VALUE_DELIMITER: char = '|';

fn is_na_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s == NA || s.is_empty(),
        JsonValue::Array(items) if items.len() == 1 => match &items[0] {
            JsonValue::Null => true,
            JsonValue::String(s) => s == NA || s.is_empty(),
            _ => false,
        },
        _ => false,
    }
}

/// Drops every field whose value is `"NA"`, `""`, `null`, or a one-element
/// list of one of those.
pub fn remove_na(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, v)| !is_na_value(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Splits `|`-delimited strings into trimmed lists and trims all other strings.
pub fn multi_value_split(record: &Record) -> Record {
    record
        .iter()
        .map(|(k, v)| {
            let value = match v {
                JsonValue::String(s) if s.contains(MULTI_VALUE_DELIMITER) => JsonValue::Array(
                    s.split(MULTI_VALUE_DELIMITER)
                        .map(|part| JsonValue::String(part.trim().to_string()))
                        .collect(),
                ),
                JsonValue::String(s) => JsonValue::String(s.trim().to_string()),
                other => other.clone(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Display form of a multi-value field: list items joined with `|`.
pub fn join_multi_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .map(join_multi_value)
            .collect::<Vec<_>>()
            .join(&MULTI_VALUE_DELIMITER.to_string()),
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn parse_int(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn parse_float(value: &JsonValue) -> Option<Number> {
    match value {
        JsonValue::Number(n) => Some(n.clone()),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    }
}

pub fn parse_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.as_str() {
            "TRUE" | "true" => Some(true),
            "FALSE" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn is_present(record: &Record, field: &str) -> bool {
    matches!(record.get(field), Some(v) if v.as_str() != Some(NA))
}

/// Parses `field` as an integer; an unparseable value becomes `"NA"`.
pub fn coerce_int(mut record: Record, field: &str) -> Record {
    if !is_present(&record, field) {
        return record;
    }
    let coerced = match parse_int(&record[field]) {
        Some(n) => JsonValue::from(n),
        None => {
            tracing::debug!(field, "numeric field could not be parsed; treating as absent");
            JsonValue::String(NA.to_string())
        }
    };
    record.insert(field.to_string(), coerced);
    record
}

/// Parses `field` as a number; an unparseable value becomes `"NA"`.
pub fn coerce_float(mut record: Record, field: &str) -> Record {
    if !is_present(&record, field) {
        return record;
    }
    let coerced = match parse_float(&record[field]) {
        Some(n) => JsonValue::Number(n),
        None => {
            tracing::debug!(field, "numeric field could not be parsed; treating as absent");
            JsonValue::String(NA.to_string())
        }
    };
    record.insert(field.to_string(), coerced);
    record
}

/// Converts `TRUE`/`true`/`FALSE`/`false` strings to booleans. Other values
/// are left for the schema to reject.
pub fn coerce_bool(mut record: Record, field: &str) -> Record {
    if !is_present(&record, field) {
        return record;
    }
    if let Some(b) = parse_bool(&record[field]) {
        record.insert(field.to_string(), JsonValue::Bool(b));
    }
    record
}

/// Wraps a scalar multi-value field in a single-element list.
pub fn ensure_list(mut record: Record, field: &str) -> Record {
    if let Some(value) = record.get_mut(field) {
        if !value.is_array() {
            let scalar = value.take();
            *value = JsonValue::Array(vec![scalar]);
        }
    }
    record
}

struct Rules {
    split: bool,
    ints: &'static [&'static str],
    floats: &'static [&'static str],
    bools: &'static [&'static str],
    lists: &'static [&'static str],
}

const PLAIN: Rules = Rules {
    split: false,
    ints: &[],
    floats: &[],
    bools: &[],
    lists: &[],
};

fn rules_for(table: TableKind) -> Rules {
    use SequencingKind::*;
    match table {
        TableKind::Participant => Rules {
            split: true,
            floats: &["age_at_last_observation", "age_at_enrollment"],
            lists: &["internal_project_id", "pmid_id", "twin_id", "prior_testing", "reported_race"],
            ..PLAIN
        },
        TableKind::Family | TableKind::Phenotype => Rules { split: true, ..PLAIN },
        TableKind::Analyte => Rules {
            split: true,
            ints: &["passage_number"],
            floats: &["age_at_collection", "hours_since_last_meal", "time_to_freeze"],
            ..PLAIN
        },
        TableKind::GeneticFindings => Rules {
            split: true,
            ints: &["pos", "pos_end", "copy_number"],
            floats: &["allele_balance_or_heteroplasmy_percentage"],
            lists: &[
                "experiment_id",
                "variant_type",
                "gene_of_interest",
                "condition_inheritance",
                "method_of_discovery",
                "additional_family_members_with_variant",
            ],
            ..PLAIN
        },
        TableKind::Biobank => Rules {
            split: true,
            lists: &["child_analytes", "experiment_id", "aligned_id"],
            ..PLAIN
        },
        TableKind::Experiment(DnaShortRead) => Rules {
            ints: &["read_length", "target_insert_size"],
            ..PLAIN
        },
        TableKind::Experiment(RnaShortRead) => Rules {
            split: true,
            ints: &["read_length", "total_reads"],
            floats: &["RIN"],
            ..PLAIN
        },
        TableKind::Experiment(Nanopore) | TableKind::Experiment(PacBio) => Rules {
            bools: &["was_barcoded"],
            ..PLAIN
        },
        TableKind::Aligned(DnaShortRead) => Rules {
            floats: &["mean_coverage"],
            ..PLAIN
        },
        TableKind::Aligned(Nanopore) | TableKind::Aligned(PacBio) => Rules {
            bools: &["methylation_called"],
            ..PLAIN
        },
        TableKind::Aligned(RnaShortRead) | TableKind::ExperimentIndex | TableKind::AlignedIndex => PLAIN,
    }
}

/// Trims the primary key and foreign key fields, which are stored as row keys.
fn trim_keys(mut record: Record, table: TableKind) -> Record {
    let fields = std::iter::once(table.primary_key_field()).chain(table.foreign_keys().into_iter().map(|fk| fk.field));
    for field in fields {
        if let Some(JsonValue::String(value)) = record.get_mut(field) {
            let trimmed = value.trim();
            if trimmed.len() != value.len() {
                *value = trimmed.to_string();
            }
        }
    }
    record
}

/// Table-specific cleaning of one raw record.
pub fn normalize(table: TableKind, raw: &Record) -> Record {
    let rules = rules_for(table);

    let mut record = if rules.split {
        multi_value_split(raw)
    } else {
        trim_keys(raw.clone(), table)
    };
    for field in rules.ints {
        record = coerce_int(record, field);
    }
    for field in rules.floats {
        record = coerce_float(record, field);
    }
    for field in rules.bools {
        record = coerce_bool(record, field);
    }
    for field in rules.lists {
        record = ensure_list(record, field);
    }

    remove_na(&record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: JsonValue) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn remove_na_drops_sentinels() {
        let raw = record(json!({
            "a": "NA", "b": "", "c": ["NA"], "d": [""], "e": null, "f": [null],
            "keep": "value", "keep_list": ["NA", "x"], "zero": 0
        }));
        let cleaned = remove_na(&raw);
        assert_eq!(cleaned, record(json!({"keep": "value", "keep_list": ["NA", "x"], "zero": 0})));
        assert_eq!(raw.len(), 9);
    }

    #[test]
    fn remove_na_is_idempotent() {
        let samples = [
            json!({"key1": "NA", "key2": "valid"}),
            json!({"key1": ["NA"], "key2": "something"}),
            json!({"a": [], "b": [[""]], "c": " NA ", "d": false}),
        ];
        for sample in samples {
            let once = remove_na(&record(sample));
            assert_eq!(remove_na(&once), once);
        }
    }

    #[test]
    fn multi_value_split_and_join_round_trip() {
        let raw = record(json!({"prior_testing": "a|b|c", "single": "  x  ", "list": ["existing"], "n": 3}));
        let split = multi_value_split(&raw);
        assert_eq!(split["prior_testing"], json!(["a", "b", "c"]));
        assert_eq!(split["single"], "x");
        assert_eq!(split["list"], json!(["existing"]));
        assert_eq!(split["n"], 3);
        assert_eq!(join_multi_value(&split["prior_testing"]), "a|b|c");
    }

    #[test]
    fn multi_value_split_trims_each_part() {
        let split = multi_value_split(&record(json!({"pmid_id": " 123 | 456 "})));
        assert_eq!(split["pmid_id"], json!(["123", "456"]));
    }

    #[test]
    fn unparseable_read_length_is_dropped() {
        let table = TableKind::Experiment(SequencingKind::DnaShortRead);
        let out = normalize(table, &record(json!({"read_length": "abc", "target_insert_size": "350"})));
        assert!(!out.contains_key("read_length"));
        assert_eq!(out["target_insert_size"], 350);
    }

    #[test]
    fn key_fields_are_trimmed_on_every_table() {
        let table = TableKind::Aligned(SequencingKind::PacBio);
        let out = normalize(
            table,
            &record(json!({
                "aligned_pac_bio_id": " AL1 ",
                "experiment_pac_bio_id": "PB1\t",
                "alignment_software": " pbmm2 "
            })),
        );
        assert_eq!(out["aligned_pac_bio_id"], "AL1");
        assert_eq!(out["experiment_pac_bio_id"], "PB1");
        assert_eq!(out["alignment_software"], " pbmm2 ");

        let out = normalize(
            TableKind::Experiment(SequencingKind::DnaShortRead),
            &record(json!({"experiment_dna_short_read_id": " E1 ", "analyte_id": " A1"})),
        );
        assert_eq!(out["experiment_dna_short_read_id"], "E1");
        assert_eq!(out["analyte_id"], "A1");
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let out = normalize(
            TableKind::Experiment(SequencingKind::RnaShortRead),
            &record(json!({"read_length": " 151 ", "RIN": "7.5", "total_reads": "NA"})),
        );
        assert_eq!(out["read_length"], 151);
        assert_eq!(out["RIN"], 7.5);
        assert!(!out.contains_key("total_reads"));
    }

    #[test]
    fn barcoded_flags_become_booleans() {
        let table = TableKind::Experiment(SequencingKind::Nanopore);
        assert_eq!(normalize(table, &record(json!({"was_barcoded": "TRUE"})))["was_barcoded"], true);
        assert_eq!(normalize(table, &record(json!({"was_barcoded": "false"})))["was_barcoded"], false);
        assert_eq!(normalize(table, &record(json!({"was_barcoded": "maybe"})))["was_barcoded"], "maybe");
    }

    #[test]
    fn participant_multi_value_fields_become_lists() {
        let out = normalize(
            TableKind::Participant,
            &record(json!({
                "participant_id": "P1",
                "pmid_id": "12345",
                "twin_id": "NA",
                "prior_testing": "panel|exome",
                "age_at_enrollment": "12.5"
            })),
        );
        assert_eq!(out["pmid_id"], json!(["12345"]));
        assert_eq!(out["prior_testing"], json!(["panel", "exome"]));
        assert_eq!(out["age_at_enrollment"], 12.5);
        assert!(!out.contains_key("twin_id"));
    }
}
