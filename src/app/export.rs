//! Tab-separated export of a whole table, and a zip bundle of every table.

use crate::domain::model::{Record, TableKind};
use crate::domain::normalize::join_multi_value;
use crate::domain::validate::SchemaValidator;
use crate::storage::RecordStore;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Column order: primary key first, then the schema's properties and any extra
/// stored fields, alphabetically.
fn columns(table: TableKind, validator: &SchemaValidator, records: &[Record]) -> Vec<String> {
    let pk = table.primary_key_field();
    let mut rest = BTreeSet::new();
    if let Ok(schema) = validator.schema(table.schema_name()) {
        if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
            rest.extend(properties.keys().cloned());
        }
    }
    for record in records {
        rest.extend(record.keys().cloned());
    }
    rest.remove(pk);

    std::iter::once(pk.to_string()).chain(rest).collect()
}

fn cell(record: &Record, column: &str) -> String {
    record
        .get(column)
        .map(join_multi_value)
        .unwrap_or_default()
        .replace(['\t', '\n', '\r'], " ")
}

/// Renders `records` as TSV with a header row. Lists are joined with `|`.
pub fn render_tsv(table: TableKind, validator: &SchemaValidator, records: &[Record]) -> String {
    let columns = columns(table, validator, records);
    let mut out = columns.join("\t");
    out.push('\n');
    for record in records {
        let row: Vec<String> = columns.iter().map(|c| cell(record, c)).collect();
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

pub async fn generate_tsv(
    store: &dyn RecordStore,
    validator: &SchemaValidator,
    table: TableKind,
) -> anyhow::Result<String> {
    let records: Vec<Record> = store.list(table).await?.into_iter().map(|(_, r)| r).collect();
    tracing::info!(table = %table, rows = records.len(), "exporting table");
    Ok(render_tsv(table, validator, &records))
}

/// Zip archive with one `{table}.tsv` entry per table, empty tables included.
pub async fn generate_bundle(store: &dyn RecordStore, validator: &SchemaValidator) -> anyhow::Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    for table in TableKind::ALL {
        let tsv = generate_tsv(store, validator, table).await?;
        writer.start_file(format!("{}.tsv", table.name()), options)?;
        writer.write_all(tsv.as_bytes())?;
    }

    let bytes = writer.finish()?.into_inner();
    tracing::info!(tables = TableKind::ALL.len(), bytes = bytes.len(), "table bundle built");
    Ok(bytes)
}
