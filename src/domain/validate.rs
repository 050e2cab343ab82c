//! JSON Schema validation of submitted records.
//!
//! Schemas live at `{schema_dir}/{version}/{table}.json`. Relative-file `$ref`s
//! are inlined before compilation (the validator is built without remote or
//! file resolution); local `#/...` references in the table document are left to
//! the validation engine.

use crate::domain::model::FieldError;
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

const MAX_REF_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema file not found for {0}.")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unresolvable reference {0}")]
    BadRef(String),

    #[error("reference nesting deeper than {MAX_REF_DEPTH} at {0}")]
    TooDeep(String),

    #[error("schema compilation failed: {0}")]
    Compile(String),
}

/// Outcome of validating one record. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn from_schema_error(err: &SchemaError) -> Self {
        let message = match err {
            SchemaError::NotFound(_) => err.to_string(),
            other => format!("An unexpected error occurred: {}.", other),
        };
        Self {
            valid: false,
            errors: vec![FieldError::new("Schema", message)],
        }
    }
}

struct CompiledSchema {
    document: Arc<JsonValue>,
    compiled: JSONSchema,
}

/// Process-wide schema cache for the active schema version.
///
/// Entries are compiled lazily on first use and kept until [`SchemaValidator::reload`].
/// A missing schema file is never cached, so dropping a file in place makes it
/// available without a reload.
pub struct SchemaValidator {
    root: PathBuf,
    version: String,
    cache: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaValidator {
    pub fn new(schema_dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        let version = version.into();
        let root = schema_dir.into().join(&version);
        Self {
            root,
            version,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Validates `record` against the schema named `table_name`.
    pub fn validate(&self, record: &JsonValue, table_name: &str) -> ValidationResult {
        let schema = match self.load(table_name) {
            Ok(schema) => schema,
            Err(err) => {
                tracing::warn!(table = table_name, error = %err, "schema unavailable");
                return ValidationResult::from_schema_error(&err);
            }
        };

        let errors: Vec<FieldError> = match schema.compiled.validate(record) {
            Ok(()) => return ValidationResult::ok(),
            Err(iter) => iter
                .map(|error| {
                    let missing = match &error.kind {
                        ValidationErrorKind::Required { property } => Some(match property.as_str() {
                            Some(s) => s.to_string(),
                            None => property.to_string(),
                        }),
                        _ => None,
                    };
                    let mut path = error.instance_path.clone().into_vec();
                    path.extend(missing);
                    FieldError::new(field_label(&path), error.to_string())
                })
                .collect(),
        };
        ValidationResult::from_errors(errors)
    }

    /// The fully dereferenced schema document for `table_name`.
    pub fn schema(&self, table_name: &str) -> Result<Arc<JsonValue>, SchemaError> {
        self.load(table_name).map(|s| s.document.clone())
    }

    /// Drops every cached schema; the next validation re-reads from disk.
    pub fn reload(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let dropped = cache.len();
        cache.clear();
        tracing::info!(version = %self.version, dropped, "schema cache cleared");
    }

    fn load(&self, table_name: &str) -> Result<Arc<CompiledSchema>, SchemaError> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(table_name) {
                return Ok(hit.clone());
            }
        }

        let path = self.root.join(format!("{}.json", table_name));
        if !path.is_file() {
            return Err(SchemaError::NotFound(table_name.to_string()));
        }
        let raw = read_json(&path)?;
        let document = dereference(raw, &path, &self.root, 0)?;
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|e| SchemaError::Compile(e.to_string()))?;

        let entry = Arc::new(CompiledSchema {
            document: Arc::new(document),
            compiled,
        });
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let entry = cache.entry(table_name.to_string()).or_insert(entry).clone();
        tracing::debug!(table = table_name, "schema compiled");
        Ok(entry)
    }
}

fn read_json(path: &Path) -> Result<JsonValue, SchemaError> {
    let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SchemaError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Inlines relative-file `$ref`s of `node`, which was read from `origin`.
///
/// Inside an inlined external document, its own `#/...` references are resolved
/// against that document. Local references of the table document (depth 0)
/// stay as they are.
fn dereference(node: JsonValue, origin: &Path, root: &Path, depth: usize) -> Result<JsonValue, SchemaError> {
    let external = depth > 0;
    match node {
        JsonValue::Object(map) => {
            if let Some(JsonValue::String(reference)) = map.get("$ref") {
                let is_local = reference.starts_with('#');
                if !is_local || external {
                    if depth >= MAX_REF_DEPTH {
                        return Err(SchemaError::TooDeep(reference.clone()));
                    }
                    let (target, target_path) = resolve_ref(reference, origin, root)?;
                    return dereference(target, &target_path, root, depth + 1);
                }
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key, dereference(value, origin, root, depth)?);
            }
            Ok(JsonValue::Object(out))
        }
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| dereference(item, origin, root, depth))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        other => Ok(other),
    }
}

fn resolve_ref(reference: &str, origin: &Path, root: &Path) -> Result<(JsonValue, PathBuf), SchemaError> {
    let (file, fragment) = match reference.split_once('#') {
        Some((file, fragment)) => (file, fragment),
        None => (reference, ""),
    };

    let target_path = if file.is_empty() {
        origin.to_path_buf()
    } else {
        let base = origin.parent().unwrap_or(root);
        base.join(file)
    };
    let document = read_json(&target_path)?;

    let target = if fragment.is_empty() {
        document
    } else {
        document
            .pointer(fragment)
            .cloned()
            .ok_or_else(|| SchemaError::BadRef(reference.to_string()))?
    };
    Ok((target, target_path))
}

/// Client-facing field label: path segments joined with `.`, bracket and
/// quote characters removed, each word capitalised (`read_length` -> `Read_Length`).
pub fn field_label(path: &[String]) -> String {
    let joined: String = path
        .join(".")
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '\'' | '"'))
        .collect();
    title_case(&joined)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}
