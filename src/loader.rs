//! Raw document loading.
//!
//! The store never goes looking for documents by itself; content arrives
//! either directly or through a [`SchemaLoader`] asked for one identifier.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::LoadError;

/// Supplies raw document content by identifier.
pub trait SchemaLoader: Send + Sync {
    /// Return the parsed content of document `id`.
    fn load(&self, id: &str) -> Result<Value, LoadError>;
}

/// Loader backed by a map of document identifiers to files.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    files: HashMap<String, PathBuf>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the file holding document `id`.
    pub fn register(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.files.insert(id.into(), path.into());
        self
    }
}

impl SchemaLoader for FileLoader {
    fn load(&self, id: &str) -> Result<Value, LoadError> {
        let path = self
            .files
            .get(id)
            .ok_or_else(|| LoadError::UnknownDocument { id: id.to_string() })?;
        load_document(path)
    }
}

/// Loader serving documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, Value>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, document: Value) -> &mut Self {
        self.documents.insert(id.into(), document);
        self
    }
}

impl SchemaLoader for MemoryLoader {
    fn load(&self, id: &str) -> Result<Value, LoadError> {
        self.documents
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::UnknownDocument { id: id.to_string() })
    }
}

/// Load a document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content)
}

/// Load a document from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Navigate a JSON Pointer fragment (e.g., "#/resources/item").
///
/// Returns `None` when any segment is missing.
pub fn navigate_fragment<'a>(document: &'a Value, fragment: &str) -> Option<&'a Value> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Some(document);
    }

    let mut current = document;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            other => other.get(&key)?,
        };
    }
    Some(current)
}

/// Identifiers of other documents a raw document refers to.
///
/// Walks every `$ref` and relation `resource` string; used to order loads.
pub fn external_documents(document: &Value) -> BTreeSet<String> {
    let own_id = document.get("id").and_then(Value::as_str).unwrap_or("");
    let mut found = BTreeSet::new();
    collect_external(document, own_id, &mut found);
    found
}

fn collect_external(value: &Value, own_id: &str, found: &mut BTreeSet<String>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                if let ("$ref" | "resource", Value::String(reference)) = (key.as_str(), child) {
                    if let Some(idx) = reference.find('#') {
                        let doc = &reference[..idx];
                        if !doc.is_empty() && doc != own_id {
                            found.insert(doc.to_string());
                        }
                    }
                }
                collect_external(child, own_id, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_external(item, own_id, found);
            }
        }
        _ => {}
    }
}
