//! Document checking - static analysis of resource-definition files.
//!
//! Checks a set of document files for:
//! - JSON syntax errors and malformed document layout
//! - Broken or cyclic references, within and across the set
//! - Links without a method
//! - Relation variables the target resource cannot take

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::compose::absolute_reference;
use crate::document::SchemaDocument;
use crate::error::LoadError;
use crate::loader::{external_documents, load_document, navigate_fragment};
use crate::store::SchemaStore;
use crate::types::SELF_LINK;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from checking.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// JSON path to the issue (e.g., "/resources/item/links/get")
    pub path: String,
    pub message: String,
}

/// Result of checking a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a checked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of checking a set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub paths: Vec<PathBuf>,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if no file has errors.
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

struct Entry {
    file: PathBuf,
    document: Option<Arc<SchemaDocument>>,
    diagnostics: Vec<Diagnostic>,
}

impl Entry {
    fn push(&mut self, severity: Severity, code: &str, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            code: code.to_string(),
            file: self.file.clone(),
            path: path.into(),
            message: message.into(),
        });
    }

    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Check files and directories as one set of documents.
///
/// Directories are searched recursively for `.json` files. Documents are
/// loaded into a fresh store with dependencies first, so cross-document
/// references between members of the set resolve. If `strict` is true,
/// warnings are treated as errors.
pub fn lint(paths: &[PathBuf], strict: bool) -> LintResult {
    let files: Vec<PathBuf> = paths.iter().flat_map(|p| collect_schema_files(p)).collect();
    let mut entries: Vec<Entry> = files.iter().map(|f| parse_file(f)).collect();

    // Later files may not reuse an identifier.
    let mut known: BTreeMap<String, Arc<SchemaDocument>> = BTreeMap::new();
    for entry in &mut entries {
        let Some(document) = entry.document.clone() else {
            continue;
        };
        if known.contains_key(document.id()) {
            entry.push(
                Severity::Error,
                "E006",
                "/id",
                format!("document '{}' is defined more than once", document.id()),
            );
            entry.document = None;
        } else {
            known.insert(document.id().to_string(), document);
        }
    }

    for entry in &mut entries {
        if let Some(document) = entry.document.clone() {
            check_refs(document.raw(), "", &document, &known, entry);
        }
    }

    let store = SchemaStore::new();
    for idx in load_order(&entries) {
        let entry = &mut entries[idx];
        let Some(document) = entry.document.clone() else {
            continue;
        };
        match store.load(document.raw().clone()) {
            Ok(_) => check_loaded(&store, &document, entry),
            Err(error) => report_load_error(&error, entry),
        }
    }

    let results: Vec<FileResult> = entries.into_iter().map(finish).collect();
    let errors = count(&results, Severity::Error);
    let warnings = count(&results, Severity::Warning);
    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        paths: paths.to_vec(),
        files_checked: results.len(),
        passed: results.len() - failed,
        failed,
        errors,
        warnings,
        results,
    }
}

/// Check a single document file on its own.
pub fn lint_file(file: &Path) -> FileResult {
    let mut result = lint(&[file.to_path_buf()], false);
    result.results.pop().unwrap_or(FileResult {
        file: file.to_path_buf(),
        document: None,
        status: FileStatus::Error,
        diagnostics: vec![Diagnostic {
            severity: Severity::Error,
            code: "E001".to_string(),
            file: file.to_path_buf(),
            path: "/".to_string(),
            message: "not a .json file".to_string(),
        }],
    })
}

fn parse_file(file: &Path) -> Entry {
    let mut entry = Entry {
        file: file.to_path_buf(),
        document: None,
        diagnostics: Vec::new(),
    };

    let raw = match load_document(file) {
        Ok(raw) => raw,
        Err(e) => {
            entry.push(Severity::Error, "E001", "/", format!("syntax error: {}", e));
            return entry;
        }
    };
    match SchemaDocument::parse(raw) {
        Ok(document) => {
            if document.resource_names().is_empty() {
                entry.push(Severity::Warning, "W002", "/resources", "document defines no resources");
            }
            entry.document = Some(Arc::new(document));
        }
        Err(LoadError::MalformedSchema { path, message, .. }) => {
            entry.push(Severity::Error, "E002", path, format!("invalid document: {}", message));
        }
        Err(e) => entry.push(Severity::Error, "E002", "/", format!("invalid document: {}", e)),
    }
    entry
}

/// Recursively check `$ref` values and relation targets in a document.
fn check_refs(
    value: &Value,
    path: &str,
    document: &SchemaDocument,
    known: &BTreeMap<String, Arc<SchemaDocument>>,
    entry: &mut Entry,
) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                check_single_ref(reference, false, &format!("{}/$ref", path), document, known, entry);
            }
            if let Some(Value::Object(relations)) = map.get("relations") {
                for (name, relation) in relations {
                    if let Some(Value::String(target)) = relation.get("resource") {
                        let at = format!("{}/relations/{}/resource", path, name);
                        check_single_ref(target, true, &at, document, known, entry);
                    }
                }
            }

            for (key, val) in map {
                let child_path = format!("{}/{}", path, escape(key));
                check_refs(val, &child_path, document, known, entry);
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                let child_path = format!("{}/{}", path, i);
                check_refs(item, &child_path, document, known, entry);
            }
        }
        _ => {}
    }
}

/// Check a single reference resolves inside the set.
fn check_single_ref(
    raw: &str,
    prefer_resource: bool,
    path: &str,
    document: &SchemaDocument,
    known: &BTreeMap<String, Arc<SchemaDocument>>,
    entry: &mut Entry,
) {
    let absolute = absolute_reference(raw, document, prefer_resource);
    let Some(idx) = absolute.find('#') else {
        return;
    };
    let (doc_id, fragment) = (&absolute[..idx], &absolute[idx..]);

    let Some(target) = known.get(doc_id) else {
        entry.push(
            Severity::Error,
            "E003",
            path,
            format!("reference {} needs document '{}', which is not in the set", raw, doc_id),
        );
        return;
    };
    if navigate_fragment(target.raw(), fragment).is_none() {
        entry.push(Severity::Error, "E003", path, format!("reference not found: {}", raw));
    }
}

/// Indices of the loadable entries, each after the documents it refers to.
///
/// Entries caught in a mutual dependency come last, in file order.
fn load_order(entries: &[Entry]) -> Vec<usize> {
    let mut pending: Vec<(usize, BTreeSet<String>)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.has_errors())
        .filter_map(|(i, e)| e.document.as_ref().map(|d| (i, external_documents(d.raw()))))
        .collect();
    let ids: BTreeSet<String> = pending
        .iter()
        .filter_map(|(i, _)| entries[*i].document.as_ref().map(|d| d.id().to_string()))
        .collect();

    let mut placed: BTreeSet<String> = BTreeSet::new();
    let mut order = Vec::new();
    loop {
        let ready: Vec<usize> = pending
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| placed.contains(d) || !ids.contains(d)))
            .map(|(i, _)| *i)
            .collect();
        if ready.is_empty() {
            break;
        }
        for i in &ready {
            if let Some(document) = &entries[*i].document {
                placed.insert(document.id().to_string());
            }
        }
        pending.retain(|(i, _)| !ready.contains(i));
        order.extend(ready);
    }
    order.extend(pending.into_iter().map(|(i, _)| i));
    order
}

fn report_load_error(error: &LoadError, entry: &mut Entry) {
    match error {
        LoadError::CyclicReference { chain, .. } => {
            entry.push(Severity::Error, "E004", "/", format!("cyclic reference: {}", chain.join(" -> ")))
        }
        LoadError::UnresolvedDocument { .. } | LoadError::UnresolvedReference { .. } => {
            entry.push(Severity::Error, "E003", "/", error.to_string())
        }
        LoadError::MalformedSchema { path, message, .. } => {
            entry.push(Severity::Error, "E005", path.clone(), message.clone())
        }
        LoadError::DuplicateDocument { .. } => entry.push(Severity::Error, "E006", "/id", error.to_string()),
        other => entry.push(Severity::Error, "E002", "/", other.to_string()),
    }
}

/// Checks that need compiled resources.
fn check_loaded(store: &SchemaStore, document: &SchemaDocument, entry: &mut Entry) {
    for name in document.resource_names() {
        let Ok(resource) = store.resource(document.id(), &name) else {
            continue;
        };

        for link in resource.links() {
            if link.declared_method().is_none() && link.name() != SELF_LINK {
                entry.push(
                    Severity::Warning,
                    "W001",
                    format!("/resources/{}/links/{}", escape(&name), escape(link.name())),
                    format!("link '{}' has no method and cannot be called", link.name()),
                );
            }
        }

        for relation in resource.relations() {
            let at = format!("/resources/{}/relations/{}", escape(&name), escape(relation.name()));
            let Some(target) = store.resource_at(relation.resource()) else {
                continue;
            };
            let Some(template) = target.self_path() else {
                entry.push(
                    Severity::Error,
                    "E007",
                    at,
                    format!("relation target {} has no self link", relation.resource()),
                );
                continue;
            };
            for (var, _) in relation.vars() {
                if !template.has_variable(var) && !target.self_params().contains(var) {
                    entry.push(
                        Severity::Error,
                        "E007",
                        format!("{}/vars/{}", at, escape(var)),
                        format!(
                            "'{}' is neither a placeholder of {} nor a declared parameter",
                            var, template
                        ),
                    );
                }
            }
        }
    }
}

fn finish(entry: Entry) -> FileResult {
    let has_errors = entry.has_errors();
    let has_warnings = entry.diagnostics.iter().any(|d| d.severity == Severity::Warning);

    let status = if has_errors {
        FileStatus::Error
    } else if has_warnings {
        FileStatus::Warning
    } else {
        FileStatus::Ok
    };

    FileResult {
        file: entry.file,
        document: entry.document.map(|d| d.id().to_string()),
        status,
        diagnostics: entry.diagnostics,
    }
}

fn count(results: &[FileResult], severity: Severity) -> usize {
    results
        .iter()
        .flat_map(|r| &r.diagnostics)
        .filter(|d| d.severity == severity)
        .count()
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Collect all .json files in a path (file or directory).
fn collect_schema_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            return vec![path.to_path_buf()];
        }
        return vec![];
    }
    if !path.exists() {
        // Reported as a read error by `parse_file`.
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
