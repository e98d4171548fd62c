//! Schema store: the registry of loaded documents and their catalog.
//!
//! The store is an explicit value shared by `Arc`. Documents and compiled
//! definitions are immutable once registered; callers hold `Arc`s to them
//! and read them without going through the store's lock.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::{Catalog, ResourceDef};
use crate::compose::absolute_reference;
use crate::document::SchemaDocument;
use crate::error::{LoadError, ResolutionError};
use crate::loader::{external_documents, load_document, SchemaLoader};
use crate::resolver::{Documents, Resolver};
use crate::schema::{SchemaRef, TypeDef};

#[derive(Debug, Default)]
struct State {
    documents: Documents,
    catalog: Catalog,
}

/// Registry of resource-definition documents.
#[derive(Debug, Default)]
pub struct SchemaStore {
    state: RwLock<State>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw document.
    ///
    /// Every type and resource it declares is resolved and compiled first;
    /// on failure the store is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::DuplicateDocument` for an identifier that is
    /// already loaded, or any resolution failure inside the document.
    pub fn load(&self, raw: Value) -> Result<Arc<SchemaDocument>, LoadError> {
        let document = Arc::new(SchemaDocument::parse(raw)?);
        let id = document.id().to_string();

        let mut state = self.state.write();
        if state.documents.contains_key(&id) {
            return Err(LoadError::DuplicateDocument { id });
        }

        let mut staged = state.documents.clone();
        staged.insert(id.clone(), document.clone());
        let fresh = Catalog::compile(&staged, &state.catalog, &document)?;
        let resources = fresh.resource_count();

        state.documents = staged;
        state.catalog.extend(fresh);
        info!(document = %id, resources, "registered schema document");
        Ok(document)
    }

    /// Read and register a document file.
    ///
    /// # Errors
    ///
    /// Returns I/O and parse failures, or any error from [`SchemaStore::load`].
    pub fn load_document(&self, path: &Path) -> Result<Arc<SchemaDocument>, LoadError> {
        self.load(load_document(path)?)
    }

    /// Register document `id` through `loader`, dependencies first.
    ///
    /// Each identifier is asked of the loader at most once; documents that
    /// are already registered are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns the loader's failure or any error from [`SchemaStore::load`].
    pub fn load_from(&self, loader: &dyn SchemaLoader, id: &str) -> Result<Arc<SchemaDocument>, LoadError> {
        let mut visiting = BTreeSet::new();
        self.load_with_dependencies(loader, id, &mut visiting)
    }

    fn load_with_dependencies(
        &self,
        loader: &dyn SchemaLoader,
        id: &str,
        visiting: &mut BTreeSet<String>,
    ) -> Result<Arc<SchemaDocument>, LoadError> {
        if let Some(document) = self.document(id) {
            return Ok(document);
        }
        visiting.insert(id.to_string());

        let raw = loader.load(id)?;
        for dependency in external_documents(&raw) {
            if !visiting.contains(&dependency) && !self.contains(&dependency) {
                debug!(document = %id, %dependency, "loading dependency");
                self.load_with_dependencies(loader, &dependency, visiting)?;
            }
        }
        self.load(raw)
    }

    /// Fully flattened definition at `reference`.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedDocument` when the reference leaves the loaded
    /// documents, or any other resolution failure.
    pub fn resolve(&self, reference: &SchemaRef) -> Result<Arc<TypeDef>, LoadError> {
        let def = {
            let state = self.state.read();
            if let Some(def) = state.catalog.definition(reference) {
                return Ok(def);
            }
            Arc::new(Resolver::new(&state.documents).resolve(reference)?)
        };
        self.state.write().catalog.insert_definition(def.clone());
        Ok(def)
    }

    /// Resolve a reference as written in document `current`.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedDocument` if `current` is not loaded, or any error
    /// from [`SchemaStore::resolve`].
    pub fn resolve_str(&self, raw: &str, current: &str) -> Result<Arc<TypeDef>, LoadError> {
        let document = self.document(current).ok_or_else(|| LoadError::UnresolvedDocument {
            id: current.to_string(),
            reference: raw.to_string(),
        })?;
        let absolute = absolute_reference(raw, &document, false);
        let reference = SchemaRef::parse(&absolute, current)
            .map_err(|message| LoadError::malformed(current, "", message))?;
        self.resolve(&reference)
    }

    /// Compiled resource `name` of document `document`.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchResource` when either is unknown.
    pub fn resource(&self, document: &str, name: &str) -> Result<Arc<ResourceDef>, ResolutionError> {
        self.resource_at(&SchemaRef::resource(document, name))
            .ok_or_else(|| ResolutionError::NoSuchResource {
                document: document.to_string(),
                name: name.to_string(),
            })
    }

    pub fn resource_at(&self, reference: &SchemaRef) -> Option<Arc<ResourceDef>> {
        self.state.read().catalog.resource(reference)
    }

    /// Compiled definition, if it was reached while loading.
    pub fn definition(&self, reference: &SchemaRef) -> Option<Arc<TypeDef>> {
        self.state.read().catalog.definition(reference)
    }

    pub fn document(&self, id: &str) -> Option<Arc<SchemaDocument>> {
        self.state.read().documents.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().documents.contains_key(id)
    }

    pub fn documents(&self) -> Vec<Arc<SchemaDocument>> {
        self.state.read().documents.values().cloned().collect()
    }

    /// Drop every document and compiled definition.
    pub fn reset(&self) {
        let mut state = self.state.write();
        let dropped = state.documents.len();
        *state = State::default();
        info!(documents = dropped, "schema store reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use serde_json::json;

    fn catalog_doc() -> Value {
        json!({
            "id": "cat",
            "types": { "address": { "type": "string" } },
            "resources": {
                "item": {
                    "type": "object",
                    "properties": { "home": { "$ref": "address" } },
                    "links": { "self": { "path": "$/items/{id}" }, "get": { "method": "GET" } }
                }
            }
        })
    }

    #[test]
    fn load_registers_document_and_resources() {
        let store = SchemaStore::new();
        store.load(catalog_doc()).unwrap();
        assert!(store.contains("cat"));
        assert_eq!(store.resource("cat", "item").unwrap().name(), "item");
        assert!(matches!(
            store.resource("cat", "nope"),
            Err(ResolutionError::NoSuchResource { .. })
        ));
    }

    #[test]
    fn duplicate_document_is_rejected() {
        let store = SchemaStore::new();
        store.load(catalog_doc()).unwrap();
        assert!(matches!(
            store.load(catalog_doc()),
            Err(LoadError::DuplicateDocument { .. })
        ));
    }

    #[test]
    fn failed_load_leaves_store_unchanged() {
        let store = SchemaStore::new();
        let result = store.load(json!({
            "id": "bad",
            "types": { "a": { "$ref": "#/types/b" }, "b": { "$ref": "#/types/a" } }
        }));
        assert!(matches!(result, Err(LoadError::CyclicReference { .. })));
        assert!(!store.contains("bad"));
        assert!(store.documents().is_empty());
    }

    #[test]
    fn resolve_str_accepts_bare_names() {
        let store = SchemaStore::new();
        store.load(catalog_doc()).unwrap();
        let def = store.resolve_str("address", "cat").unwrap();
        assert_eq!(def.id, SchemaRef::type_("cat", "address"));
        let again = store.resolve(&SchemaRef::type_("cat", "address")).unwrap();
        assert_eq!(*def, *again);
    }

    #[test]
    fn load_from_pulls_dependencies_first() {
        let mut loader = MemoryLoader::new();
        loader.insert(
            "foo",
            json!({
                "id": "foo",
                "resources": {
                    "foo": {
                        "links": { "self": { "path": "$/foos/{id}" } },
                        "relations": { "bar": { "resource": "bar#/resources/bar", "vars": { "id": "0/bar_id" } } }
                    }
                }
            }),
        );
        loader.insert(
            "bar",
            json!({
                "id": "bar",
                "resources": { "bar": { "links": { "self": { "path": "$/bars/{id}" } } } }
            }),
        );

        let store = SchemaStore::new();
        store.load_from(&loader, "foo").unwrap();
        assert!(store.contains("bar"));
        assert!(store.contains("foo"));
        // Already registered: not asked of the loader again.
        store.load_from(&MemoryLoader::new(), "foo").unwrap();
    }

    #[test]
    fn reset_forgets_everything() {
        let store = SchemaStore::new();
        store.load(catalog_doc()).unwrap();
        store.reset();
        assert!(!store.contains("cat"));
        assert!(store.definition(&SchemaRef::type_("cat", "address")).is_none());
        store.load(catalog_doc()).unwrap();
    }
}
