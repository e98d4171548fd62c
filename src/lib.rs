//! restwalk
//!
//! Schema-driven REST client runtime. Resource-definition documents declare
//! types, resources, links (HTTP operations) and relations (navigational
//! edges). This library compiles them into an immutable catalog and exposes
//! every remote resource as a lazily fetched, cached [`DataRep`].
//!
//! # Example
//!
//! ```
//! use restwalk::{SchemaStore, SchemaRef};
//! use serde_json::json;
//!
//! let store = SchemaStore::new();
//! store
//!     .load(json!({
//!         "id": "shop",
//!         "resources": {
//!             "item": {
//!                 "type": "object",
//!                 "properties": { "id": { "type": "integer" } },
//!                 "links": {
//!                     "self": { "path": "$/items/{id}" },
//!                     "get": { "method": "GET" }
//!                 }
//!             }
//!         }
//!     }))
//!     .unwrap();
//!
//! let item = store.resource("shop", "item").unwrap();
//! assert_eq!(item.self_path().unwrap().as_str(), "$/items/{id}");
//! assert!(store.resolve(&SchemaRef::type_("shop", "nothing")).is_err());
//! ```
//!
//! # Navigation
//!
//! | Step | Call | Network |
//! |------|------|---------|
//! | bind a resource | [`Service::bind`] | none |
//! | read data | [`DataRep::get`] | one `GET`, shared by concurrent callers |
//! | follow a relation | [`DataRep::relation`] | the source, if not cached |
//! | call a link | [`DataRep::invoke`] | one request |
//!
//! # Relation expressions
//!
//! Relation variables are extracted from the source data with relative
//! pointers:
//! ```json
//! { "vars": { "id": "0/bar_id", "$host": "0/bar_server" } }
//! ```
//! `N/path` climbs `N` levels from the current fragment; `/path` starts at
//! the root of the resource's data.

mod catalog;
mod compose;
mod config;
mod connection;
mod datarep;
mod document;
mod error;
mod link;
mod linter;
mod loader;
mod manager;
mod pointer;
mod relation;
mod resolver;
mod schema;
mod service;
mod store;
mod types;
mod validator;

#[cfg(feature = "remote")]
mod transport;

pub use catalog::ResourceDef;
pub use compose::merge_definitions;
pub use config::{PathRoot, RuntimeConfig};
pub use connection::{
    Call, Connection, Credentials, Hook, Target, Transport, TransportError, TransportRequest,
    TransportResponse,
};
pub use datarep::{DataRep, FetchState};
pub use document::SchemaDocument;
pub use error::{CallError, ConfigError, Error, LoadError, ResolutionError, SchemaError};
pub use link::{CompiledLink, PathTemplate};
pub use linter::{lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{
    external_documents, load_document, load_document_str, navigate_fragment, FileLoader,
    MemoryLoader, SchemaLoader,
};
pub use manager::{normalize_host, ConnectionManager, Connector};
pub use pointer::{Expr, Pointer};
pub use relation::{CompiledRelation, RelationTarget};
pub use schema::{LinkDef, PropertyDef, RelationDef, SchemaRef, TypeDef, TypeSlot};
pub use service::{Runtime, Service};
pub use store::SchemaStore;
pub use types::{Kind, Method, ScalarKind, Vars};
pub use validator::{validate_against_schema, Shape};

#[cfg(feature = "remote")]
pub use transport::{ReqwestConnector, ReqwestTransport};
