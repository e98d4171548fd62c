//! Error types for schema loading, navigation and remote calls.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Errors while loading a resource-definition document.
///
/// A document that fails with any of these is never registered.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Schema errors (exit code 2)
    #[error("cyclic reference {reference} (via {})", chain.join(" -> "))]
    CyclicReference {
        reference: String,
        chain: Vec<String>,
    },

    #[error("reference {reference} needs document '{id}', which is not loaded")]
    UnresolvedDocument { id: String, reference: String },

    #[error("reference {reference} does not point at a definition")]
    UnresolvedReference { reference: String },

    #[error("malformed schema at {document}#{path}: {message}")]
    MalformedSchema {
        document: String,
        path: String,
        message: String,
    },

    #[error("document '{id}' is already loaded")]
    DuplicateDocument { id: String },

    #[error("no loader entry for document '{id}'")]
    UnknownDocument { id: String },
}

impl LoadError {
    pub(crate) fn malformed(
        document: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LoadError::MalformedSchema {
            document: document.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors local to one navigation attempt.
///
/// These never invalidate the schema store or other representations.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("no value for path variable '{variable}' in {template}")]
    MissingPathVariable { template: String, variable: String },

    #[error("path variable '{variable}' must be a scalar, got {actual}")]
    InvalidPathVariable { variable: String, actual: String },

    #[error("invalid parameter '{parameter}' for {template}")]
    InvalidParameter { template: String, parameter: String },

    #[error("relation '{relation}': {expression} addresses {pointer}, which is absent from the data")]
    UnresolvedInstance {
        relation: String,
        expression: String,
        pointer: String,
    },

    #[error("document '{document}' has no resource '{name}'")]
    NoSuchResource { document: String, name: String },

    #[error("{resource} has no link '{link}'")]
    NoSuchLink { resource: String, link: String },

    #[error("{resource} has no relation '{relation}'")]
    NoSuchRelation { resource: String, relation: String },

    #[error("{resource} has no property '{property}'")]
    NoSuchProperty { resource: String, property: String },

    #[error("{resource} cannot be bound: it has no 'self' link")]
    NotBindable { resource: String },

    #[error("link '{link}' of {resource} has no method")]
    NoMethod { resource: String, link: String },

    #[error("payload for link '{link}' does not match its request type ({} error(s))", errors.len())]
    InvalidPayload {
        link: String,
        errors: Vec<SchemaError>,
    },

    #[error("{uri} was bound with query parameters and is read-only")]
    ReadOnly { uri: String },

    #[error("{uri} has no data at {pointer}")]
    FragmentNotFound { uri: String, pointer: String },
}

/// Errors from executing a call against a server.
///
/// Cloneable so that every caller coalesced onto one fetch receives it.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("transport failure for {uri}: {message}")]
    Transport { uri: String, message: String },

    #[error("HTTP {status} from {uri}")]
    Http { status: u16, uri: String, body: Value },

    #[error("response from {uri} does not match its declared type ({} error(s))", errors.len())]
    SchemaMismatch {
        uri: String,
        errors: Vec<SchemaError>,
    },

    #[error("fetch of {uri} was cancelled")]
    Cancelled { uri: String },

    #[error("request to {uri} rejected by hook: {message}")]
    HookRejected { uri: String, message: String },
}

impl CallError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CallError::Http { .. } => 1,
            CallError::SchemaMismatch { .. } => 2,
            _ => 3,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid host '{host}': {message}")]
    InvalidHost { host: String, message: String },

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Any error produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Load(e) => e.exit_code(),
            Error::Call(e) => e.exit_code(),
            Error::Resolution(_) | Error::Config(_) => 2,
        }
    }
}

/// Single shape error with path context.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the offending value.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
