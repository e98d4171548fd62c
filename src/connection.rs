//! Connections: one resolved call at a time over a pluggable transport.
//!
//! The byte level is delegated to a [`Transport`]; a [`Connection`] builds
//! the request, applies credentials and hooks, and classifies the outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::CallError;
use crate::types::Method;
use crate::validator::Shape;

/// A request as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute URL without the query string.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// A response as returned by the transport, body already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }
}

/// Network-level failure reported by a transport.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Moves requests to a server and back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Interception point around every request.
///
/// `before` runs after credentials are applied and may change anything in
/// the request; `after` sees the response before it is classified.
/// Returning `Err` rejects the call.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn before(&self, _request: &mut TransportRequest) -> Result<(), String> {
        Ok(())
    }

    async fn after(
        &self,
        _request: &TransportRequest,
        _response: &mut TransportResponse,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Hooks shared by every connection of a manager.
pub(crate) type Hooks = Arc<RwLock<Vec<Arc<dyn Hook>>>>;

/// Per-host authentication.
///
/// Custom `Debug` implementation redacts secrets.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// A fixed header, such as an API key.
    Header { name: String, value: String },
}

impl Credentials {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Credentials::Bearer(token) => {
                headers.insert("Authorization".to_string(), format!("Bearer {}", token));
            }
            Credentials::Header { name, value } => {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Credentials::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Where a connection points: a normalised origin plus optional instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub host: String,
    pub instance: Option<String>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{} ({})", self.host, instance),
            None => f.write_str(&self.host),
        }
    }
}

/// A call resolved down to method, URL and payload.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Shape the response must have, if checked.
    pub response_shape: Option<Shape>,
}

/// A session with one host/instance, shared by every representation
/// targeting it.
pub struct Connection {
    target: Target,
    transport: Arc<dyn Transport>,
    hooks: Hooks,
    credentials: RwLock<Option<Credentials>>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connection {
    pub(crate) fn new(
        target: Target,
        transport: Arc<dyn Transport>,
        hooks: Hooks,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            target,
            transport,
            hooks,
            credentials: RwLock::new(credentials),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    pub fn instance(&self) -> Option<&str> {
        self.target.instance.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Requests currently waiting on the transport.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.credentials.write() = credentials;
    }

    /// Refuse further calls. Requests already in flight run to completion.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = self.in_flight();
        if pending > 0 {
            warn!(target = %self.target, pending, "connection closed with requests in flight");
        } else {
            debug!(target = %self.target, "connection closed");
        }
    }

    /// Execute one call and return the response body.
    ///
    /// # Errors
    ///
    /// Returns `CallError::Transport` for network failures or a closed
    /// connection, `CallError::HookRejected` when a hook refuses the call,
    /// `CallError::Http` for 4xx/5xx statuses and `CallError::SchemaMismatch`
    /// when the body does not have the expected shape.
    pub async fn call(&self, call: &Call) -> Result<Value, CallError> {
        let uri = call.url.clone();
        if self.is_closed() {
            return Err(CallError::Transport {
                uri,
                message: "connection is closed".to_string(),
            });
        }

        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        if call.body.is_some() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        if let Some(credentials) = self.credentials.read().as_ref() {
            credentials.apply(&mut headers);
        }

        let mut request = TransportRequest {
            method: call.method,
            url: call.url.clone(),
            headers,
            query: call.query.clone(),
            body: call.body.clone(),
        };

        let hooks: Vec<Arc<dyn Hook>> = self.hooks.read().clone();
        for hook in &hooks {
            hook.before(&mut request)
                .await
                .map_err(|message| CallError::HookRejected {
                    uri: uri.clone(),
                    message,
                })?;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        let sent = self.transport.send(request.clone()).await;
        drop(guard);

        let mut response = sent.map_err(|e| CallError::Transport {
            uri: uri.clone(),
            message: e.message,
        })?;
        debug!(method = %request.method, url = %request.url, status = response.status, "request complete");

        for hook in &hooks {
            hook.after(&request, &mut response)
                .await
                .map_err(|message| CallError::HookRejected {
                    uri: uri.clone(),
                    message,
                })?;
        }

        let body = if response.status == 204 {
            Value::Null
        } else {
            response.body
        };

        if response.status >= 400 {
            return Err(CallError::Http {
                status: response.status,
                uri,
                body,
            });
        }

        if let (Some(shape), false) = (&call.response_shape, body.is_null()) {
            shape
                .check(&body)
                .map_err(|errors| CallError::SchemaMismatch { uri, errors })?;
        }

        Ok(body)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("credentials", &*self.credentials.read())
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Canned {
        response: TransportResponse,
        seen: Mutex<Vec<TransportRequest>>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.seen.lock().push(request);
            Ok(self.response.clone())
        }
    }

    fn connection(status: u16, body: Value) -> (Connection, Arc<Canned>) {
        let transport = Arc::new(Canned {
            response: TransportResponse::new(status, body),
            seen: Mutex::new(Vec::new()),
        });
        let target = Target {
            host: "https://h1".to_string(),
            instance: None,
        };
        let conn = Connection::new(target, transport.clone(), Hooks::default(), None);
        (conn, transport)
    }

    fn get(url: &str) -> Call {
        Call {
            method: Method::Get,
            url: url.to_string(),
            query: Vec::new(),
            body: None,
            response_shape: None,
        }
    }

    #[tokio::test]
    async fn call_sets_json_headers() {
        let (conn, transport) = connection(200, json!({"id": 1}));
        let mut call = get("https://h1/items");
        call.method = Method::Post;
        call.body = Some(json!({"label": "x"}));
        assert_eq!(conn.call(&call).await.unwrap(), json!({"id": 1}));

        let seen = transport.seen.lock();
        assert_eq!(seen[0].headers["Accept"], "application/json");
        assert_eq!(seen[0].headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let (conn, _) = connection(404, json!({"error": "gone"}));
        match conn.call(&get("https://h1/items/9")).await {
            Err(CallError::Http { status, body, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(body["error"], "gone");
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_content_is_null() {
        let (conn, _) = connection(204, json!("ignored"));
        assert_eq!(conn.call(&get("https://h1/items/1")).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn closed_connection_refuses_calls() {
        let (conn, transport) = connection(200, json!(null));
        conn.close();
        assert!(matches!(
            conn.call(&get("https://h1/x")).await,
            Err(CallError::Transport { .. })
        ));
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn response_shape_is_checked() {
        let (conn, _) = connection(200, json!({"id": "not a number"}));
        let mut call = get("https://h1/items/1");
        call.response_shape = Some(
            Shape::compile(json!({"type": "object", "properties": {"id": {"type": "number"}}})).unwrap(),
        );
        assert!(matches!(
            conn.call(&call).await,
            Err(CallError::SchemaMismatch { errors, .. }) if errors[0].path == "/id"
        ));
    }

    #[test]
    fn credentials_are_redacted() {
        let bearer = Credentials::Bearer("s3cret".into());
        let header = Credentials::Header {
            name: "X-Api-Key".into(),
            value: "k3y".into(),
        };
        let text = format!("{:?} {:?}", bearer, header);
        assert!(!text.contains("s3cret"));
        assert!(!text.contains("k3y"));
        assert!(text.contains("X-Api-Key"));
    }
}
