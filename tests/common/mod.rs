//! In-memory simulated server shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use restwalk::{
    ConfigError, ConnectionManager, Connector, Method, Runtime, RuntimeConfig, SchemaStore, Target,
    Transport, TransportError, TransportRequest, TransportResponse,
};
use serde_json::{json, Value};
use tokio::sync::watch;

/// Answers requests from a fixed route table, keyed by method and URL.
pub struct SimServer {
    routes: Mutex<HashMap<(Method, String), (u16, Value)>>,
    calls: Mutex<Vec<TransportRequest>>,
    connected: Mutex<Vec<Target>>,
    /// Requests wait while this is `false`.
    gate: watch::Sender<bool>,
}

impl SimServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            connected: Mutex::new(Vec::new()),
            gate: watch::Sender::new(true),
        })
    }

    pub fn route(&self, method: Method, url: &str, status: u16, body: Value) -> &Self {
        self.routes.lock().insert((method, url.to_string()), (status, body));
        self
    }

    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn connected(&self) -> Vec<Target> {
        self.connected.lock().clone()
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until at least `n` requests have arrived.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..400 {
            if self.calls.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} calls, saw {}", n, self.calls.lock().len());
    }
}

#[async_trait]
impl Transport for SimServer {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push(request.clone());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let route = self
            .routes
            .lock()
            .get(&(request.method, request.url.clone()))
            .cloned();
        match route {
            Some((status, body)) => Ok(TransportResponse::new(status, body)),
            None => Ok(TransportResponse::new(404, json!({"error": "no route"}))),
        }
    }
}

pub struct SimConnector(pub Arc<SimServer>);

impl Connector for SimConnector {
    fn connect(&self, target: &Target) -> Result<Arc<dyn Transport>, ConfigError> {
        self.0.connected.lock().push(target.clone());
        Ok(self.0.clone())
    }
}

/// A runtime over `documents`, loaded in order, talking to `server`.
pub fn runtime(server: &Arc<SimServer>, documents: &[Value], config: RuntimeConfig) -> Runtime {
    let store = SchemaStore::new();
    for document in documents {
        store.load(document.clone()).unwrap();
    }
    let manager = ConnectionManager::new(SimConnector(server.clone()));
    Runtime::new(Arc::new(store), Arc::new(manager), config)
}

pub fn bar_doc() -> Value {
    json!({
        "id": "bar",
        "name": "bar",
        "version": "1.0",
        "resources": {
            "bar": {
                "type": "object",
                "properties": { "id": { "type": "integer" }, "label": { "type": "string" } },
                "links": {
                    "self": { "path": "$/bars/{id}" },
                    "get": { "method": "GET" }
                }
            }
        }
    })
}

pub fn shop_doc() -> Value {
    json!({
        "id": "shop",
        "name": "shop",
        "version": "1.0",
        "types": {
            "new_item": {
                "type": "object",
                "properties": { "label": { "type": "string" } }
            },
            "extended": {
                "type": "object",
                "properties": { "history": { "type": "array", "items": { "type": "string" } } }
            }
        },
        "resources": {
            "items": {
                "type": "array",
                "items": {
                    "type": "integer",
                    "relations": { "full": { "resource": "item", "vars": { "id": "0" } } }
                },
                "links": {
                    "self": { "path": "$/items", "params": { "label": {} } },
                    "get": { "method": "GET" },
                    "create": {
                        "method": "POST",
                        "request": { "$ref": "new_item" },
                        "response": { "$ref": "#/resources/item" }
                    }
                }
            },
            "item": {
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "label": { "type": "string" },
                    "bar_id": { "type": "integer" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                },
                "links": {
                    "self": { "path": "$/items/{id}" },
                    "get": { "method": "GET" },
                    "set": {
                        "method": "PUT",
                        "request": { "$ref": "#/resources/item" },
                        "response": { "$ref": "#/resources/item" }
                    },
                    "delete": { "method": "DELETE" },
                    "rename": {
                        "method": "POST",
                        "path": "$/items/{id}/rename",
                        "response": { "$ref": "#/resources/item" }
                    },
                    "extended": {
                        "method": "GET",
                        "path": "$/items/{id}/extended",
                        "response": { "$ref": "extended" }
                    },
                    "docs": { "path": "$/items/{id}/docs" }
                },
                "relations": {
                    "bar": {
                        "resource": "bar#/resources/bar",
                        "vars": {
                            "id": "0/bar_id",
                            "$host": "0/bar_server",
                            "$instance": "0/bar_instance"
                        }
                    }
                }
            }
        }
    })
}

pub fn shop(server: &Arc<SimServer>) -> Runtime {
    runtime(server, &[bar_doc(), shop_doc()], RuntimeConfig::default())
}
