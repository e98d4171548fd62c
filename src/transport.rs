//! Default HTTP transport on `reqwest`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::connection::{Target, Transport, TransportError, TransportRequest, TransportResponse};
use crate::error::ConfigError;
use crate::manager::Connector;

/// Builds one [`ReqwestTransport`] per pooled connection.
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    timeout: Duration,
}

impl ReqwestConnector {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for ReqwestConnector {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

impl Connector for ReqwestConnector {
    fn connect(&self, target: &Target) -> Result<Arc<dyn Transport>, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidHost {
                host: target.host.clone(),
                message: e.to_string(),
            })?;
        Ok(Arc::new(ReqwestTransport { client }))
    }
}

/// JSON over HTTP with an async `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::new(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        // Non-JSON bodies (error pages) are kept as text.
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
