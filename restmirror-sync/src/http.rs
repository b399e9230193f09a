//! HTTP transport over `reqwest`.
//!
//! Maps the REST verbs onto a base URL:
//! `GET {base}[/{id}]?{query}`, `POST {base}`, `PATCH|PUT|DELETE {base}/{id}`.

use crate::error::{TransportError, TransportResult};
use crate::transport::RestTransport;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use restmirror_types::{EntityId, Params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Resource endpoint, e.g. `https://api.example.com/users`.
    pub base_url: String,
    /// Per-request timeout (seconds).
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// A [`RestTransport`] that issues real HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: HttpConfig,
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with its own HTTP client.
    pub fn new(config: HttpConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Creates a transport sharing an existing client.
    pub fn with_client(config: HttpConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Shorthand for a transport against `base_url` with default settings.
    pub fn for_url(base_url: impl Into<String>) -> TransportResult<Self> {
        Self::new(HttpConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    /// The configured endpoint.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, id: Option<&EntityId>) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match id {
            Some(id) => format!("{base}/{}", urlencoding::encode(id.as_str())),
            None => base.to_string(),
        }
    }

    async fn send(&self, request: RequestBuilder) -> TransportResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::network(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("failed to read response: {e}")))?;
        debug!(status = status.as_u16(), bytes = text.len(), "HTTP response");

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| TransportError::network(format!("invalid JSON response: {e}")));
        }

        let reason = status.canonical_reason().unwrap_or("request failed");
        let mut error = TransportError::new(status.as_u16(), reason);
        if let Ok(body) = serde_json::from_str::<Value>(&text) {
            error = error.with_body(body);
        }
        Err(error)
    }
}

/// Flattens parameters into query pairs. Strings are sent verbatim, nulls
/// are dropped, everything else is sent as its JSON text.
fn query_pairs(query: &Params) -> Vec<(String, String)> {
    query
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

#[async_trait]
impl RestTransport for HttpTransport {
    async fn get(&self, id: Option<&EntityId>, query: &Params) -> TransportResult<Value> {
        let request = self.client.get(self.url(id)).query(&query_pairs(query));
        self.send(request).await
    }

    async fn post(&self, body: &Value) -> TransportResult<Value> {
        self.send(self.client.post(self.url(None)).json(body)).await
    }

    async fn patch(&self, id: &EntityId, body: &Value) -> TransportResult<Value> {
        self.send(self.client.patch(self.url(Some(id))).json(body)).await
    }

    async fn put(&self, id: &EntityId, body: &Value) -> TransportResult<Value> {
        self.send(self.client.put(self.url(Some(id))).json(body)).await
    }

    async fn delete(&self, id: &EntityId) -> TransportResult<Value> {
        self.send(self.client.delete(self.url(Some(id)))).await
    }
}
