//! HTTP POST probing

use crate::config::HarnessConfig;
use crate::{HarnessError, Result};
use hyper::header::CACHE_CONTROL;
use hyper::{Body, Client, Method, Request, Uri};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Sends one POST to the server under test and decodes the reply as JSON
///
/// Every request carries `cache-control: no-cache` and an empty body. There is
/// no retry. The body is decoded regardless of the response status.
///
/// # Example
///
/// ```rust
/// use harness_core::HttpProbeClient;
///
/// # async fn example() -> harness_core::Result<()> {
/// let client = HttpProbeClient::new();
/// let reply = client.post("http://127.0.0.1:8181/accounts").await?;
/// println!("server said {}", reply);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpProbeClient {
    timeout: Option<Duration>,
}

impl HttpProbeClient {
    /// Client without a request timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole request, body included
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Client using `probeTimeoutMs` from the harness config
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            timeout: config.probe_timeout(),
        }
    }

    /// Request timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// POST to `url` and return the decoded JSON body
    pub async fn post(&self, url: &str) -> Result<Value> {
        debug!("HTTP probe POST {}", url);
        match self.timeout {
            Some(limit) => timeout(limit, send(url)).await.map_err(|_| {
                debug!("HTTP probe to {} timed out after {:?}", url, limit);
                HarnessError::Timeout(format!("POST {} did not complete within {:?}", url, limit))
            })?,
            None => send(url).await,
        }
    }
}

/// One-off POST with a default [`HttpProbeClient`]
pub async fn post_json(url: &str) -> Result<Value> {
    HttpProbeClient::new().post(url).await
}

fn network_error(url: &str, what: &str, detail: impl fmt::Display) -> HarnessError {
    debug!("HTTP probe to {} failed: {}: {}", url, what, detail);
    HarnessError::Network(format!("{} for POST {}: {}", what, url, detail))
}

async fn send(url: &str) -> Result<Value> {
    let network = |what: &str, detail: String| network_error(url, what, detail);

    let uri = url.parse::<Uri>().map_err(|e| network("invalid URL", e.to_string()))?;
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CACHE_CONTROL, "no-cache")
        .body(Body::empty())
        .map_err(|e| network("invalid request", e.to_string()))?;

    let response = Client::new()
        .request(request)
        .await
        .map_err(|e| network("request failed", e.to_string()))?;
    let status = response.status();

    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(|e| network("failed to read body", e.to_string()))?;
    debug!("HTTP probe to {} returned {} with {} bytes", url, status, bytes.len());

    serde_json::from_slice(&bytes).map_err(|e| {
        network(
            "body is not JSON",
            format!("{} (status {}, body {:?})", e, status, String::from_utf8_lossy(&bytes)),
        )
    })
}
