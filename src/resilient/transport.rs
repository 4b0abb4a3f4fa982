//! Fetch implementations.
//!
//! A [`Transport`] issues one GET and reports what the server said. It does
//! not interpret status codes; that is the fetcher's job.

use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::error::TransportError;

/// A response as observed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
  pub status: u16,
  pub status_text: String,
  pub body: Vec<u8>,
}

impl TransportResponse {
  pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: status_text.into(),
      body: body.into(),
    }
  }

  /// A 200 response carrying `payload` serialized as JSON.
  pub fn json_ok(payload: &Value) -> Self {
    Self::new(200, "OK", payload.to_string())
  }

  /// Whether the status is in the 2xx range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Parse the body as JSON.
  pub fn json(&self) -> Result<Value, TransportError> {
    serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
  }
}

/// Issues GET requests on behalf of services.
///
/// Cancellation is cooperative: implementations should stop waiting once
/// `signal` is cancelled and return [`TransportError::Cancelled`].
pub trait Transport: Send + Sync {
  fn get<'a>(
    &'a self,
    url: &'a str,
    signal: Option<&'a CancellationToken>,
  ) -> BoxFuture<'a, Result<TransportResponse, TransportError>>;
}

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport backed by reqwest.
///
/// Relative endpoints are resolved against the base URL; absolute URLs are
/// used unchanged.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
  base_url: Url,
  bearer_token: Option<String>,
}

impl ReqwestTransport {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
    let base_url = Url::parse(base_url).map_err(|e| TransportError::InvalidUrl {
      url: base_url.to_string(),
      reason: e.to_string(),
    })?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url,
      bearer_token: None,
    })
  }

  /// Attach a bearer token to every request.
  pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
    self.bearer_token = Some(token.into());
    self
  }

  /// Resolve an endpoint against the base URL.
  pub fn resolve(&self, endpoint: &str) -> Result<Url, TransportError> {
    if let Ok(absolute) = Url::parse(endpoint) {
      return Ok(absolute);
    }
    let path = endpoint.trim_start_matches('/');
    let mut base = self.base_url.clone();
    if !base.path().ends_with('/') {
      let with_slash = format!("{}/", base.path());
      base.set_path(&with_slash);
    }
    base.join(path).map_err(|e| TransportError::InvalidUrl {
      url: endpoint.to_string(),
      reason: e.to_string(),
    })
  }

  async fn send(&self, url: Url) -> Result<TransportResponse, TransportError> {
    let mut request = self.client.get(url.clone());
    if let Some(token) = &self.bearer_token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| TransportError::Network(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError::Network(format!("Failed to read response: {}", e)))?;

    trace!(url = %url, status = status.as_u16(), bytes = body.len(), "response received");

    Ok(TransportResponse {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      body: body.to_vec(),
    })
  }
}

impl Transport for ReqwestTransport {
  fn get<'a>(
    &'a self,
    url: &'a str,
    signal: Option<&'a CancellationToken>,
  ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
    Box::pin(async move {
      let url = self.resolve(url)?;
      debug!(url = %url, "GET");

      match signal {
        Some(token) => {
          if token.is_cancelled() {
            return Err(TransportError::Cancelled);
          }
          tokio::select! {
            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = self.send(url) => result,
          }
        }
        None => self.send(url).await,
      }
    })
  }
}
