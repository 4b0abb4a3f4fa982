//! Fallback-aware fetching.
//!
//! One attempt against the live endpoint, resolving deterministically to
//! either the live payload or the domain's fallback fixture. The fetch never
//! fails: every failure becomes a `Mock` result carrying the cause.

use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::source::{SelectSource, SourceDecision};
use super::transport::Transport;
use super::validate::PayloadValidator;
use crate::error::{ApiError, FallbackError};

/// Default context used when a service does not supply its own.
pub const DEFAULT_ERROR_CONTEXT: &str = "Could not retrieve data from the backend";

/// Provenance of the data in a [`FetchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
  /// Live data from the backend
  Api,
  /// Fallback fixture
  Mock,
  /// Caller-provided data outside the api/mock pipeline
  Custom,
}

impl From<SourceDecision> for DataSource {
  fn from(decision: SourceDecision) -> Self {
    match decision {
      SourceDecision::Api => DataSource::Api,
      SourceDecision::Mock => DataSource::Mock,
    }
  }
}

impl fmt::Display for DataSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DataSource::Api => f.write_str("api"),
      DataSource::Mock => f.write_str("mock"),
      DataSource::Custom => f.write_str("custom"),
    }
  }
}

/// Metadata attached by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchMetadata {
  pub domain: String,
}

/// Outcome of a resilient fetch, including where the data came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult<T = Value> {
  /// The data, owned by the caller
  pub data: T,
  /// Where the data came from
  pub source: DataSource,
  /// Why a fallback happened, if it did
  #[serde(serialize_with = "serialize_error")]
  pub error: Option<FallbackError>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<FetchMetadata>,
}

fn serialize_error<S: Serializer>(
  error: &Option<FallbackError>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  match error {
    Some(e) => serializer.serialize_str(&e.to_string()),
    None => serializer.serialize_none(),
  }
}

impl<T> FetchResult<T> {
  /// Live data from the backend.
  pub fn from_api(data: T) -> Self {
    Self {
      data,
      source: DataSource::Api,
      error: None,
      metadata: None,
    }
  }

  /// Fallback data, optionally with the failure that caused it.
  pub fn from_mock(data: T, error: Option<FallbackError>) -> Self {
    Self {
      data,
      source: DataSource::Mock,
      error,
      metadata: None,
    }
  }

  /// Data supplied by the caller outside the pipeline.
  pub fn custom(data: T) -> Self {
    Self {
      data,
      source: DataSource::Custom,
      error: None,
      metadata: None,
    }
  }

  pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
    self.metadata = Some(FetchMetadata {
      domain: domain.into(),
    });
    self
  }

  /// True when the data did not come from the live backend.
  pub fn is_degraded(&self) -> bool {
    self.source != DataSource::Api
  }
}

type ProduceFn = dyn Fn() -> BoxFuture<'static, Value> + Send + Sync;

/// Produces a fresh copy of a domain's canonical fallback payload.
///
/// Every call returns an independently owned value, so callers may mutate
/// what they receive without affecting later calls.
#[derive(Clone)]
pub struct FallbackProducer {
  produce: Arc<ProduceFn>,
}

impl FallbackProducer {
  /// Serve clones of a fixed fixture.
  pub fn from_value(fixture: Value) -> Self {
    let fixture = Arc::new(fixture);
    Self {
      produce: Arc::new(move || {
        let copy = Value::clone(&fixture);
        Box::pin(async move { copy })
      }),
    }
  }

  /// Serve whatever a synchronous closure builds.
  pub fn from_fn<F>(f: F) -> Self
  where
    F: Fn() -> Value + Send + Sync + 'static,
  {
    Self {
      produce: Arc::new(move || {
        let value = f();
        Box::pin(async move { value })
      }),
    }
  }

  /// Serve the output of an async loader.
  pub fn from_async<F, Fut>(f: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Value> + Send + 'static,
  {
    Self {
      produce: Arc::new(move || Box::pin(f())),
    }
  }

  pub async fn produce(&self) -> Value {
    (self.produce)().await
  }
}

impl fmt::Debug for FallbackProducer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FallbackProducer").finish_non_exhaustive()
  }
}

/// Everything one fallback-aware fetch needs.
pub struct FallbackRequest<'a> {
  pub domain: &'a str,
  pub url: &'a str,
  pub transport: Option<&'a dyn Transport>,
  pub fallback: &'a FallbackProducer,
  pub validator: &'a dyn PayloadValidator,
  pub selector: &'a dyn SelectSource,
  pub error_context: &'a str,
  pub signal: Option<&'a CancellationToken>,
}

/// Fetch a validated payload from the live endpoint, without any fallback.
///
/// Non-success statuses, transport failures and payloads rejected by the
/// validator are returned as errors.
pub async fn request_payload(
  domain: &str,
  url: &str,
  transport: Option<&dyn Transport>,
  validator: &dyn PayloadValidator,
  signal: Option<&CancellationToken>,
) -> Result<Value, ApiError> {
  let transport = transport.ok_or_else(|| ApiError::MissingTransport {
    domain: domain.to_string(),
  })?;

  let response = transport.get(url, signal).await?;
  if !response.ok() {
    return Err(ApiError::Status {
      status: response.status,
      status_text: response.status_text,
    });
  }

  let payload = response.json()?;
  if !validator.validate(&payload) {
    debug!(domain, validator = validator.name(), "payload rejected");
    return Err(ApiError::InvalidPayload);
  }

  Ok(payload)
}

/// Run one fallback-aware fetch.
///
/// 1. If the selector says mock, serve the fallback without touching the network
/// 2. Otherwise request the endpoint and validate the payload
/// 3. On any failure serve the fallback, carrying the wrapped cause
pub async fn fetch_with_fallback(request: FallbackRequest<'_>) -> FetchResult {
  let FallbackRequest {
    domain,
    url,
    transport,
    fallback,
    validator,
    selector,
    error_context,
    signal,
  } = request;

  if selector.decide(domain) == SourceDecision::Mock {
    debug!(domain, "source forced to mock");
    return FetchResult::from_mock(fallback.produce().await, None);
  }

  match request_payload(domain, url, transport, validator, signal).await {
    Ok(payload) => {
      debug!(domain, url, "served from api");
      FetchResult::from_api(payload)
    }
    Err(cause) => {
      let error = FallbackError {
        context: error_context.to_string(),
        cause,
      };
      warn!(domain, url, error = %error, "falling back to mock data");
      FetchResult::from_mock(fallback.produce().await, Some(error))
    }
  }
}
