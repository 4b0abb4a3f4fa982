//! Per-domain resilient services.
//!
//! A [`ResilientService`] composes source selection, fallback-aware fetching,
//! payload validation and usage telemetry behind one uniform contract. Other
//! layers depend on services, never on the pieces directly.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::fetcher::{
  fetch_with_fallback, request_payload, FallbackProducer, FallbackRequest, FetchResult,
  DEFAULT_ERROR_CONTEXT,
};
use super::source::{FixedSource, SelectSource, SourceDecision};
use super::telemetry::UsageRegister;
use super::transport::Transport;
use super::validate::{PayloadValidator, ValidationRule};
use crate::error::{ApiError, ConfigError};

/// Per-call options.
#[derive(Clone, Default)]
pub struct FetchOptions {
  /// Transport for this call; overrides the service default
  pub transport: Option<Arc<dyn Transport>>,
  /// Forwarded to the transport only
  pub signal: Option<CancellationToken>,
}

impl FetchOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  pub fn with_signal(mut self, signal: CancellationToken) -> Self {
    self.signal = Some(signal);
    self
  }
}

impl fmt::Debug for FetchOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FetchOptions")
      .field("transport", &self.transport.is_some())
      .field("signal", &self.signal)
      .finish()
  }
}

/// Builder for [`ResilientService`].
///
/// Domain, endpoint and fallback are required. Without a selector the
/// service always tries the backend; without a validator every payload is
/// accepted.
#[must_use]
pub struct ServiceBuilder {
  domain: String,
  endpoint: String,
  fallback: Option<FallbackProducer>,
  selector: Arc<dyn SelectSource>,
  validator: Arc<dyn PayloadValidator>,
  error_context: String,
  transport: Option<Arc<dyn Transport>>,
  register: UsageRegister,
}

impl ServiceBuilder {
  fn new(domain: String) -> Self {
    Self {
      domain,
      endpoint: String::new(),
      fallback: None,
      selector: Arc::new(FixedSource(SourceDecision::Api)),
      validator: Arc::new(ValidationRule::AcceptAny),
      error_context: DEFAULT_ERROR_CONTEXT.to_string(),
      transport: None,
      register: UsageRegister::new(),
    }
  }

  pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into();
    self
  }

  pub fn fallback(mut self, fallback: FallbackProducer) -> Self {
    self.fallback = Some(fallback);
    self
  }

  pub fn selector(mut self, selector: Arc<dyn SelectSource>) -> Self {
    self.selector = selector;
    self
  }

  pub fn validator(mut self, validator: Arc<dyn PayloadValidator>) -> Self {
    self.validator = validator;
    self
  }

  /// Human-readable prefix for fallback errors.
  pub fn error_context(mut self, context: impl Into<String>) -> Self {
    self.error_context = context.into();
    self
  }

  /// Transport used when a call does not supply one.
  pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  /// Register receiving this service's telemetry.
  pub fn register(mut self, register: UsageRegister) -> Self {
    self.register = register;
    self
  }

  pub fn build(self) -> Result<ResilientService, ConfigError> {
    if self.domain.trim().is_empty() {
      return Err(ConfigError::MissingDomain);
    }
    if self.endpoint.trim().is_empty() {
      return Err(ConfigError::MissingEndpoint {
        domain: self.domain,
      });
    }
    let Some(fallback) = self.fallback else {
      return Err(ConfigError::MissingFallback {
        domain: self.domain,
      });
    };

    Ok(ResilientService {
      domain: self.domain,
      endpoint: self.endpoint,
      fallback,
      selector: self.selector,
      validator: self.validator,
      error_context: self.error_context,
      transport: self.transport,
      register: self.register,
    })
  }
}

/// A data domain served from its live endpoint with a validated fallback.
#[derive(Clone)]
pub struct ResilientService {
  domain: String,
  endpoint: String,
  fallback: FallbackProducer,
  selector: Arc<dyn SelectSource>,
  validator: Arc<dyn PayloadValidator>,
  error_context: String,
  transport: Option<Arc<dyn Transport>>,
  register: UsageRegister,
}

impl ResilientService {
  pub fn builder(domain: impl Into<String>) -> ServiceBuilder {
    ServiceBuilder::new(domain.into())
  }

  pub fn domain(&self) -> &str {
    &self.domain
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn register(&self) -> &UsageRegister {
    &self.register
  }

  fn effective_transport<'a>(&'a self, options: &'a FetchOptions) -> Option<&'a dyn Transport> {
    options
      .transport
      .as_deref()
      .or(self.transport.as_deref())
  }

  /// Fetch with fallback, record the outcome and tag it with the domain.
  ///
  /// Never fails: backend problems surface as a `Mock` result whose `error`
  /// explains the fallback.
  pub async fn fetch(&self, options: FetchOptions) -> FetchResult {
    let result = fetch_with_fallback(FallbackRequest {
      domain: &self.domain,
      url: &self.endpoint,
      transport: self.effective_transport(&options),
      fallback: &self.fallback,
      validator: self.validator.as_ref(),
      selector: self.selector.as_ref(),
      error_context: &self.error_context,
      signal: options.signal.as_ref(),
    })
    .await;

    self.register.record(&self.domain, result.source);
    result.with_domain(self.domain.clone())
  }

  /// Fetch from the backend only, propagating every failure.
  ///
  /// Ignores the selector and records no telemetry.
  pub async fn fetch_from_api(&self, options: FetchOptions) -> Result<Value, ApiError> {
    request_payload(
      &self.domain,
      &self.endpoint,
      self.effective_transport(&options),
      self.validator.as_ref(),
      options.signal.as_ref(),
    )
    .await
  }

  /// A fresh copy of the fallback payload, regardless of the selector.
  pub async fn fetch_from_mock(&self) -> Value {
    self.fallback.produce().await
  }

  /// Whether the selector currently routes this domain to fallback data.
  pub fn should_use_mock(&self) -> bool {
    self.selector.decide(&self.domain).is_mock()
  }
}

impl fmt::Debug for ResilientService {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResilientService")
      .field("domain", &self.domain)
      .field("endpoint", &self.endpoint)
      .field("validator", &self.validator.name())
      .finish_non_exhaustive()
  }
}
