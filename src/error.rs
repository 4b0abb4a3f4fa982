//! Error types for the data-access layer.

use thiserror::Error;

/// Misconfiguration detected while composing services.
///
/// These indicate a programming error in the composing code and are raised at
/// build time, never from a fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("resilient service requires a domain identifier")]
  MissingDomain,

  #[error("resilient service ({domain}) requires an endpoint")]
  MissingEndpoint { domain: String },

  #[error("resilient service ({domain}) requires a fallback producer")]
  MissingFallback { domain: String },

  #[error("no fixture is registered for domain {domain}")]
  UnknownDomain { domain: String },

  #[error("fixture for {domain} is unusable: {reason}")]
  InvalidFixture { domain: String, reason: String },
}

/// Failure raised by a transport before a response was obtained.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("network error: {0}")]
  Network(String),

  #[error("request was cancelled")]
  Cancelled,

  #[error("invalid url {url}: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("malformed response body: {0}")]
  Decode(String),
}

/// Failure of a direct (non-resilient) API fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  #[error("HTTP {status} {status_text}")]
  Status { status: u16, status_text: String },

  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error("empty or invalid payload")]
  InvalidPayload,

  #[error("resilient service ({domain}) requires a transport when no default is configured")]
  MissingTransport { domain: String },
}

/// The cause of a fallback, wrapped with a human-readable context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{context}: {cause}")]
pub struct FallbackError {
  pub context: String,
  #[source]
  pub cause: ApiError,
}

/// Key-value storage backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
  #[error("storage backend error: {0}")]
  Backend(String),

  #[error("storage lock poisoned")]
  LockPoisoned,
}

impl From<rusqlite::Error> for StorageError {
  fn from(e: rusqlite::Error) -> Self {
    StorageError::Backend(e.to_string())
  }
}

/// Errors returned by the capability client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("request to {endpoint} failed with status {status}: {message}")]
  Api {
    status: u16,
    message: String,
    endpoint: String,
  },

  #[error("network error while contacting the server: {0}")]
  Network(#[from] TransportError),

  #[error("unexpected response from {endpoint}: {reason}")]
  InvalidResponse { endpoint: String, reason: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_error_message_includes_context_and_status() {
    let err = FallbackError {
      context: "Could not load calls".to_string(),
      cause: ApiError::Status {
        status: 503,
        status_text: "Service Unavailable".to_string(),
      },
    };
    assert_eq!(
      err.to_string(),
      "Could not load calls: HTTP 503 Service Unavailable"
    );
  }

  #[test]
  fn test_invalid_payload_message_mentions_payload() {
    let err = FallbackError {
      context: "ctx".to_string(),
      cause: ApiError::InvalidPayload,
    };
    assert!(err.to_string().contains("payload"));
  }
}
