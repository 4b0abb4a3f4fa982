//! Uncached client for the permission verification endpoints.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CapabilityError;
use crate::resilient::{Transport, TransportResponse};

use super::types::{
  CapabilitiesResponse, GroupsResponse, MenuResponse, UserId, VerifyPermissionResponse,
};

const VERIFY_ROOT: &str = "/api/permisos/verificar";

/// Endpoint paths, relative to the transport's base URL.
pub mod endpoints {
  use super::{UserId, VERIFY_ROOT};

  pub fn capabilities(user: UserId) -> String {
    format!("{}/{}/capacidades/", VERIFY_ROOT, user)
  }

  pub fn has_permission(user: UserId, capability: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(capability.as_bytes()).collect();
    format!(
      "{}/{}/tiene-permiso/?capacidad={}",
      VERIFY_ROOT, user, encoded
    )
  }

  pub fn menu(user: UserId) -> String {
    format!("{}/{}/menu/", VERIFY_ROOT, user)
  }

  pub fn groups(user: UserId) -> String {
    format!("{}/{}/grupos/", VERIFY_ROOT, user)
  }
}

/// Permission API client wrapper
#[derive(Clone)]
pub struct CapabilityClient {
  transport: Arc<dyn Transport>,
  signal: Option<CancellationToken>,
}

impl CapabilityClient {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self {
      transport,
      signal: None,
    }
  }

  /// Abandon in-flight requests once `signal` is cancelled.
  pub fn with_signal(mut self, signal: CancellationToken) -> Self {
    self.signal = Some(signal);
    self
  }

  /// All capability codes granted to `user`
  pub async fn capabilities(&self, user: UserId) -> Result<CapabilitiesResponse, CapabilityError> {
    self.get(&endpoints::capabilities(user)).await
  }

  /// Server-side check of a single capability
  pub async fn verify(
    &self,
    user: UserId,
    capability: &str,
  ) -> Result<VerifyPermissionResponse, CapabilityError> {
    self.get(&endpoints::has_permission(user, capability)).await
  }

  /// Menu tree visible to `user`
  pub async fn menu(&self, user: UserId) -> Result<MenuResponse, CapabilityError> {
    self.get(&endpoints::menu(user)).await
  }

  /// Active group memberships of `user`
  pub async fn groups(&self, user: UserId) -> Result<GroupsResponse, CapabilityError> {
    self.get(&endpoints::groups(user)).await
  }

  async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CapabilityError> {
    debug!(endpoint, "GET");
    let response = self.transport.get(endpoint, self.signal.as_ref()).await?;

    if !response.ok() {
      return Err(error_from_response(&response, endpoint));
    }

    serde_json::from_slice(&response.body).map_err(|e| CapabilityError::InvalidResponse {
      endpoint: endpoint.to_string(),
      reason: e.to_string(),
    })
  }
}

/// Map a non-2xx response to a typed error.
///
/// The message is taken from the body's `error` or `detail` field, then the
/// whole JSON body, then the status text.
pub(crate) fn error_from_response(response: &TransportResponse, endpoint: &str) -> CapabilityError {
  let message = match serde_json::from_slice::<Value>(&response.body) {
    Ok(body) => ["error", "detail"]
      .iter()
      .find_map(|field| body.get(*field).and_then(message_text))
      .unwrap_or_else(|| body.to_string()),
    Err(_) if !response.status_text.is_empty() => response.status_text.clone(),
    Err(_) => format!("Error {}", response.status),
  };

  warn!(status = response.status, endpoint, %message, "permission request failed");

  match response.status {
    401 => CapabilityError::Unauthorized(message),
    403 => CapabilityError::Forbidden(message),
    404 => CapabilityError::NotFound(message),
    status => CapabilityError::Api {
      status,
      message,
      endpoint: endpoint.to_string(),
    },
  }
}

fn message_text(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) if s.is_empty() => None,
    Value::String(s) => Some(s.clone()),
    other => Some(other.to_string()),
  }
}
