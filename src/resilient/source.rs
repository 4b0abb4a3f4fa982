//! Per-domain source selection driven by out-of-band override signals.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default prefix for override signal keys (`UI_BACKEND_<DOMAIN>_SOURCE`).
pub const DEFAULT_OVERRIDE_PREFIX: &str = "UI_BACKEND";

/// Override values that select the live backend.
const API_VALUES: &[&str] = &["api", "true", "1", "on", "backend"];

/// Where a domain should be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDecision {
  Api,
  Mock,
}

impl SourceDecision {
  pub fn is_mock(self) -> bool {
    self == SourceDecision::Mock
  }
}

impl fmt::Display for SourceDecision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceDecision::Api => f.write_str("api"),
      SourceDecision::Mock => f.write_str("mock"),
    }
  }
}

/// Build the override key for a domain.
///
/// The domain is upper-cased and any character that is not ASCII
/// alphanumeric becomes `_`, so `call-logs` maps to `<PREFIX>_CALL_LOGS_SOURCE`.
pub fn override_key(prefix: &str, domain: &str) -> String {
  let domain: String = domain
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() {
        c.to_ascii_uppercase()
      } else {
        '_'
      }
    })
    .collect();
  format!("{}_{}_SOURCE", prefix, domain)
}

/// Interpret a raw override value.
///
/// Anything that is not recognisably "use the backend" resolves to mock.
pub fn parse_override(raw: Option<&str>) -> SourceDecision {
  let Some(raw) = raw else {
    return SourceDecision::Mock;
  };
  let normalized = raw.trim().to_lowercase();
  if API_VALUES.contains(&normalized.as_str()) {
    SourceDecision::Api
  } else {
    SourceDecision::Mock
  }
}

/// A key-value source of override signals.
pub trait OverrideSignals: Send + Sync {
  fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads override signals from process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSignals;

impl OverrideSignals for EnvSignals {
  fn lookup(&self, key: &str) -> Option<String> {
    std::env::var(key).ok()
  }
}

/// Override signals held in memory (config file values, tests).
#[derive(Debug, Clone, Default)]
pub struct MapSignals {
  values: HashMap<String, String>,
}

impl MapSignals {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set a raw value under an already-derived key.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.values.insert(key.into(), value.into());
    self
  }

  /// Set the override for a domain, deriving the key from `prefix`.
  pub fn with_domain(self, prefix: &str, domain: &str, value: impl Into<String>) -> Self {
    let key = override_key(prefix, domain);
    self.with(key, value)
  }
}

impl OverrideSignals for MapSignals {
  fn lookup(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }
}

/// Consults several signal sources in order; the first hit wins.
#[derive(Clone, Default)]
pub struct LayeredSignals {
  layers: Vec<Arc<dyn OverrideSignals>>,
}

impl LayeredSignals {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(mut self, layer: impl OverrideSignals + 'static) -> Self {
    self.layers.push(Arc::new(layer));
    self
  }
}

impl OverrideSignals for LayeredSignals {
  fn lookup(&self, key: &str) -> Option<String> {
    self.layers.iter().find_map(|layer| layer.lookup(key))
  }
}

/// Decides, per domain, whether to use the live backend or fallback data.
///
/// Implementations must be pure and must not fail.
pub trait SelectSource: Send + Sync {
  fn decide(&self, domain: &str) -> SourceDecision;
}

impl<F> SelectSource for F
where
  F: Fn(&str) -> SourceDecision + Send + Sync,
{
  fn decide(&self, domain: &str) -> SourceDecision {
    self(domain)
  }
}

/// Always returns the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedSource(pub SourceDecision);

impl SelectSource for FixedSource {
  fn decide(&self, _domain: &str) -> SourceDecision {
    self.0
  }
}

/// Selector backed by override signals keyed `<PREFIX>_<DOMAIN>_SOURCE`.
#[derive(Clone)]
pub struct SourceSelector {
  prefix: String,
  signals: Arc<dyn OverrideSignals>,
}

impl SourceSelector {
  pub fn new(prefix: impl Into<String>, signals: impl OverrideSignals + 'static) -> Self {
    Self {
      prefix: prefix.into(),
      signals: Arc::new(signals),
    }
  }

  /// Selector reading the process environment under the default prefix.
  pub fn from_env() -> Self {
    Self::new(DEFAULT_OVERRIDE_PREFIX, EnvSignals)
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// The key this selector consults for `domain`.
  pub fn key_for(&self, domain: &str) -> String {
    override_key(&self.prefix, domain)
  }
}

impl SelectSource for SourceSelector {
  fn decide(&self, domain: &str) -> SourceDecision {
    let raw = self.signals.lookup(&self.key_for(domain));
    parse_override(raw.as_deref())
  }
}

impl fmt::Debug for SourceSelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SourceSelector")
      .field("prefix", &self.prefix)
      .finish_non_exhaustive()
  }
}
