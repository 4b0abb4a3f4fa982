//! Static table of known data domains and their bundled fallback fixtures.

use serde_json::Value;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::resilient::{PayloadValidator, ValidationRule, ValidatorRegistry};

/// Everything needed to serve one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainSpec {
  pub id: &'static str,
  pub endpoint: &'static str,
  pub rule: ValidationRule,
  /// Message prefixed to the cause when this domain falls back
  pub error_context: &'static str,
  fixture: &'static str,
}

impl DomainSpec {
  /// Parse and validate this domain's bundled fixture.
  pub fn fixture(&self) -> Result<Value, ConfigError> {
    let value: Value = serde_json::from_str(self.fixture).map_err(|e| ConfigError::InvalidFixture {
      domain: self.id.to_string(),
      reason: e.to_string(),
    })?;

    if !self.rule.validate(&value) {
      return Err(ConfigError::InvalidFixture {
        domain: self.id.to_string(),
        reason: format!("rejected by {} validator", self.rule.name()),
      });
    }
    Ok(value)
  }
}

macro_rules! domain {
  ($id:literal, $endpoint:literal, $file:literal, $rule:expr, $context:literal) => {
    DomainSpec {
      id: $id,
      endpoint: $endpoint,
      rule: $rule,
      error_context: $context,
      fixture: include_str!(concat!("../../fixtures/", $file)),
    }
  };
}

pub static DOMAINS: &[DomainSpec] = &[
  domain!(
    "calls",
    "/api/v1/llamadas/",
    "llamadas.json",
    ValidationRule::CallsCatalog,
    "Could not load calls"
  ),
  domain!(
    "config",
    "/api/v1/config/",
    "config.json",
    ValidationRule::AllFields(&["featureFlags", "branding", "endpoints"]),
    "Could not load configuration"
  ),
  domain!(
    "permissions",
    "/api/v1/permissions/",
    "permissions.json",
    ValidationRule::AllFields(&["user", "capacidades"]),
    "Could not load permissions"
  ),
  domain!(
    "health",
    "/health/",
    "health.json",
    ValidationRule::AllFields(&["status", "checkedAt"]),
    "Could not check backend health"
  ),
  domain!(
    "users",
    "/api/v1/usuarios/",
    "usuarios.json",
    ValidationRule::AnyField(&["usuarios", "grupos"]),
    "Could not load users"
  ),
  domain!(
    "dashboard",
    "/api/v1/dashboard/",
    "dashboard.json",
    ValidationRule::AnyField(&["overview", "widgets"]),
    "Could not load dashboard"
  ),
  domain!(
    "configuracion",
    "/api/v1/configuracion/",
    "configuracion.json",
    ValidationRule::AnyField(&["parametros"]),
    "Could not load system parameters"
  ),
  domain!(
    "configuration",
    "/api/v1/configuracion/",
    "configuration.json",
    ValidationRule::AnyField(&["settings"]),
    "Could not load settings"
  ),
  domain!(
    "presupuestos",
    "/api/v1/presupuestos/",
    "presupuestos.json",
    ValidationRule::AnyField(&["presupuestos"]),
    "Could not load budgets"
  ),
  domain!(
    "politicas",
    "/api/v1/politicas/",
    "politicas.json",
    ValidationRule::AnyField(&["politicas"]),
    "Could not load policies"
  ),
  domain!(
    "excepciones",
    "/api/v1/excepciones/",
    "excepciones.json",
    ValidationRule::AnyField(&["excepciones"]),
    "Could not load exceptions"
  ),
  domain!(
    "reportes",
    "/api/v1/reportes/",
    "reportes.json",
    ValidationRule::AnyField(&["reportes"]),
    "Could not load reports"
  ),
  domain!(
    "notifications",
    "/api/v1/notifications/messages/",
    "notifications.json",
    ValidationRule::AnyField(&["messages"]),
    "Could not load notifications"
  ),
  domain!(
    "etl",
    "/api/v1/etl/jobs/",
    "etl.json",
    ValidationRule::AnyField(&["jobs"]),
    "Could not load ETL jobs"
  ),
  domain!(
    "dora",
    "/api/dora/",
    "dora.json",
    ValidationRule::AnyField(&["metrics"]),
    "Could not load DORA metrics"
  ),
];

/// Look up a domain by id.
pub fn domain_spec(domain: &str) -> Option<&'static DomainSpec> {
  DOMAINS.iter().find(|spec| spec.id == domain)
}

/// Ids of every known domain, in catalog order.
pub fn registered_domains() -> Vec<&'static str> {
  DOMAINS.iter().map(|spec| spec.id).collect()
}

/// Every catalog domain's validation rule, keyed by domain.
pub fn validator_registry() -> ValidatorRegistry {
  let mut registry = ValidatorRegistry::new();
  for spec in DOMAINS {
    registry.register(spec.id, Arc::new(spec.rule));
  }
  registry
}

/// Parse and validate the bundled fixture for `domain`.
pub fn load_fixture(domain: &str) -> Result<Value, ConfigError> {
  domain_spec(domain)
    .ok_or_else(|| ConfigError::UnknownDomain {
      domain: domain.to_string(),
    })?
    .fixture()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;

  #[test]
  fn test_every_fixture_passes_its_validator() {
    for spec in DOMAINS {
      assert!(spec.fixture().is_ok(), "fixture for {} is invalid", spec.id);
    }
  }

  #[test]
  fn test_domain_ids_are_unique() {
    let ids: BTreeSet<_> = registered_domains().into_iter().collect();
    assert_eq!(ids.len(), DOMAINS.len());
    assert_eq!(DOMAINS.len(), 15);
  }

  #[test]
  fn test_validator_registry_covers_catalog() {
    let registry = validator_registry();
    assert_eq!(registry.len(), DOMAINS.len());
    assert_eq!(registry.get("calls").unwrap().name(), "calls-catalog");
    assert!(registry.get("weather").is_none());
  }

  #[test]
  fn test_unknown_domain() {
    assert_eq!(
      load_fixture("weather"),
      Err(ConfigError::UnknownDomain {
        domain: "weather".into()
      })
    );
  }

  #[test]
  fn test_fixture_rejected_by_its_rule() {
    let broken = DomainSpec {
      id: "broken",
      endpoint: "/x/",
      rule: ValidationRule::AnyField(&["items"]),
      error_context: "ctx",
      fixture: r#"{"other": []}"#,
    };
    assert!(matches!(
      broken.fixture(),
      Err(ConfigError::InvalidFixture { domain, .. }) if domain == "broken"
    ));

    let unparsable = DomainSpec {
      fixture: "{",
      ..broken
    };
    assert!(matches!(
      unparsable.fixture(),
      Err(ConfigError::InvalidFixture { .. })
    ));
  }

  #[test]
  fn test_calls_fixture_has_catalog() {
    let calls = load_fixture("calls").unwrap();
    assert!(!calls["llamadas"].as_array().unwrap().is_empty());
    assert!(calls["estados"].is_array());
  }
}
