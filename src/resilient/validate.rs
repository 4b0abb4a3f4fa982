//! Payload validation strategies.
//!
//! Each domain registers a named rule deciding whether a fetched payload is
//! structurally usable. The validator is authoritative: an empty payload that
//! passes is valid data, a large one that fails is not.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Decides whether a payload is usable.
pub trait PayloadValidator: Send + Sync {
  /// Stable name used in logs.
  fn name(&self) -> &str;

  fn validate(&self, payload: &Value) -> bool;
}

/// Built-in validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
  /// Every payload is accepted.
  AcceptAny,
  /// Object where at least one of the listed fields is truthy (an array,
  /// even empty, counts).
  AnyField(&'static [&'static str]),
  /// Object where every listed field is present and not null.
  AllFields(&'static [&'static str]),
  /// Call catalog: a non-empty `llamadas` array, or any catalog array
  /// (`estados`, `tipos`).
  CallsCatalog,
}

impl PayloadValidator for ValidationRule {
  fn name(&self) -> &str {
    match self {
      ValidationRule::AcceptAny => "accept-any",
      ValidationRule::AnyField(_) => "any-field",
      ValidationRule::AllFields(_) => "all-fields",
      ValidationRule::CallsCatalog => "calls-catalog",
    }
  }

  fn validate(&self, payload: &Value) -> bool {
    match self {
      ValidationRule::AcceptAny => true,
      ValidationRule::AnyField(fields) => payload
        .as_object()
        .is_some_and(|obj| fields.iter().any(|f| obj.get(*f).is_some_and(is_truthy))),
      ValidationRule::AllFields(fields) => payload
        .as_object()
        .is_some_and(|obj| fields.iter().all(|f| obj.get(*f).is_some_and(|v| !v.is_null()))),
      ValidationRule::CallsCatalog => {
        let Some(obj) = payload.as_object() else {
          return false;
        };
        let has_calls = obj
          .get("llamadas")
          .and_then(Value::as_array)
          .is_some_and(|calls| !calls.is_empty());
        let has_catalog = ["estados", "tipos"]
          .iter()
          .any(|k| obj.get(*k).is_some_and(Value::is_array));
        has_calls || has_catalog
      }
    }
  }
}

/// JavaScript-style truthiness for JSON values.
fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// A validator defined by a closure, carrying a name for diagnostics.
pub struct FnValidator<F> {
  name: String,
  check: F,
}

impl<F> FnValidator<F>
where
  F: Fn(&Value) -> bool + Send + Sync,
{
  pub fn new(name: impl Into<String>, check: F) -> Self {
    Self {
      name: name.into(),
      check,
    }
  }
}

impl<F> PayloadValidator for FnValidator<F>
where
  F: Fn(&Value) -> bool + Send + Sync,
{
  fn name(&self) -> &str {
    &self.name
  }

  fn validate(&self, payload: &Value) -> bool {
    (self.check)(payload)
  }
}

impl<F> fmt::Debug for FnValidator<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnValidator")
      .field("name", &self.name)
      .finish_non_exhaustive()
  }
}

/// Lookup table of validators by domain.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
  by_domain: HashMap<String, Arc<dyn PayloadValidator>>,
}

impl ValidatorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, domain: impl Into<String>, validator: Arc<dyn PayloadValidator>) {
    self.by_domain.insert(domain.into(), validator);
  }

  pub fn get(&self, domain: &str) -> Option<Arc<dyn PayloadValidator>> {
    self.by_domain.get(domain).cloned()
  }

  /// The registered validator, or one that accepts everything.
  pub fn get_or_accept(&self, domain: &str) -> Arc<dyn PayloadValidator> {
    self
      .get(domain)
      .unwrap_or_else(|| Arc::new(ValidationRule::AcceptAny))
  }

  pub fn len(&self) -> usize {
    self.by_domain.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_domain.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_calls_catalog() {
    let rule = ValidationRule::CallsCatalog;
    assert!(rule.validate(&json!({"llamadas": [], "estados": [], "tipos": []})));
    assert!(rule.validate(&json!({"llamadas": [{"id": 1}]})));
    assert!(rule.validate(&json!({"tipos": []})));
    assert!(!rule.validate(&json!({"llamadas": []})));
    assert!(!rule.validate(&json!({})));
    assert!(!rule.validate(&json!([1, 2])));
    assert!(!rule.validate(&Value::Null));
  }

  #[test]
  fn test_any_field_truthiness() {
    let rule = ValidationRule::AnyField(&["usuarios", "grupos"]);
    assert!(rule.validate(&json!({"usuarios": []})));
    assert!(rule.validate(&json!({"grupos": {"a": 1}})));
    assert!(!rule.validate(&json!({"usuarios": null, "grupos": false})));
    assert!(!rule.validate(&json!({"usuarios": "", "grupos": 0})));
    assert!(!rule.validate(&json!({"other": [1]})));
    assert!(!rule.validate(&json!("usuarios")));
  }

  #[test]
  fn test_all_fields() {
    let rule = ValidationRule::AllFields(&["status", "checkedAt"]);
    assert!(rule.validate(&json!({"status": "ok", "checkedAt": "2024-01-01"})));
    assert!(!rule.validate(&json!({"status": "ok"})));
    assert!(!rule.validate(&json!({"status": "ok", "checkedAt": null})));
  }

  #[test]
  fn test_accept_any() {
    assert!(ValidationRule::AcceptAny.validate(&Value::Null));
    assert!(ValidationRule::AcceptAny.validate(&json!([])));
  }

  #[test]
  fn test_fn_validator() {
    let validator = FnValidator::new("has-ok", |p: &Value| p.get("ok") == Some(&json!(true)));
    assert_eq!(validator.name(), "has-ok");
    assert!(validator.validate(&json!({"ok": true})));
    assert!(!validator.validate(&json!({"ok": false})));
  }

  #[test]
  fn test_registry_lookup() {
    let mut registry = ValidatorRegistry::new();
    registry.register("calls", Arc::new(ValidationRule::CallsCatalog));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("calls").map(|v| v.name().to_string()), Some("calls-catalog".into()));
    assert!(registry.get("missing").is_none());
    assert_eq!(registry.get_or_accept("missing").name(), "accept-any");
  }
}
