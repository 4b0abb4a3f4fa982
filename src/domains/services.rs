//! One resilient service per catalog domain, sharing selector, transport and
//! telemetry.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::ConfigError;
use crate::resilient::{
  FallbackProducer, FetchOptions, FetchResult, ResilientService, SelectSource, Transport,
  UsageRegister,
};

use super::catalog::{validator_registry, DOMAINS};

/// Services for every known domain.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
  services: BTreeMap<&'static str, ResilientService>,
  register: UsageRegister,
}

impl ServiceCatalog {
  /// Build the standard services.
  ///
  /// Fixtures are parsed and validated here, so a broken fixture fails the
  /// build instead of a later fallback.
  pub fn standard(
    selector: Arc<dyn SelectSource>,
    transport: Option<Arc<dyn Transport>>,
    register: UsageRegister,
  ) -> Result<Self, ConfigError> {
    let mut services = BTreeMap::new();
    let validators = validator_registry();

    for spec in DOMAINS {
      let mut builder = ResilientService::builder(spec.id)
        .endpoint(spec.endpoint)
        .fallback(FallbackProducer::from_value(spec.fixture()?))
        .selector(Arc::clone(&selector))
        .validator(validators.get_or_accept(spec.id))
        .error_context(spec.error_context)
        .register(register.clone());
      if let Some(transport) = &transport {
        builder = builder.transport(Arc::clone(transport));
      }
      services.insert(spec.id, builder.build()?);
    }

    debug!(domains = services.len(), "service catalog built");
    Ok(Self { services, register })
  }

  pub fn get(&self, domain: &str) -> Option<&ResilientService> {
    self.services.get(domain)
  }

  /// Like [`ServiceCatalog::get`], but an unknown domain is an error.
  pub fn service(&self, domain: &str) -> Result<&ResilientService, ConfigError> {
    self.get(domain).ok_or_else(|| ConfigError::UnknownDomain {
      domain: domain.to_string(),
    })
  }

  /// Services in domain order.
  pub fn iter(&self) -> impl Iterator<Item = &ResilientService> {
    self.services.values()
  }

  pub fn len(&self) -> usize {
    self.services.len()
  }

  pub fn is_empty(&self) -> bool {
    self.services.is_empty()
  }

  pub fn register(&self) -> &UsageRegister {
    &self.register
  }

  /// Fetch every domain concurrently.
  ///
  /// Each fetch runs the full pipeline independently and records its own
  /// outcome.
  pub async fn fetch_all(&self, options: FetchOptions) -> Vec<FetchResult> {
    join_all(self.iter().map(|service| service.fetch(options.clone()))).await
  }

  /// Catalog domains whose latest completed fetch was served from fallback
  /// data.
  pub fn degraded_domains(&self) -> Vec<String> {
    self
      .register
      .degraded_domains()
      .into_iter()
      .filter(|domain| self.services.contains_key(domain.as_str()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domains::load_fixture;
  use crate::resilient::transport::testing::StubTransport;
  use crate::resilient::{
    DataSource, FixedSource, MapSignals, SourceDecision, SourceSelector, TransportResponse,
  };
  use serde_json::json;

  fn catalog_with(
    selector: Arc<dyn SelectSource>,
    transport: StubTransport,
  ) -> (ServiceCatalog, Arc<StubTransport>) {
    let transport = Arc::new(transport);
    let catalog = ServiceCatalog::standard(
      selector,
      Some(transport.clone() as Arc<dyn Transport>),
      UsageRegister::new(),
    )
    .unwrap();
    (catalog, transport)
  }

  #[test]
  fn test_every_domain_is_built() {
    let (catalog, _) = catalog_with(
      Arc::new(FixedSource(SourceDecision::Mock)),
      StubTransport::json(json!({})),
    );
    assert_eq!(catalog.len(), 15);
    assert_eq!(catalog.service("dora").unwrap().endpoint(), "/api/dora/");
    assert!(matches!(
      catalog.service("weather"),
      Err(ConfigError::UnknownDomain { .. })
    ));
  }

  #[tokio::test]
  async fn test_calls_forced_to_mock_never_hits_transport() {
    let selector = SourceSelector::new(
      "UI_BACKEND",
      MapSignals::new().with("UI_BACKEND_CALLS_SOURCE", "mock"),
    );
    let (catalog, transport) = catalog_with(Arc::new(selector), StubTransport::json(json!({})));
    let calls = catalog.service("calls").unwrap();

    assert!(calls.should_use_mock());
    let result = calls.fetch(FetchOptions::new()).await;
    assert_eq!(result.source, DataSource::Mock);
    assert!(result.error.is_none());
    assert_eq!(result.data, load_fixture("calls").unwrap());
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_calls_live_catalog_is_accepted() {
    let payload = json!({"llamadas": [], "estados": [], "tipos": []});
    let (catalog, _) = catalog_with(
      Arc::new(FixedSource(SourceDecision::Api)),
      StubTransport::json(payload.clone()),
    );

    let result = catalog.service("calls").unwrap().fetch(FetchOptions::new()).await;
    assert_eq!(result.source, DataSource::Api);
    assert_eq!(result.data, payload);
    assert!(result.error.is_none());
    assert_eq!(
      catalog.register().counter("calls").map(|c| (c.api, c.mock)),
      Some((1, 0))
    );
  }

  #[tokio::test]
  async fn test_calls_service_unavailable_falls_back() {
    let (catalog, _) = catalog_with(
      Arc::new(FixedSource(SourceDecision::Api)),
      StubTransport::respond(TransportResponse::new(503, "Service Unavailable", "")),
    );

    let result = catalog.service("calls").unwrap().fetch(FetchOptions::new()).await;
    assert_eq!(result.source, DataSource::Mock);
    let message = result.error.unwrap().to_string();
    assert!(message.contains("503"), "{message}");
    assert!(message.starts_with("Could not load calls"));
    assert_eq!(catalog.degraded_domains(), vec!["calls".to_string()]);
  }

  #[tokio::test]
  async fn test_calls_empty_list_is_invalid_payload() {
    let (catalog, _) = catalog_with(
      Arc::new(FixedSource(SourceDecision::Api)),
      StubTransport::json(json!({"llamadas": []})),
    );

    let result = catalog.service("calls").unwrap().fetch(FetchOptions::new()).await;
    assert_eq!(result.source, DataSource::Mock);
    assert!(result.error.unwrap().to_string().contains("payload"));
  }

  #[tokio::test]
  async fn test_fetch_all_records_every_domain() {
    let (catalog, transport) = catalog_with(
      Arc::new(FixedSource(SourceDecision::Api)),
      StubTransport::respond(TransportResponse::new(500, "Internal Server Error", "")),
    );

    let results = catalog.fetch_all(FetchOptions::new()).await;
    assert_eq!(results.len(), 15);
    assert!(results.iter().all(|r| r.source == DataSource::Mock));
    assert_eq!(transport.calls(), 15);
    assert_eq!(catalog.register().snapshot().len(), 15);
    assert_eq!(catalog.degraded_domains().len(), 15);
  }

  #[tokio::test]
  async fn test_degraded_domains_ignore_foreign_records() {
    let (catalog, _) = catalog_with(
      Arc::new(FixedSource(SourceDecision::Mock)),
      StubTransport::json(json!({})),
    );
    catalog.register().record("adhoc", DataSource::Mock);
    catalog
      .service("health")
      .unwrap()
      .fetch(FetchOptions::new())
      .await;
    assert_eq!(catalog.degraded_domains(), vec!["health".to_string()]);
  }

  #[tokio::test]
  async fn test_without_transport_everything_falls_back() {
    let catalog = ServiceCatalog::standard(
      Arc::new(FixedSource(SourceDecision::Api)),
      None,
      UsageRegister::new(),
    )
    .unwrap();
    let result = catalog.service("dora").unwrap().fetch(FetchOptions::new()).await;
    assert_eq!(result.source, DataSource::Mock);
    assert!(result.error.is_some());
  }
}
