//! Known data domains: endpoints, fallback fixtures and validation rules.

mod catalog;
mod services;

pub use catalog::{
  domain_spec, load_fixture, registered_domains, validator_registry, DomainSpec, DOMAINS,
};
pub use services::ServiceCatalog;
