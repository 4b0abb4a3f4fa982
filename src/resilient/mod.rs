//! Resilient per-domain data access.
//!
//! Each domain is served from its live endpoint unless an override routes it
//! to fallback data, or the live attempt fails:
//! - [`source`] decides api vs mock from out-of-band override signals
//! - [`validate`] holds the per-domain payload checks
//! - [`fetcher`] performs one attempt and resolves to live or fallback data
//! - [`telemetry`] counts how each domain resolved
//! - [`service`] composes the above behind one contract

pub mod fetcher;
pub mod service;
pub mod source;
pub mod telemetry;
pub mod transport;
pub mod validate;

pub use fetcher::{DataSource, FallbackProducer, FetchMetadata, FetchResult};
pub use service::{FetchOptions, ResilientService, ServiceBuilder};
pub use source::{
  EnvSignals, FixedSource, LayeredSignals, MapSignals, OverrideSignals, SelectSource,
  SourceDecision, SourceSelector,
};
pub use telemetry::{Subscription, UsageCounter, UsageRegister, UsageSnapshot};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
pub use validate::{FnValidator, PayloadValidator, ValidationRule, ValidatorRegistry};
