//! Handlers behind the `rdl` subcommands.

use chrono::Duration as TtlDuration;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{KeyValueStore, NoopStore, SqliteStore, TtlCache};
use crate::config::Config;
use crate::domains::ServiceCatalog;
use crate::permissions::{CachedCapabilityClient, CapabilityClient, UserId};
use crate::resilient::{
  FetchOptions, FetchResult, ReqwestTransport, SelectSource, SourceSelector, Transport,
  UsageRegister,
};

/// Which path `fetch` exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
  /// Selector decides, failures fall back
  Resilient,
  /// Backend only; failures are reported
  ApiOnly,
  /// Fixture only
  MockOnly,
}

/// Everything the handlers share, built once from the config.
pub struct Context {
  pub config: Config,
  pub selector: Arc<SourceSelector>,
  pub transport: Arc<ReqwestTransport>,
  pub catalog: ServiceCatalog,
}

impl Context {
  pub fn new(config: Config) -> Result<Self> {
    let mut transport = ReqwestTransport::new(&config.api.base_url, config.api.timeout())
      .map_err(|e| eyre!("Failed to create HTTP transport: {}", e))?;
    if let Some(token) = Config::api_token() {
      transport = transport.with_bearer_token(token);
    }
    let transport = Arc::new(transport);
    let selector = Arc::new(config.source_selector());

    let catalog = ServiceCatalog::standard(
      Arc::clone(&selector) as Arc<dyn SelectSource>,
      Some(Arc::clone(&transport) as Arc<dyn Transport>),
      UsageRegister::new(),
    )
    .map_err(|e| eyre!("Failed to build services: {}", e))?;

    debug!(base_url = %config.api.base_url, "context ready");
    Ok(Self {
      config,
      selector,
      transport,
      catalog,
    })
  }

  fn store(&self) -> Result<Arc<dyn KeyValueStore>> {
    if !self.config.cache.enabled {
      return Ok(Arc::new(NoopStore));
    }
    let store = match &self.config.cache.path {
      Some(path) => SqliteStore::open(path),
      None => SqliteStore::open_default(),
    }
    .map_err(|e| eyre!("Failed to open cache storage: {}", e))?;
    Ok(Arc::new(store))
  }

  /// Cached capability client; requests are abandoned once `signal` fires.
  fn capability_client(
    &self,
    signal: Option<CancellationToken>,
  ) -> Result<CachedCapabilityClient<dyn KeyValueStore>> {
    let store = self.store()?;
    let ttl = TtlDuration::try_milliseconds(self.config.cache.ttl_ms)
      .filter(|ttl| *ttl >= TtlDuration::zero())
      .ok_or_else(|| eyre!("Invalid cache TTL {} ms", self.config.cache.ttl_ms))?;
    let capabilities = TtlCache::new(
      Arc::clone(&store),
      self.config.cache.capabilities_prefix.clone(),
    )
    .with_ttl(ttl);
    let menus = TtlCache::new(store, self.config.cache.menu_prefix.clone()).with_ttl(ttl);
    let mut client = CapabilityClient::new(Arc::clone(&self.transport) as Arc<dyn Transport>);
    if let Some(signal) = signal {
      client = client.with_signal(signal);
    }
    Ok(CachedCapabilityClient::with_caches(client, capabilities, menus))
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let text =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", text);
  Ok(())
}

/// A token cancelled on Ctrl-C, so an in-flight request gives up instead of
/// hanging. Resilient fetches then fall back; capability lookups fail.
fn interrupt_token() -> CancellationToken {
  let token = CancellationToken::new();
  let child = token.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("interrupted, cancelling request");
      child.cancel();
    }
  });
  token
}

pub async fn fetch(ctx: &Context, domain: &str, mode: FetchMode) -> Result<()> {
  let service = ctx.catalog.service(domain).map_err(|e| eyre!("{}", e))?;
  let options = FetchOptions::new().with_signal(interrupt_token());

  match mode {
    FetchMode::Resilient => print_json(&service.fetch(options).await),
    FetchMode::ApiOnly => {
      let data = service
        .fetch_from_api(options)
        .await
        .map_err(|e| eyre!("{} ({}): {}", domain, service.endpoint(), e))?;
      print_json(&FetchResult::from_api(data).with_domain(domain))
    }
    FetchMode::MockOnly => {
      let data = service.fetch_from_mock().await;
      print_json(&FetchResult::from_mock(data, None).with_domain(domain))
    }
  }
}

pub fn domains(ctx: &Context) {
  println!("{:<15} {:<6} {:<34} OVERRIDE KEY", "DOMAIN", "SOURCE", "ENDPOINT");
  for service in ctx.catalog.iter() {
    let decision = ctx.selector.decide(service.domain());
    println!(
      "{:<15} {:<6} {:<34} {}",
      service.domain(),
      decision.to_string(),
      service.endpoint(),
      ctx.selector.key_for(service.domain())
    );
  }
}

#[derive(Serialize)]
struct StatusReport {
  usage: crate::resilient::UsageSnapshot,
  degraded: Vec<String>,
}

pub async fn status(ctx: &Context, json: bool) -> Result<()> {
  let options = FetchOptions::new().with_signal(interrupt_token());
  ctx.catalog.fetch_all(options).await;

  let report = StatusReport {
    usage: ctx.catalog.register().snapshot(),
    degraded: ctx.catalog.degraded_domains(),
  };
  if json {
    return print_json(&report);
  }

  println!("{:<15} {:>4} {:>5}", "DOMAIN", "API", "MOCK");
  for (domain, counter) in &report.usage {
    println!("{:<15} {:>4} {:>5}", domain, counter.api, counter.mock);
  }
  if report.degraded.is_empty() {
    println!("\nAll domains served from the backend.");
  } else {
    println!("\nDegraded: {}", report.degraded.join(", "));
  }
  Ok(())
}

pub async fn capabilities(
  ctx: &Context,
  user: UserId,
  checks: &[String],
  refresh: bool,
) -> Result<()> {
  let client = ctx.capability_client(Some(interrupt_token()))?;

  if !checks.is_empty() {
    if refresh {
      client.clear_cache(Some(user));
    }
    let checks: Vec<&str> = checks.iter().map(String::as_str).collect();
    let result: BTreeMap<String, bool> = match checks.as_slice() {
      [single] => {
        let granted = client.has_capability(user, single).await?;
        [(single.to_string(), granted)].into_iter().collect()
      }
      many => client.has_capabilities(user, many).await?,
    };
    return print_json(&result);
  }

  let response = if refresh {
    client.refresh_capabilities(user).await?
  } else {
    client.capabilities(user).await?
  };
  print_json(&response)
}

pub async fn menu(ctx: &Context, user: UserId) -> Result<()> {
  let client = ctx.capability_client(Some(interrupt_token()))?;
  print_json(&client.menu(user).await?)
}

pub async fn groups(ctx: &Context, user: UserId) -> Result<()> {
  let client = ctx.capability_client(Some(interrupt_token()))?;
  print_json(&client.groups(user).await?)
}

pub fn clear_cache(ctx: &Context, user: Option<UserId>) -> Result<()> {
  let client = ctx.capability_client(None)?;
  client.clear_cache(user);
  match user {
    Some(user) => println!("Cleared cached capabilities and menu for user {}.", user),
    None => println!("Cleared cached capabilities and menus for all users."),
  }
  Ok(())
}
