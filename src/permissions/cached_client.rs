//! Capability client with transparent TTL caching.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{Invalidate, KeyValueStore, TtlCache};
use crate::error::CapabilityError;

use super::client::CapabilityClient;
use super::types::{CapabilitiesResponse, GroupsResponse, MenuResponse, MenuTree, UserId};

/// Default namespace for cached capability lists.
pub const CAPABILITIES_PREFIX: &str = "permisos_cache";
/// Default namespace for cached menus.
pub const MENU_PREFIX: &str = "menu_cache";

/// Capability client with transparent caching support.
///
/// Capability lists and menus are cached per user for the cache's TTL.
/// Group lookups and single-capability checks that miss the cache always go
/// to the server.
pub struct CachedCapabilityClient<S: KeyValueStore + ?Sized> {
  inner: CapabilityClient,
  capabilities: TtlCache<S>,
  menus: TtlCache<S>,
}

impl<S: KeyValueStore + ?Sized> CachedCapabilityClient<S> {
  /// Build a client whose two caches share `store` under the default prefixes.
  pub fn new(inner: CapabilityClient, store: Arc<S>) -> Self {
    Self::with_caches(
      inner,
      TtlCache::new(Arc::clone(&store), CAPABILITIES_PREFIX),
      TtlCache::new(store, MENU_PREFIX),
    )
  }

  pub fn with_caches(
    inner: CapabilityClient,
    capabilities: TtlCache<S>,
    menus: TtlCache<S>,
  ) -> Self {
    Self {
      inner,
      capabilities,
      menus,
    }
  }

  /// Capability list for `user`, served from cache when fresh.
  pub async fn capabilities(&self, user: UserId) -> Result<CapabilitiesResponse, CapabilityError> {
    let identity = user.to_string();
    if let Some(cached) = self.capabilities.read::<Vec<String>>(&identity) {
      debug!(user, count = cached.len(), "capabilities served from cache");
      return Ok(CapabilitiesResponse::new(user, cached));
    }

    let response = self.inner.capabilities(user).await?;
    self.capabilities.write(&identity, &response.capacidades);
    Ok(response)
  }

  /// Whether `user` holds `capability`.
  ///
  /// A fresh cached list answers locally; otherwise the server is asked and
  /// the answer is not cached.
  pub async fn has_capability(
    &self,
    user: UserId,
    capability: &str,
  ) -> Result<bool, CapabilityError> {
    if let Some(cached) = self.capabilities.read::<Vec<String>>(&user.to_string()) {
      return Ok(cached.iter().any(|c| c == capability));
    }

    let response = self.inner.verify(user, capability).await?;
    Ok(response.tiene_permiso)
  }

  /// Check several capabilities against one capability list fetch.
  pub async fn has_capabilities(
    &self,
    user: UserId,
    capabilities: &[&str],
  ) -> Result<BTreeMap<String, bool>, CapabilityError> {
    let granted = self.capabilities(user).await?;
    Ok(
      capabilities
        .iter()
        .map(|cap| (cap.to_string(), granted.contains(cap)))
        .collect(),
    )
  }

  /// Menu tree for `user`, served from cache when fresh.
  pub async fn menu(&self, user: UserId) -> Result<MenuResponse, CapabilityError> {
    let identity = user.to_string();
    let read = self
      .menus
      .get_or_fetch(&identity, || async {
        self.inner.menu(user).await.map(|response| response.menu)
      })
      .await?;
    debug!(user, hit = read.hit, "menu resolved");

    let menu: MenuTree = read.value;
    Ok(MenuResponse {
      usuario_id: user,
      menu,
    })
  }

  /// Group memberships; never cached.
  pub async fn groups(&self, user: UserId) -> Result<GroupsResponse, CapabilityError> {
    self.inner.groups(user).await
  }

  /// Drop the user's cached entries and fetch the capability list again.
  pub async fn refresh_capabilities(
    &self,
    user: UserId,
  ) -> Result<CapabilitiesResponse, CapabilityError> {
    self.clear_cache(Some(user));
    self.capabilities(user).await
  }

  /// Clear one user's entries, or both namespaces entirely.
  pub fn clear_cache(&self, user: Option<UserId>) {
    match user {
      Some(user) => {
        let identity = user.to_string();
        self.capabilities.invalidate(Invalidate::Entry(&identity));
        self.menus.invalidate(Invalidate::Entry(&identity));
        info!(user, "permission cache cleared");
      }
      None => {
        self.capabilities.invalidate(Invalidate::All);
        self.menus.invalidate(Invalidate::All);
        info!("permission cache cleared for all users");
      }
    }
  }
}
