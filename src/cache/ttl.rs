//! Namespaced, timestamped cache with expiry on read.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::KeyValueStore;

/// Default time-to-live: five minutes.
pub const DEFAULT_TTL_MS: i64 = 300_000;

/// Source of the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// What is persisted for every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub value: T,
  /// Epoch milliseconds at write time
  pub timestamp: i64,
  pub identity: String,
}

/// Which entries to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidate<'a> {
  /// Exactly one identity
  Entry(&'a str),
  /// Every entry in this cache's namespace
  All,
}

/// Result of [`TtlCache::get_or_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
  pub value: T,
  /// True when served from the cache, false when freshly fetched
  pub hit: bool,
}

/// A TTL cache over a [`KeyValueStore`].
///
/// Entries are stored under `<prefix>_<identity>` as JSON. An entry older
/// than the TTL is deleted the moment a read notices it, so stale data is
/// never served. Every failure (corrupt entry, storage error) degrades to a
/// miss and is logged.
pub struct TtlCache<S: KeyValueStore + ?Sized> {
  store: Arc<S>,
  prefix: String,
  ttl: Duration,
  clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore + ?Sized> TtlCache<S> {
  pub fn new(store: Arc<S>, prefix: impl Into<String>) -> Self {
    Self {
      store,
      prefix: prefix.into(),
      ttl: Duration::milliseconds(DEFAULT_TTL_MS),
      clock: Arc::new(SystemClock),
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// Storage key for an identity.
  pub fn key_for(&self, identity: &str) -> String {
    format!("{}_{}", self.prefix, identity)
  }

  fn now_ms(&self) -> i64 {
    self.clock.now().timestamp_millis()
  }

  /// Remove a key; false when the store refused.
  fn delete(&self, key: &str) -> bool {
    match self.store.remove(key) {
      Ok(()) => true,
      Err(e) => {
        warn!(key, error = %e, "failed to delete cache entry");
        false
      }
    }
  }

  /// Read the full entry for an identity, honouring the TTL.
  pub fn read_entry<T: DeserializeOwned>(&self, identity: &str) -> Option<CacheEntry<T>> {
    let key = self.key_for(identity);

    let raw = match self.store.get(&key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "ignoring corrupt cache entry");
        return None;
      }
    };

    let Some(age) = self.now_ms().checked_sub(entry.timestamp) else {
      warn!(key, timestamp = entry.timestamp, "ignoring cache entry with corrupt timestamp");
      self.delete(&key);
      return None;
    };
    if age > self.ttl.num_milliseconds() {
      debug!(key, age_ms = age, "cache entry expired");
      self.delete(&key);
      return None;
    }

    debug!(key, "cache hit");
    Some(entry)
  }

  /// Read a value, or `None` when absent, expired or unreadable.
  pub fn read<T: DeserializeOwned>(&self, identity: &str) -> Option<T> {
    self.read_entry(identity).map(|entry| entry.value)
  }

  /// Store a value stamped with the current time.
  pub fn write<T: Serialize>(&self, identity: &str, value: &T) {
    let key = self.key_for(identity);
    let entry = CacheEntry {
      value,
      timestamp: self.now_ms(),
      identity: identity.to_string(),
    };

    let raw = match serde_json::to_string(&entry) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, error = %e, "failed to serialize cache entry");
        return;
      }
    };

    match self.store.set(&key, &raw) {
      Ok(()) => debug!(key, "cache entry stored"),
      Err(e) => warn!(key, error = %e, "cache write failed"),
    }
  }

  /// Remove one entry or the whole namespace, returning how many keys the
  /// store actually deleted.
  ///
  /// `All` lists the keys first and then deletes the ones in this namespace,
  /// leaving every other key untouched.
  pub fn invalidate(&self, scope: Invalidate<'_>) -> usize {
    match scope {
      Invalidate::Entry(identity) => {
        let key = self.key_for(identity);
        if !self.delete(&key) {
          return 0;
        }
        info!(key, "cache entry invalidated");
        1
      }
      Invalidate::All => {
        let keys = match self.store.keys() {
          Ok(keys) => keys,
          Err(e) => {
            warn!(prefix = %self.prefix, error = %e, "failed to list cache keys");
            return 0;
          }
        };
        let namespace = format!("{}_", self.prefix);
        let mut removed = 0usize;
        for key in keys.iter().filter(|k| k.starts_with(&namespace)) {
          if self.delete(key) {
            removed += 1;
          }
        }
        info!(prefix = %self.prefix, removed, "cache namespace invalidated");
        removed
      }
    }
  }

  /// Cache-first read with a fetch on miss.
  ///
  /// 1. Fresh entry present - return it
  /// 2. Otherwise call `fetcher`; on success store and return the value
  /// 3. Fetch errors propagate and leave the cache untouched
  pub async fn get_or_fetch<T, E, F, Fut>(
    &self,
    identity: &str,
    fetcher: F,
  ) -> Result<CacheRead<T>, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(value) = self.read(identity) {
      return Ok(CacheRead { value, hit: true });
    }

    let value = fetcher().await?;
    self.write(identity, &value);
    Ok(CacheRead { value, hit: false })
  }
}

impl<S: KeyValueStore + ?Sized> Clone for TtlCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      prefix: self.prefix.clone(),
      ttl: self.ttl,
      clock: Arc::clone(&self.clock),
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use std::sync::Mutex;

  /// A clock that only moves when told to.
  pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
  }

  impl ManualClock {
    pub fn new() -> Self {
      Self {
        now: Mutex::new(Utc::now()),
      }
    }

    pub fn advance(&self, by: Duration) {
      let mut now = self.now.lock().unwrap();
      *now += by;
    }
  }

  impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
      *self.now.lock().unwrap()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::ManualClock;
  use super::*;
  use crate::cache::storage::MemoryStore;
  use crate::error::StorageError;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn cache(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> TtlCache<MemoryStore> {
    TtlCache::new(Arc::clone(store), "permisos_cache")
      .with_ttl(Duration::milliseconds(1_000))
      .with_clock(Arc::clone(clock) as Arc<dyn Clock>)
  }

  #[test]
  fn test_write_then_read() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);

    cache.write("7", &vec!["a.b.c".to_string()]);
    assert_eq!(cache.read::<Vec<String>>("7"), Some(vec!["a.b.c".to_string()]));

    let entry = cache.read_entry::<Vec<String>>("7").unwrap();
    assert_eq!(entry.identity, "7");
    assert_eq!(entry.timestamp, clock.now().timestamp_millis());
  }

  #[test]
  fn test_stored_layout() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    cache(&store, &clock).write("7", &42);

    let raw = store.get("permisos_cache_7").unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["value"], 42);
    assert_eq!(value["identity"], "7");
    assert!(value["timestamp"].is_i64());
  }

  #[test]
  fn test_expired_entry_is_deleted() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);

    cache.write("7", &1);
    clock.advance(Duration::milliseconds(1_000));
    // Exactly at the TTL is still fresh
    assert_eq!(cache.read::<i32>("7"), Some(1));

    clock.advance(Duration::milliseconds(1));
    assert_eq!(cache.read::<i32>("7"), None);
    assert_eq!(store.get("permisos_cache_7").unwrap(), None);
  }

  #[test]
  fn test_corrupt_entry_is_a_miss() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    store.set("permisos_cache_7", "{not json").unwrap();

    assert_eq!(cache(&store, &clock).read::<i32>("7"), None);
  }

  #[test]
  fn test_corrupt_timestamp_is_a_miss() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    store
      .set(
        "permisos_cache_7",
        r#"{"value":1,"timestamp":-9223372036854775808,"identity":"7"}"#,
      )
      .unwrap();

    assert_eq!(cache(&store, &clock).read::<i32>("7"), None);
    assert_eq!(store.get("permisos_cache_7").unwrap(), None);
  }

  #[test]
  fn test_wrong_shape_is_a_miss() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);
    cache.write("7", &"text");
    assert_eq!(cache.read::<Vec<u32>>("7"), None);
  }

  #[test]
  fn test_invalidate_single_entry() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);
    cache.write("7", &1);
    cache.write("8", &2);

    cache.invalidate(Invalidate::Entry("7"));
    assert_eq!(cache.read::<i32>("7"), None);
    assert_eq!(cache.read::<i32>("8"), Some(2));
  }

  #[test]
  fn test_invalidate_all_keeps_foreign_keys() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);
    cache.write("7", &1);
    cache.write("8", &2);
    store.set("menu_cache_7", "{}").unwrap();
    store.set("auth_token", "secret").unwrap();
    store.set("permisos", "x").unwrap();

    cache.invalidate(Invalidate::All);

    let mut keys = store.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["auth_token", "menu_cache_7", "permisos"]);
  }

  /// Reads and writes work, deletes are refused.
  struct ReadOnlyStore(MemoryStore);

  impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
      self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
      self.0.set(key, value)
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
      Err(StorageError::Backend("read-only".into()))
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
      self.0.keys()
    }
  }

  #[test]
  fn test_invalidate_counts_only_deleted_keys() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);
    cache.write("7", &1);
    cache.write("8", &2);
    assert_eq!(cache.invalidate(Invalidate::Entry("7")), 1);
    assert_eq!(cache.invalidate(Invalidate::All), 1);

    let refusing = TtlCache::new(Arc::new(ReadOnlyStore(MemoryStore::new())), "permisos_cache");
    refusing.write("7", &1);
    assert_eq!(refusing.invalidate(Invalidate::Entry("7")), 0);
    assert_eq!(refusing.invalidate(Invalidate::All), 0);
    assert_eq!(refusing.read::<i32>("7"), Some(1));
  }

  #[tokio::test]
  async fn test_get_or_fetch() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);
    let fetches = AtomicUsize::new(0);

    let fetch = || async {
      fetches.fetch_add(1, Ordering::SeqCst);
      Ok::<_, String>(vec![1, 2, 3])
    };

    let first = cache.get_or_fetch("7", fetch).await.unwrap();
    assert!(!first.hit);
    let second = cache.get_or_fetch("7", fetch).await.unwrap();
    assert!(second.hit);
    assert_eq!(second.value, vec![1, 2, 3]);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    clock.advance(Duration::milliseconds(1_001));
    let third = cache.get_or_fetch("7", fetch).await.unwrap();
    assert!(!third.hit);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_get_or_fetch_error_leaves_cache_empty() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let cache = cache(&store, &clock);

    let result = cache
      .get_or_fetch::<Vec<i32>, _, _, _>("7", || async { Err("boom".to_string()) })
      .await;
    assert_eq!(result, Err("boom".to_string()));
    assert!(store.keys().unwrap().is_empty());
  }
}
