//! Usage telemetry: how often each domain resolved to live or fallback data.
//!
//! One register is shared by every service that should report into it.
//! Counters live behind a single mutex so a snapshot always reflects all
//! domains at one instant; listeners are notified outside the lock.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

use super::fetcher::DataSource;

/// Per-domain resolution counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageCounter {
  pub api: u64,
  pub mock: u64,
}

impl UsageCounter {
  pub fn total(&self) -> u64 {
    self.api + self.mock
  }
}

/// Point-in-time copy of all counters, keyed by domain.
pub type UsageSnapshot = BTreeMap<String, UsageCounter>;

type Listener = Arc<dyn Fn(&UsageSnapshot) + Send + Sync>;

#[derive(Default)]
struct RegisterState {
  counters: UsageSnapshot,
  last_source: BTreeMap<String, DataSource>,
  listeners: Vec<(u64, Listener)>,
  next_listener_id: u64,
}

/// Shared register of api/mock resolutions.
///
/// Cloning yields another handle onto the same counters.
#[derive(Clone, Default)]
pub struct UsageRegister {
  state: Arc<Mutex<RegisterState>>,
}

impl UsageRegister {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, RegisterState> {
    // Counters stay meaningful even if a holder panicked
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Count one completed fetch for `domain`.
  ///
  /// Only `Api` and `Mock` are counted; `Custom` sources and empty domains
  /// are ignored.
  pub fn record(&self, domain: &str, source: DataSource) {
    if domain.is_empty() {
      return;
    }

    let (snapshot, listeners) = {
      let mut state = self.lock();
      let counter = match source {
        DataSource::Api | DataSource::Mock => state.counters.entry(domain.to_string()).or_default(),
        DataSource::Custom => return,
      };
      match source {
        DataSource::Api => counter.api += 1,
        _ => counter.mock += 1,
      }
      state.last_source.insert(domain.to_string(), source);
      (state.counters.clone(), listeners_of(&state))
    };

    trace!(domain, %source, "usage recorded");
    notify(&listeners, &snapshot);
  }

  /// Copy of every counter.
  pub fn snapshot(&self) -> UsageSnapshot {
    self.lock().counters.clone()
  }

  /// Counter for a single domain, if it has been recorded.
  pub fn counter(&self, domain: &str) -> Option<UsageCounter> {
    self.lock().counters.get(domain).copied()
  }

  /// Domains whose most recent completed fetch was served from fallback data.
  pub fn degraded_domains(&self) -> Vec<String> {
    self
      .lock()
      .last_source
      .iter()
      .filter(|(_, source)| **source == DataSource::Mock)
      .map(|(domain, _)| domain.clone())
      .collect()
  }

  /// Drop every domain's counters.
  pub fn reset(&self) {
    let (snapshot, listeners) = {
      let mut state = self.lock();
      state.counters.clear();
      state.last_source.clear();
      (state.counters.clone(), listeners_of(&state))
    };
    notify(&listeners, &snapshot);
  }

  /// Register a listener.
  ///
  /// The listener is called immediately with the current snapshot, then after
  /// every `record` or `reset`, until the returned subscription is cancelled.
  pub fn subscribe<F>(&self, listener: F) -> Subscription
  where
    F: Fn(&UsageSnapshot) + Send + Sync + 'static,
  {
    let listener: Listener = Arc::new(listener);
    let (id, snapshot) = {
      let mut state = self.lock();
      let id = state.next_listener_id;
      state.next_listener_id += 1;
      state.listeners.push((id, Arc::clone(&listener)));
      (id, state.counters.clone())
    };
    listener(&snapshot);

    Subscription {
      id,
      state: Arc::downgrade(&self.state),
    }
  }

  pub fn listener_count(&self) -> usize {
    self.lock().listeners.len()
  }
}

impl fmt::Debug for UsageRegister {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.lock();
    f.debug_struct("UsageRegister")
      .field("counters", &state.counters)
      .field("listeners", &state.listeners.len())
      .finish()
  }
}

fn listeners_of(state: &RegisterState) -> Vec<Listener> {
  state
    .listeners
    .iter()
    .map(|(_, listener)| Arc::clone(listener))
    .collect()
}

fn notify(listeners: &[Listener], snapshot: &UsageSnapshot) {
  for listener in listeners {
    listener(snapshot);
  }
}

/// Handle returned by [`UsageRegister::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
  id: u64,
  state: Weak<Mutex<RegisterState>>,
}

impl Subscription {
  pub fn unsubscribe(self) {
    if let Some(state) = self.state.upgrade() {
      let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
      state.listeners.retain(|(id, _)| *id != self.id);
    }
  }
}
