//! Resilient data access: per-domain services that serve live backend data
//! or validated fallback fixtures, with usage telemetry and a TTL-cached
//! capability client.

pub mod cache;
pub mod config;
pub mod domains;
pub mod error;
pub mod logging;
pub mod permissions;
pub mod resilient;

mod commands;

pub use commands::{Context, FetchMode};

/// Subcommand handlers used by the `rdl` binary.
pub mod cli {
  pub use crate::commands::{capabilities, clear_cache, domains, fetch, groups, menu, status};
}
