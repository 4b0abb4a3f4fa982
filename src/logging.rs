//! Logging setup for the `rdl` binary.
//!
//! Writes to `<data dir>/rdl/logs/rdl.log` and to stderr, so stdout stays
//! clean for command output. Filtered by `RUST_LOG`, defaulting to `info`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "rdl.log";

/// Keeps the file writer alive; dropping it flushes the log.
pub struct LoggingGuard {
  _file_guard: WorkerGuard,
}

/// Default log directory, beside the cache database.
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|dir| dir.join("rdl").join("logs"))
}

/// Install the global subscriber.
pub fn init_logging(log_dir: &Path) -> Result<LoggingGuard, io::Error> {
  fs::create_dir_all(log_dir)?;

  let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
  let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(non_blocking_file)
    .with_ansi(false);

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(io::stderr)
    .with_target(false)
    .compact();

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

  Ok(LoggingGuard {
    _file_guard: file_guard,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_log_dir_is_namespaced() {
    if let Some(dir) = default_log_dir() {
      assert!(dir.ends_with("rdl/logs"));
    }
  }

  #[test]
  fn test_init_creates_directory() {
    let root = tempfile::tempdir().unwrap();
    let log_dir = root.path().join("nested").join("logs");

    // A subscriber may already be installed by another test; only the
    // directory side effect is asserted.
    let _ = init_logging(&log_dir);
    assert!(log_dir.is_dir());
  }
}
