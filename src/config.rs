use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_TTL_MS;
use crate::permissions::{CAPABILITIES_PREFIX, MENU_PREFIX};
use crate::resilient::source::DEFAULT_OVERRIDE_PREFIX;
use crate::resilient::{EnvSignals, LayeredSignals, MapSignals, SourceSelector};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub overrides: OverridesConfig,
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8000".to_string(),
      timeout_secs: 10,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverridesConfig {
  /// Prefix of the per-domain override keys (`<PREFIX>_<DOMAIN>_SOURCE`)
  pub prefix: String,
  /// Source per domain, e.g. `calls: mock`; environment variables win
  pub sources: BTreeMap<String, String>,
}

impl Default for OverridesConfig {
  fn default() -> Self {
    Self {
      prefix: DEFAULT_OVERRIDE_PREFIX.to_string(),
      sources: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Disable to send every capability lookup to the server
  pub enabled: bool,
  pub ttl_ms: i64,
  pub capabilities_prefix: String,
  pub menu_prefix: String,
  /// SQLite file; defaults to the data directory
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_ms: DEFAULT_TTL_MS,
      capabilities_prefix: CAPABILITIES_PREFIX.to_string(),
      menu_prefix: MENU_PREFIX.to_string(),
      path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rdl.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rdl/config.yaml
  ///
  /// With no file found the defaults are used. Environment overrides are
  /// applied last.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rdl.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rdl").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn apply_env(&mut self) -> Result<()> {
    if let Ok(raw) = std::env::var("RDL_CACHE_TTL") {
      self.cache.ttl_ms = raw
        .trim()
        .parse()
        .map_err(|e| eyre!("Invalid RDL_CACHE_TTL value {:?}: {}", raw, e))?;
    }
    Ok(())
  }

  fn validate(&self) -> Result<()> {
    if self.cache.ttl_ms < 0 {
      return Err(eyre!(
        "Invalid cache TTL {} ms: must not be negative",
        self.cache.ttl_ms
      ));
    }
    Ok(())
  }

  /// Bearer token for the backend, if set.
  ///
  /// Checks RDL_API_TOKEN.
  pub fn api_token() -> Option<String> {
    std::env::var("RDL_API_TOKEN").ok().filter(|t| !t.is_empty())
  }

  /// Selector reading process environment first, then `overrides.sources`.
  pub fn source_selector(&self) -> SourceSelector {
    let prefix = self.overrides.prefix.as_str();
    let from_file = self
      .overrides
      .sources
      .iter()
      .fold(MapSignals::new(), |signals, (domain, value)| {
        signals.with_domain(prefix, domain, value.clone())
      });

    SourceSelector::new(
      prefix,
      LayeredSignals::new().push(EnvSignals).push(from_file),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resilient::{SelectSource, SourceDecision};

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "http://localhost:8000");
    assert_eq!(config.api.timeout(), Duration::from_secs(10));
    assert_eq!(config.overrides.prefix, "UI_BACKEND");
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_ms, 300_000);
    assert_eq!(config.cache.capabilities_prefix, "permisos_cache");
    assert_eq!(config.cache.menu_prefix, "menu_cache");
    assert!(config.cache.path.is_none());
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::parse(
      r#"
api:
  base_url: https://backend.example.com
cache:
  ttl_ms: 1000
"#,
    )
    .unwrap();
    assert_eq!(config.api.base_url, "https://backend.example.com");
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.cache.ttl_ms, 1000);
    assert!(config.cache.enabled);
  }

  #[test]
  fn test_empty_file_is_default() {
    let config = Config::parse("  \n").unwrap();
    assert_eq!(config.overrides.prefix, "UI_BACKEND");
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rdl.yaml");
    std::fs::write(&path, "overrides:\n  prefix: TEST_RDL_LOAD\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.overrides.prefix, "TEST_RDL_LOAD");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(dir.path().join("absent.yaml").as_path())).is_err());
  }

  #[test]
  fn test_invalid_yaml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rdl.yaml");
    std::fs::write(&path, "api: [unclosed").unwrap();
    assert!(Config::load(Some(path.as_path())).is_err());
  }

  #[test]
  fn test_negative_ttl_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rdl.yaml");
    std::fs::write(&path, "cache:\n  ttl_ms: -9223372036854775808\n").unwrap();
    let err = Config::load(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("must not be negative"), "{err}");

    std::fs::write(&path, "cache:\n  ttl_ms: 0\n").unwrap();
    assert_eq!(Config::load(Some(path.as_path())).unwrap().cache.ttl_ms, 0);
  }

  #[test]
  fn test_file_overrides_feed_selector() {
    // A prefix no test environment defines, so only the file layer answers
    let config = Config::parse(
      r#"
overrides:
  prefix: RDL_CONFIG_TEST
  sources:
    calls: api
    dora: mock
"#,
    )
    .unwrap();
    let selector = config.source_selector();
    assert_eq!(selector.decide("calls"), SourceDecision::Api);
    assert_eq!(selector.decide("dora"), SourceDecision::Mock);
    assert_eq!(selector.decide("health"), SourceDecision::Mock);
  }
}
