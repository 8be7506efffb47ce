use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheSettings;

pub const DEFAULT_API_URL: &str = "https://api.example.com";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub filters: FiltersConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the catalog REST API
  pub url: String,
  /// Per-request timeout
  pub timeout_secs: u64,
  /// Extra attempts for reads that fail in transport. Writes are never retried.
  pub retries: u32,
  /// Production mode: persisted session entries are marked secure
  pub production: bool,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      timeout_secs: 10,
      retries: 1,
      production: true,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// How long unused query results are kept
  pub keep_unused_for_secs: u64,
  /// Age after which a result is refetched when subscribed again; null disables
  pub stale_after_secs: Option<u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      keep_unused_for_secs: 300,
      stale_after_secs: Some(60),
    }
  }
}

impl CacheConfig {
  pub fn settings(&self) -> CacheSettings {
    CacheSettings {
      keep_unused_for: Duration::from_secs(self.keep_unused_for_secs),
      stale_after: self.stale_after_secs.map(Duration::from_secs),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
  /// Quiescence window before search input is committed
  pub search_debounce_ms: u64,
  /// Page size of the default filter snapshot
  pub default_limit: u32,
}

impl Default for FiltersConfig {
  fn default() -> Self {
    Self {
      search_debounce_ms: 500,
      default_limit: 10,
    }
  }
}

impl FiltersConfig {
  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive when CATADM_LOG is not set
  pub level: String,
  /// Log directory (default: $XDG_DATA_HOME/catadm/logs)
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./catadm.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/catadm/config.yaml
  ///
  /// Without a file the defaults apply. `CATADM_API_URL` overrides the API url.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_api_url(std::env::var("CATADM_API_URL").ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("catadm.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("catadm").join("config.yaml");
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

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to the defaults.
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Replace the API url if an override is given.
  pub fn with_api_url(self, url: Option<String>) -> Self {
    match url.filter(|u| !u.trim().is_empty()) {
      Some(url) => Config {
        api: ApiConfig { url, ..self.api },
        ..self
      },
      None => self,
    }
  }

  /// Directory for logs and other local state.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("catadm"))
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    match &self.log.directory {
      Some(dir) => Ok(dir.clone()),
      None => Ok(Self::data_dir()?.join("logs")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.url, DEFAULT_API_URL);
    assert_eq!(config.api.retries, 1);
    assert_eq!(config.cache.settings().keep_unused_for, Duration::from_secs(300));
    assert_eq!(config.filters.search_debounce(), Duration::from_millis(500));
    assert_eq!(config.filters.default_limit, 10);
  }

  #[test]
  fn test_partial_file_keeps_other_defaults() {
    let yaml = r#"
api:
  url: http://localhost:3000
  production: false
cache:
  stale_after_secs: null
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.url, "http://localhost:3000");
    assert!(!config.api.production);
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.cache.settings().stale_after, None);
    assert_eq!(config.cache.keep_unused_for_secs, 300);
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catadm.yaml");
    std::fs::write(&path, "filters:\n  search_debounce_ms: 250\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.filters.search_debounce_ms, 250);
  }

  #[test]
  fn test_api_url_override() {
    let config = Config::default().with_api_url(Some("http://127.0.0.1:8080".into()));
    assert_eq!(config.api.url, "http://127.0.0.1:8080");

    let config = Config::default().with_api_url(Some("  ".into()));
    assert_eq!(config.api.url, DEFAULT_API_URL);
  }
}
