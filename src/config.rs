use color_eyre::{eyre::eyre, Result};
use ledgerq::ClientOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub pagination: PaginationConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL, e.g. "https://ledger.example.com/api"
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds an entry nobody reads stays cached
  #[serde(default = "default_keep_unused_for_secs")]
  pub keep_unused_for_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      keep_unused_for_secs: default_keep_unused_for_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
  #[serde(default = "default_page_size")]
  pub page_size: usize,
  /// How close to the bottom, in viewport heights, before the next page loads
  #[serde(default = "default_lookahead")]
  pub lookahead_viewports: f64,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      lookahead_viewports: default_lookahead(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter directive; RUST_LOG wins when set
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Where log files go (defaults to the platform data directory)
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_keep_unused_for_secs() -> u64 {
  60
}

fn default_page_size() -> usize {
  20
}

fn default_lookahead() -> f64 {
  1.0
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ledgerq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ledgerq/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/ledgerq/config.yaml\n\
         with at least:\n\n  api:\n    url: https://your-ledger-host/api"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("ledgerq.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ledgerq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Reject values the client cannot work with. Runs after CLI overrides.
  pub fn validate(&self) -> Result<()> {
    if self.api.url.trim().is_empty() {
      return Err(eyre!("api.url must not be empty"));
    }
    if self.pagination.page_size == 0 {
      return Err(eyre!("pagination.page_size must be at least 1"));
    }
    if !(self.pagination.lookahead_viewports.is_finite() && self.pagination.lookahead_viewports >= 0.0) {
      return Err(eyre!("pagination.lookahead_viewports must be a non-negative number"));
    }
    Ok(())
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn client_options(&self) -> ClientOptions {
    ClientOptions {
      keep_unused_for: Duration::from_secs(self.cache.keep_unused_for_secs),
      lookahead_viewports: self.pagination.lookahead_viewports,
    }
  }

  /// Bearer token from LEDGERQ_API_TOKEN, if set.
  pub fn api_token() -> Option<String> {
    std::env::var("LEDGERQ_API_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
