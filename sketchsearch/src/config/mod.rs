//! Configuration management for sketchsearch
//!
//! Default config location: ~/.sketchsearch/config.toml

use crate::backends::{FanoutConfig, OpenSearchConfig};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum request body size in bytes (default: 10MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5001".to_string(),
        "http://127.0.0.1:5001".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub history: HistoryBackend,
    /// SQLite file for search history (default: <data_dir>/history.db)
    #[serde(default)]
    pub history_db: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sketchsearch")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            history: HistoryBackend::default(),
            history_db: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    OpenSearch,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_backend_timeout")]
    pub timeout_ms: u64,
    /// JSON documents loaded into the memory backend at startup
    #[serde(default)]
    pub fixtures: Option<PathBuf>,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_backend_timeout() -> u64 {
    30000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: default_backend_url(),
            username: None,
            password: None,
            timeout_ms: default_backend_timeout(),
            fixtures: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Reject searches without a filter
    #[serde(default)]
    pub require_filter: bool,
    #[serde(default = "default_size")]
    pub default_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Concurrent per-index count requests
    #[serde(default = "default_count_concurrency")]
    pub count_concurrency: usize,
    #[serde(default = "default_count_timeout")]
    pub count_timeout_ms: u64,
    /// Scroll cursor keep-alive, e.g. "1m" or "30s"
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    /// Stop counting hits past this value. Unset counts exactly.
    #[serde(default = "default_total_hits_cap")]
    pub total_hits_cap: Option<u64>,
}

fn default_size() -> usize {
    40
}

fn default_max_size() -> usize {
    10000
}

fn default_count_concurrency() -> usize {
    8
}

fn default_count_timeout() -> u64 {
    5000
}

fn default_scroll_keep_alive() -> String {
    "1m".to_string()
}

fn default_total_hits_cap() -> Option<u64> {
    Some(10000)
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            require_filter: false,
            default_size: default_size(),
            max_size: default_max_size(),
            count_concurrency: default_count_concurrency(),
            count_timeout_ms: default_count_timeout(),
            scroll_keep_alive: default_scroll_keep_alive(),
            total_hits_cap: default_total_hits_cap(),
        }
    }
}

impl SearchConfig {
    pub fn fanout(&self) -> FanoutConfig {
        FanoutConfig {
            max_concurrent: self.count_concurrency,
            timeout: Duration::from_millis(self.count_timeout_ms),
        }
    }

    pub fn keep_alive(&self) -> Result<Duration> {
        parse_keep_alive(&self.scroll_keep_alive)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RegistryConfig {
    /// YAML file with sketches, timelines and search templates
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// When disabled every user may read and write every sketch
    #[serde(default)]
    pub enabled: bool,
    /// Header carrying the authenticated user name
    #[serde(default = "default_user_header")]
    pub user_header: String,
    #[serde(default)]
    pub sketches: Vec<SketchAclConfig>,
}

fn default_user_header() -> String {
    "X-Forwarded-User".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user_header: default_user_header(),
            sketches: Vec::new(),
        }
    }
}

/// Users allowed on one sketch. `*` matches any user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SketchAclConfig {
    pub sketch_id: i64,
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,sketchsearch=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Parse a keep-alive like `30s`, `1m` or `2h`. A bare number is seconds.
pub fn parse_keep_alive(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => s.split_at(pos),
        None => (s, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| anyhow!("Invalid keep-alive '{}'", s))?;
    let multiplier: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(anyhow!("Invalid keep-alive unit in '{}'", s)),
    };
    let secs = value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("Keep-alive '{}' is too large", s))?;
    Ok(Duration::from_secs(secs))
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.expand_paths()?;
            Ok(config)
        } else {
            let mut config = Config::default();
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.storage.data_dir = expand_tilde(&self.storage.data_dir)?;
        if let Some(ref db) = self.storage.history_db {
            self.storage.history_db = Some(expand_tilde(db)?);
        }
        if let Some(ref f) = self.backend.fixtures {
            self.backend.fixtures = Some(expand_tilde(f)?);
        }
        if let Some(ref p) = self.registry.path {
            self.registry.path = Some(expand_tilde(p)?);
        }
        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.data_dir)?;
        if let Some(parent) = self.history_db_path().parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Get path to the search history database
    pub fn history_db_path(&self) -> PathBuf {
        self.storage
            .history_db
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("history.db"))
    }

    pub fn opensearch(&self) -> OpenSearchConfig {
        OpenSearchConfig {
            url: self.backend.url.clone(),
            username: self.backend.username.clone(),
            password: self.backend.password.clone(),
            timeout: Duration::from_millis(self.backend.timeout_ms),
            scroll_keep_alive: self.search.scroll_keep_alive.clone(),
        }
    }
}
