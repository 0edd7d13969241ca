//! Shared configuration for hearth tools.
//!
//! TOML file + `HEARTH_` environment overrides, validation, and
//! translation to `hearth_core::SessionConfig`. Core never reads files
//! itself; it receives a pre-built `SessionConfig` and a storage backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hearth_core::config::{DEFAULT_CACHE_PREFIX, DEFAULT_CACHE_TTL, DEFAULT_DEBOUNCE_DELAY};
use hearth_core::{FileStorage, SessionConfig, StorageError};

/// Prefix of environment overrides. Nested keys are separated by `__`,
/// e.g. `HEARTH_CACHE__TTL_HOURS=6`.
pub const ENV_PREFIX: &str = "HEARTH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Durable cache settings.
    #[serde(default)]
    pub cache: CacheSection,

    /// Debounce and scheduled refresh settings.
    #[serde(default)]
    pub refresh: RefreshSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheSection {
    /// Cache directory; the platform cache dir when unset.
    pub dir: Option<PathBuf>,

    /// Record lifetime in hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Namespace prefix of every stored key.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Upper bound on the total size of stored records.
    pub max_bytes: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_hours: default_ttl_hours(),
            prefix: default_prefix(),
            max_bytes: None,
        }
    }
}

fn default_ttl_hours() -> u64 {
    DEFAULT_CACHE_TTL.as_secs() / 3600
}
fn default_prefix() -> String {
    DEFAULT_CACHE_PREFIX.into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RefreshSection {
    /// Quiet period before a burst of entity changes triggers a refetch.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Refresh forecasts at every wall-clock hour.
    #[serde(default = "default_true")]
    pub hourly: bool,

    /// Capacity of the push event channel.
    #[serde(default = "default_push_buffer")]
    pub push_buffer: usize,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            hourly: true,
            push_buffer: default_push_buffer(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    u64::try_from(DEFAULT_DEBOUNCE_DELAY.as_millis()).unwrap_or(u64::MAX)
}
fn default_true() -> bool {
    true
}
fn default_push_buffer() -> usize {
    SessionConfig::default().push_channel_size
}

// ── Validation & translation ────────────────────────────────────────

const OUTPUT_FORMATS: &[&str] = &["table", "json", "json-compact", "yaml", "plain"];

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl_hours == 0 {
            return Err(invalid("cache.ttl_hours", "must be at least 1"));
        }
        if self.cache.prefix.is_empty() {
            return Err(invalid("cache.prefix", "must not be empty"));
        }
        if self.cache.max_bytes == Some(0) {
            return Err(invalid("cache.max_bytes", "must be positive when set"));
        }
        if self.refresh.push_buffer == 0 {
            return Err(invalid("refresh.push_buffer", "must be at least 1"));
        }
        if !OUTPUT_FORMATS.contains(&self.defaults.output.as_str()) {
            return Err(invalid(
                "defaults.output",
                &format!("unknown format '{}'", self.defaults.output),
            ));
        }
        Ok(())
    }

    /// Build the core session configuration.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            cache_ttl: Duration::from_secs(self.cache.ttl_hours.saturating_mul(3600)),
            cache_prefix: self.cache.prefix.clone(),
            debounce_delay: Duration::from_millis(self.refresh.debounce_ms),
            hourly_refresh: self.refresh.hourly,
            push_channel_size: self.refresh.push_buffer,
        }
    }

    /// Effective cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Open the file-backed cache storage this config points at.
    pub fn open_storage(&self) -> Result<FileStorage, StorageError> {
        let storage = FileStorage::open(self.cache_dir())?;
        Ok(match self.cache.max_bytes {
            Some(limit) => storage.with_limit(limit),
            None => storage,
        })
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "hearth", "hearth")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform cache directory for persisted records.
pub fn default_cache_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("hearth");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, falling back to the defaults on any error.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_core_defaults() {
        let session = Config::default().to_session_config();
        assert_eq!(session, SessionConfig::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.cache.ttl_hours, 24);
        assert_eq!(cfg.refresh.debounce_ms, 500);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[cache]\nttl_hours = 6\ndir = \"/var/cache/hearth\"\n\n[refresh]\nhourly = false\n",
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.cache.ttl_hours, 6);
        assert_eq!(cfg.cache.prefix, DEFAULT_CACHE_PREFIX);
        assert_eq!(cfg.cache_dir(), PathBuf::from("/var/cache/hearth"));

        let session = cfg.to_session_config();
        assert_eq!(session.cache_ttl, Duration::from_secs(6 * 3600));
        assert!(!session.hourly_refresh);
        assert_eq!(session.debounce_delay, Duration::from_millis(500));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\nttl_hours = 0\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "cache.ttl_hours"));
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let cfg = Config {
            defaults: Defaults {
                output: "xml".into(),
            },
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.cache.max_bytes = Some(1 << 20);
        cfg.refresh.debounce_ms = 250;

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn storage_opens_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.cache.dir = Some(dir.path().join("records"));
        let storage = cfg.open_storage().unwrap();
        assert_eq!(storage.dir(), dir.path().join("records"));
    }
}
