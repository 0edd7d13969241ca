//! CLI configuration: thin wrapper around `hearth_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--config, --cache-dir, --output).

use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;

use hearth_core::{CacheStore, SystemClock};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use hearth_config::{Config, load_config_from, save_config_to};

/// Config file in effect: `--config` / `HEARTH_CONFIG`, else the platform path.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(hearth_config::config_path)
}

/// Load the effective config and apply flag overrides.
pub fn resolve(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_path(global);
    tracing::debug!(path = %path.display(), "loading config");
    let mut cfg = load_config_from(&path)?;
    if let Some(dir) = &global.cache_dir {
        cfg.cache.dir = Some(dir.clone());
    }
    Ok(cfg)
}

/// Output format: flag > `defaults.output` > table.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&cfg.defaults.output, true).unwrap_or(OutputFormat::Table)
    })
}

/// Cache store over the configured durable storage, on the system clock.
pub fn open_cache(cfg: &Config) -> Result<CacheStore, CliError> {
    let storage = cfg.open_storage()?;
    Ok(CacheStore::new(
        Arc::new(storage),
        cfg.cache.prefix.clone(),
        cfg.to_session_config().cache_ttl,
        Arc::new(SystemClock),
    ))
}
