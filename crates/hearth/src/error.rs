//! CLI error types with miette diagnostics.
//!
//! Maps config and storage failures into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hearth_config::ConfigError;
use hearth_core::StorageError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hearth::not_found),
        help("Run: hearth {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(hearth::conflict), help("{hint}"))]
    Conflict {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hearth::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error")]
    #[diagnostic(
        code(hearth::config),
        help(
            "Check the config file and HEARTH_* environment variables.\n\
             Print the file location with: hearth config path"
        )
    )]
    Config(#[source] ConfigError),

    // ── Storage ──────────────────────────────────────────────────────
    #[error("Cache storage unavailable")]
    #[diagnostic(
        code(hearth::storage),
        help("Check that the cache directory exists and is writable, or pass --cache-dir.")
    )]
    Storage(#[from] StorageError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(hearth::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(hearth::render))]
    Render(String),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Config(_) | Self::Storage(_) | Self::Io(_) | Self::Render(_) => {
                exit_code::GENERAL
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_surfaces_as_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "cache.ttl_hours".into(),
            reason: "must be at least 1".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert_eq!(
            err.to_string(),
            "Invalid value for cache.ttl_hours: must be at least 1"
        );
    }

    #[test]
    fn missing_record_maps_to_not_found() {
        let err = CliError::NotFound {
            resource_type: "cache record".into(),
            identifier: "forecast:weather.home:hourly".into(),
            list_command: "cache list".into(),
        };
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }
}
