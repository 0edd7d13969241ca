//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal to prompt on, `--yes` is required.
pub fn confirm(action: &str, message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Human-readable age at whole-second precision, e.g. `2h 5m 3s`.
pub fn format_age(age: Duration) -> String {
    humantime::format_duration(Duration::from_secs(age.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_drops_subsecond_noise() {
        assert_eq!(format_age(Duration::from_millis(7_503_250)), "2h 5m 3s");
        assert_eq!(format_age(Duration::from_millis(400)), "0s");
    }
}
