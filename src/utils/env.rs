//! Environment variable utilities
//!
//! Helpers for reading the `COMPONENTS_*` switches.

use tracing::warn;

/// Get environment variable as Option
///
/// Returns `Some(value)` if set and non-empty.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get environment variable as an explicit on/off switch
///
/// "true", "1", "yes", "on" give `Some(true)`; "false", "0", "no", "off" give
/// `Some(false)` (case-insensitive). Unset or empty gives `None`, as does
/// anything else, with a warning.
pub fn env_flag(key: &str) -> Option<bool> {
    let value = env_opt(key)?;
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!("Ignoring {}={:?}: not a boolean", key, value);
            None
        }
    }
}
