//! Error handling utilities for graceful degradation
//!
//! Provides helpers for logging errors that must not stop execution.

use tracing::warn;

/// Execute an operation and log errors without failing
///
/// Returns `Some(T)` on success, `None` on error (after logging).
pub fn log_error<F, T, E>(operation: F, context: &str) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_error() {
        assert_eq!(log_error(|| Ok::<_, String>(3), "ctx"), Some(3));
        assert_eq!(log_error(|| Err::<u8, _>("bad"), "ctx"), None);
    }
}
