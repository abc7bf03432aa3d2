//! Environment-variable configuration knobs.
//!
//! All knobs are read lazily at call time so tests and operators can
//! adjust them without rebuilding.

use std::time::Duration;

/// Read an unsigned integer from the environment, falling back to
/// `default` when unset or unparsable.
pub fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Read a millisecond duration from the environment.
pub fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_ms))
}
