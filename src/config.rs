//! Runtime configuration read from the environment.
//!
//! Follows the teacher's `get_call_server_port()` pattern in `main.rs`: a
//! small set of env vars with sane defaults, parsed once.

use std::time::Duration;

/// Default per-buffer poll timeout (spec.md §4.4, §5): bounds how long a
/// worker blocks on a single left buffer before moving to the next one or
/// re-checking its running flag.
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 10;

/// Sleep interval used by the trigger module's idle loop (spec.md §4.4).
pub const DEFAULT_TRIGGER_IDLE_MS: u64 = 50;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub queue_timeout: Duration,
    pub trigger_idle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_timeout: Duration::from_millis(DEFAULT_QUEUE_TIMEOUT_MS),
            trigger_idle: Duration::from_millis(DEFAULT_TRIGGER_IDLE_MS),
        }
    }
}

impl Config {
    /// Read overrides from the environment, falling back to spec defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let queue_timeout = std::env::var("RETICO_QUEUE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_QUEUE_TIMEOUT_MS));

        let trigger_idle = std::env::var("RETICO_TRIGGER_IDLE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_TRIGGER_IDLE_MS));

        Self {
            queue_timeout,
            trigger_idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.queue_timeout, Duration::from_millis(10));
    }
}
