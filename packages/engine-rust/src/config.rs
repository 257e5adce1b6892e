//! Engine configuration.

use std::time::Duration;

/// Engine-level configuration shared by every operation built on one context.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the notification channel. Subscribers that fall further
    /// behind than this lose the oldest notifications.
    pub channel_capacity: usize,
    /// Artificial delay applied before strategies execute, unless an
    /// operation overrides it.
    pub default_connection_delay: Duration,
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            default_connection_delay: Duration::ZERO,
            log_filter: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.default_connection_delay, Duration::ZERO);
        assert_eq!(config.log_filter, "info");
        assert!(!config.json_logs);
    }
}
