//! Configuration for the notification service.
//!
//! Loads from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Notification service configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Consumer group for the dispatch engine's fact consumer.
    pub consumer_group: String,
    /// Consumer group for the identity projection's fact consumer.
    pub identity_consumer_group: String,
    /// Seconds between sweep passes over pending notifications.
    pub sweep_interval_secs: u64,
    /// Seconds before the first sweep pass.
    pub sweep_initial_delay_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            consumer_group: "notification-service".to_string(),
            identity_consumer_group: "notification-identity".to_string(),
            sweep_interval_secs: 60,
            sweep_initial_delay_secs: 10,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            consumer_group: env::var("NOTIFICATION_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            identity_consumer_group: env::var("IDENTITY_CONSUMER_GROUP")
                .unwrap_or(defaults.identity_consumer_group),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            sweep_initial_delay_secs: env::var("SWEEP_INITIAL_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_initial_delay_secs),
        }
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Initial sweep delay as a [`Duration`].
    #[must_use]
    pub const fn sweep_initial_delay(&self) -> Duration {
        Duration::from_secs(self.sweep_initial_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_contract() {
        let config = DispatchConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.sweep_initial_delay(), Duration::from_secs(10));
        assert_eq!(config.consumer_group, "notification-service");
    }
}
