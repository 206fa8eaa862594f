//! Shelly adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the Shelly relay/dimmer backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellyConfig {
    /// Whether the backend is wired up at all.
    pub enabled: bool,
    /// Case-sensitive substring an advertised instance name must contain.
    pub name_filter: String,
    /// Length of one active mDNS browse window, in seconds.
    pub search_secs: u64,
    /// Idle time between browse windows, in seconds.
    pub wait_secs: u64,
    /// Interval between HTTP status polls, in seconds.
    pub poll_secs: u64,
}

impl Default for ShellyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_filter: "shelly".to_string(),
            search_secs: 5,
            wait_secs: 120,
            poll_secs: 30,
        }
    }
}

impl ShellyConfig {
    #[must_use]
    pub fn search_window(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    #[must_use]
    pub fn wait_window(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    #[must_use]
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_defaults_for_empty_toml() {
        let config: ShellyConfig = toml::from_str("").unwrap();
        assert!(config.enabled);
        assert_eq!(config.name_filter, "shelly");
        assert_eq!(config.search_window(), Duration::from_secs(5));
        assert_eq!(config.wait_window(), Duration::from_secs(120));
        assert_eq!(config.poll_period(), Duration::from_secs(30));
    }

    #[test]
    fn should_accept_partial_toml() {
        let config: ShellyConfig = toml::from_str("poll_secs = 10").unwrap();
        assert_eq!(config.poll_period(), Duration::from_secs(10));
        assert_eq!(config.name_filter, "shelly");
    }
}
