//! Wemo adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the Wemo relay/dimmer backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WemoConfig {
    /// Whether the backend is wired up at all.
    pub enabled: bool,
    /// Case-insensitive substring an advertised name must contain.
    pub name_filter: String,
    /// Adopt devices even when they fail the name filter.
    pub allow_others: bool,
    /// Length of one active mDNS browse window, in seconds.
    pub search_secs: u64,
    /// Idle time between browse windows, in seconds.
    pub wait_secs: u64,
    /// Back-to-back browse windows before the idle time applies.
    pub search_bursts: u32,
    /// Bind port for the UPnP NOTIFY listener, 0 for an ephemeral port.
    pub notify_port: u16,
}

impl Default for WemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_filter: "wemo".to_string(),
            allow_others: false,
            search_secs: 10,
            wait_secs: 30,
            search_bursts: 3,
            notify_port: 0,
        }
    }
}

impl WemoConfig {
    #[must_use]
    pub fn search_window(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    #[must_use]
    pub fn wait_window(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_defaults_for_empty_toml() {
        let config: WemoConfig = toml::from_str("").unwrap();
        assert!(config.enabled);
        assert_eq!(config.name_filter, "wemo");
        assert!(!config.allow_others);
        assert_eq!(config.search_window(), Duration::from_secs(10));
        assert_eq!(config.wait_window(), Duration::from_secs(30));
        assert_eq!(config.search_bursts, 3);
        assert_eq!(config.notify_port, 0);
    }

    #[test]
    fn should_accept_partial_toml() {
        let config: WemoConfig = toml::from_str("allow_others = true\nnotify_port = 49152").unwrap();
        assert!(config.allow_others);
        assert_eq!(config.notify_port, 49152);
        assert_eq!(config.name_filter, "wemo");
    }
}
