//! Probe adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the CSV temperature-probe backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Whether the backend is wired up at all.
    pub enabled: bool,
    /// Case-sensitive substring an advertised instance name must contain.
    pub name_filter: String,
    /// Length of one active mDNS browse window, in seconds.
    pub search_secs: u64,
    /// Idle time between browse windows, in seconds.
    pub wait_secs: u64,
    /// Interval between report polls, in seconds.
    pub poll_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_filter: "TemperatureProbe".to_string(),
            search_secs: 10,
            wait_secs: 130,
            poll_secs: 60,
        }
    }
}

impl ProbeConfig {
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
