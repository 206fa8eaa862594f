//! Tempest adapter configuration.

use serde::Deserialize;

/// Configuration for the weather-station telemetry backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TempestConfig {
    /// Whether the backend is wired up at all.
    pub enabled: bool,
    /// UDP port the station broadcasts telemetry on.
    pub port: u16,
    /// Key prefix for the two synthesized records.
    pub station: String,
}

impl Default for TempestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 50222,
            station: "tempest".to_string(),
        }
    }
}
