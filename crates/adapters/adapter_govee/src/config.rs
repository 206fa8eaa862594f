//! Govee adapter configuration.

use serde::Deserialize;

/// Configuration for the fixed-endpoint light backend.
///
/// Disabled by default: there is nothing to discover, so the backend is
/// useless until an endpoint is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoveeConfig {
    /// Whether the backend is wired up at all.
    pub enabled: bool,
    /// Host plus path of the control CGI, no scheme
    /// (e.g. `192.168.1.42/cgi-bin/Govee.cgi`). Doubles as the device key.
    pub endpoint: String,
    /// Display name for the one device.
    pub name: String,
}

impl Default for GoveeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            name: "Govee Light".to_string(),
        }
    }
}
