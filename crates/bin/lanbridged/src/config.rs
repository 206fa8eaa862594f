//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `lanbridge.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use serde::Deserialize;

use lanbridge_adapter_govee::GoveeConfig;
use lanbridge_adapter_probe::ProbeConfig;
use lanbridge_adapter_shelly::ShellyConfig;
use lanbridge_adapter_tempest::TempestConfig;
use lanbridge_adapter_wemo::WemoConfig;
use lanbridge_domain::overrides::DeviceOverrides;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Control API settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Device overrides file settings.
    pub overrides: OverridesConfig,
    /// Wemo backend settings.
    pub wemo: WemoConfig,
    /// Shelly backend settings.
    pub shelly: ShellyConfig,
    /// Temperature-probe backend settings.
    pub probe: ProbeConfig,
    /// Tempest telemetry backend settings.
    pub tempest: TempestConfig,
    /// Govee backend settings.
    pub govee: GoveeConfig,
}

/// Control API listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Device overrides file configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OverridesConfig {
    /// Path of the optional overrides TOML file.
    pub path: String,
}

impl Config {
    /// Load configuration from `lanbridge.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("lanbridge.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LANBRIDGE_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("LANBRIDGE_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("LANBRIDGE_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("LANBRIDGE_OVERRIDES") {
            self.overrides.path = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        // The specific variable wins over the generic one.
        if let Ok(val) = std::env::var("LANBRIDGE_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.govee.enabled && self.govee.endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "govee is enabled but has no endpoint".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Load the device overrides file named by `[overrides] path`. A
    /// missing file is valid and yields empty overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_overrides(&self) -> Result<DeviceOverrides, ConfigError> {
        match std::fs::read_to_string(&self.overrides.path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(DeviceOverrides::default())
            }
            Err(err) => Err(ConfigError::Io(err)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lanbridged=info,lanbridge=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for OverridesConfig {
    fn default() -> Self {
        Self {
            path: "devices.toml".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
