//! Operator-supplied device metadata — friendly names and placement.

use std::collections::HashMap;

use serde::Deserialize;

use crate::key::DeviceKey;

/// One override entry. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverrideEntry {
    /// Friendly display name replacing the advertised one.
    pub name: Option<String>,
    /// Whether the device sits inside the building.
    pub inside: Option<bool>,
}

/// Static per-key metadata, typically loaded from a TOML file by the
/// daemon:
///
/// ```toml
/// [devices."192.168.1.40/relay/0"]
/// name = "Porch Light"
///
/// [devices."192.168.1.77"]
/// inside = false
/// ```
///
/// A missing file, key, or field is always valid. Backends that key
/// their metadata by host rather than full device key use the
/// host-addressed lookups.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceOverrides {
    #[serde(default)]
    devices: HashMap<String, OverrideEntry>,
}

impl DeviceOverrides {
    /// The entry for a full device key, if any.
    #[must_use]
    pub fn entry(&self, key: &DeviceKey) -> Option<&OverrideEntry> {
        self.devices.get(key.as_str())
    }

    /// The entry for a bare host, if any.
    #[must_use]
    pub fn entry_for_host(&self, host: &str) -> Option<&OverrideEntry> {
        self.devices.get(host)
    }

    /// Display name for `key`, falling back to the advertised one.
    #[must_use]
    pub fn name_for(&self, key: &DeviceKey, advertised: &str) -> String {
        self.entry(key)
            .and_then(|entry| entry.name.clone())
            .unwrap_or_else(|| advertised.to_string())
    }

    /// Inside/outside placement for a host, when configured.
    #[must_use]
    pub fn inside_for_host(&self, host: &str) -> Option<bool> {
        self.entry_for_host(host).and_then(|entry| entry.inside)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, entry: OverrideEntry) {
        self.devices.insert(key.into(), entry);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
