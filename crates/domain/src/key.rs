//! Device keys — registry-wide unique identifiers for bridged devices.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a bridged device.
///
/// Keys are derived from how the owning backend addresses the device on
/// the wire: a bare host (`192.168.1.40`), a host plus channel path
/// (`192.168.1.40/relay/0`), a host plus report-line index
/// (`192.168.1.77/2`), or a synthesized station key (`tempestT`).
/// Uniqueness spans the whole registry, not just one backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Wrap a raw key string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The portion before the first `/` for keys that carry a channel or
    /// line suffix. `None` when the key is a bare host.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.0.split_once('/').map(|(host, _)| host)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DeviceKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for DeviceKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
