//! Canonical device records — the normalized model every backend maps into.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::DeviceKey;
use crate::time::{self, Timestamp};

/// Device categories understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Thermometer,
    Humidity,
    Image,
    OnOff,
    Dimmer,
    ColorLight,
}

impl DeviceKind {
    /// Whether the device accepts power commands.
    #[must_use]
    pub fn is_switchable(self) -> bool {
        matches!(self, Self::OnOff | Self::Dimmer | Self::ColorLight)
    }

    /// Whether the device accepts brightness commands.
    #[must_use]
    pub fn is_dimmable(self) -> bool {
        matches!(self, Self::Dimmer)
    }

    /// Whether the device is a read-only measurement source.
    #[must_use]
    pub fn is_sensor(self) -> bool {
        matches!(self, Self::Thermometer | Self::Humidity)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Thermometer => "thermometer",
            Self::Humidity => "humidity",
            Self::Image => "image",
            Self::OnOff => "on_off",
            Self::Dimmer => "dimmer",
            Self::ColorLight => "color_light",
        };
        f.write_str(name)
    }
}

/// Kind-tagged device state.
///
/// Each variant carries only the fields meaningful for that kind, so a
/// sensor can never grow a power flag and a relay can never grow a
/// reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceState {
    Thermometer { celsius: f64 },
    Humidity { percent: f64 },
    Image,
    OnOff { on: bool },
    Dimmer { on: bool, brightness: f64 },
    ColorLight { on: bool },
}

impl DeviceState {
    /// The kind tag of this state.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Thermometer { .. } => DeviceKind::Thermometer,
            Self::Humidity { .. } => DeviceKind::Humidity,
            Self::Image => DeviceKind::Image,
            Self::OnOff { .. } => DeviceKind::OnOff,
            Self::Dimmer { .. } => DeviceKind::Dimmer,
            Self::ColorLight { .. } => DeviceKind::ColorLight,
        }
    }

    /// Current power flag, for kinds that have one.
    #[must_use]
    pub fn power(&self) -> Option<bool> {
        match self {
            Self::OnOff { on } | Self::Dimmer { on, .. } | Self::ColorLight { on } => Some(*on),
            _ => None,
        }
    }

    /// Current measurement, for sensor kinds.
    #[must_use]
    pub fn reading(&self) -> Option<f64> {
        match self {
            Self::Thermometer { celsius } => Some(*celsius),
            Self::Humidity { percent } => Some(*percent),
            _ => None,
        }
    }

    /// Current brightness, for dimmable kinds.
    #[must_use]
    pub fn brightness(&self) -> Option<f64> {
        match self {
            Self::Dimmer { brightness, .. } => Some(*brightness),
            _ => None,
        }
    }

    /// Apply a power change. Returns `false` when the kind has no power
    /// flag, leaving the state untouched.
    pub fn set_power(&mut self, value: bool) -> bool {
        match self {
            Self::OnOff { on } | Self::Dimmer { on, .. } | Self::ColorLight { on } => {
                *on = value;
                true
            }
            _ => false,
        }
    }

    /// Apply a brightness change. Returns `false` for non-dimmable kinds.
    pub fn set_brightness(&mut self, value: f64) -> bool {
        match self {
            Self::Dimmer { brightness, .. } => {
                *brightness = value;
                true
            }
            _ => false,
        }
    }

    /// Apply a fresh measurement. Returns `false` for non-sensor kinds.
    pub fn set_reading(&mut self, value: f64) -> bool {
        match self {
            Self::Thermometer { celsius } => {
                *celsius = value;
                true
            }
            Self::Humidity { percent } => {
                *percent = value;
                true
            }
            _ => false,
        }
    }
}

/// A normalized device as reported by its owning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub key: DeviceKey,
    pub name: String,
    pub state: DeviceState,
    /// When the owning backend last heard from (or synthesized) this
    /// device. Bookkeeping only — the bridge makes no liveness calls.
    pub last_seen: Timestamp,
}

impl DeviceRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(key: impl Into<DeviceKey>, name: impl Into<String>, state: DeviceState) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            state,
            last_seen: time::now(),
        }
    }

    /// The kind tag, fixed at creation.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.state.kind()
    }

    /// Fold a newer report of the same device into this record.
    ///
    /// Name and state are taken from `incoming` only when the kinds
    /// match — a record's kind never changes after creation. `last_seen`
    /// refreshes either way. Returns whether name and state were applied.
    pub fn absorb(&mut self, incoming: &DeviceRecord) -> bool {
        self.last_seen = incoming.last_seen;
        if self.kind() != incoming.kind() {
            return false;
        }
        self.name.clone_from(&incoming.name);
        self.state = incoming.state.clone();
        true
    }
}
