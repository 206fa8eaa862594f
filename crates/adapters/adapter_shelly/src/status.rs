//! Model classification and channel-status parsing for the Shelly family.
//!
//! Pure functions over advertised instance names and HTTP response bodies,
//! no network dependency. The two supported models are told apart by a
//! marker substring in the advertised name:
//!
//! | Marker | Model | Channels |
//! |--------|-------|----------|
//! | `switch25` | dual relay | `{host}/relay/0`, `{host}/relay/1` |
//! | `dimmer-l51` | dimmer | `{host}/light/0` |

use serde::Deserialize;

use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::DeviceState;

/// Device models this backend knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellyModel {
    /// Dual-relay switch, two independently keyed channels.
    Switch25,
    /// Single-channel dimmer.
    DimmerL51,
}

impl ShellyModel {
    /// Classify an advertised instance name by its model marker.
    ///
    /// Returns `None` for family members the backend has no channel map
    /// for; those are skipped at discovery.
    #[must_use]
    pub fn classify(instance: &str) -> Option<Self> {
        if instance.contains("switch25") {
            Some(Self::Switch25)
        } else if instance.contains("dimmer-l51") {
            Some(Self::DimmerL51)
        } else {
            None
        }
    }

    /// Channel keys for a device of this model at `host`. Each channel is
    /// its own device: the key doubles as the HTTP control path.
    #[must_use]
    pub fn channel_keys(self, host: &str) -> Vec<DeviceKey> {
        match self {
            Self::Switch25 => vec![
                DeviceKey::new(format!("{host}/relay/0")),
                DeviceKey::new(format!("{host}/relay/1")),
            ],
            Self::DimmerL51 => vec![DeviceKey::new(format!("{host}/light/0"))],
        }
    }

    /// State a freshly discovered channel starts from, before the first
    /// status fetch fills it in.
    #[must_use]
    pub fn initial_state(self) -> DeviceState {
        match self {
            Self::Switch25 => DeviceState::OnOff { on: false },
            Self::DimmerL51 => DeviceState::Dimmer {
                on: false,
                brightness: 0.0,
            },
        }
    }
}

/// The subset of a channel-status response the bridge cares about.
///
/// Firmware revisions vary the rest of the payload freely; unknown fields
/// are ignored and missing fields leave the current state alone.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChannelStatus {
    pub ison: Option<bool>,
    pub brightness: Option<f64>,
}

impl ChannelStatus {
    /// Fold the reported fields into `state`. Fields the state's kind has
    /// no slot for are dropped.
    pub fn apply(self, state: &mut DeviceState) {
        if let Some(on) = self.ison {
            state.set_power(on);
        }
        if let Some(brightness) = self.brightness {
            state.set_brightness(brightness);
        }
    }
}
