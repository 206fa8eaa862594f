//! Backend port — discovery and control contract for vendor device
//! families.
//!
//! A backend bridges one vendor protocol (UPnP eventing, mDNS + HTTP
//! polling, UDP telemetry, …) into canonical device records. Backends
//! own their device tables; the registry routes consumer commands
//! through [`DeviceBackend`] and receives discoveries and updates
//! through [`RecordSink`]s.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::DeviceRecord;

/// Callback handle through which backends emit device records.
///
/// One type serves both flows: discovery announcements handed to
/// [`DeviceBackend::start`], and per-device update events registered via
/// [`DeviceBackend::register_for_events`]. Sends are synchronous and
/// cheap. Emitters must not hold internal locks while sending — the
/// receiving side may call back into the backend.
#[derive(Clone)]
pub struct RecordSink(Arc<dyn Fn(DeviceRecord) + Send + Sync>);

impl RecordSink {
    /// Wrap a callback.
    pub fn new(callback: impl Fn(DeviceRecord) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    /// A sink that drops every record.
    #[must_use]
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Emit one record.
    pub fn send(&self, record: DeviceRecord) {
        (self.0)(record);
    }
}

impl fmt::Debug for RecordSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordSink")
    }
}

/// Discovery and control contract implemented by every vendor backend.
///
/// The registry stores backends as trait objects, so the trait is
/// declared with `async_trait` to stay object-safe.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Short stable name used in logs (`"wemo"`, `"shelly"`, …).
    fn name(&self) -> &'static str;

    /// Begin discovery and background work, announcing devices through
    /// `discoveries`. Returns once background tasks are spawned; the
    /// registry calls this exactly once.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] when the backend cannot bring up its
    /// transport (socket bind, browse daemon). The caller logs and moves
    /// on — a failed backend never takes the bridge down.
    async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError>;

    /// Register the per-device update sink. One slot per device, last
    /// registration wins.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`] when `key` is not in this
    /// backend's table.
    fn register_for_events(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError>;

    /// Switch the device on or off.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`], [`BridgeError::Unsupported`] for
    /// read-only families, or [`BridgeError::Transport`].
    async fn set_power(&self, key: &DeviceKey, on: bool) -> Result<(), BridgeError>;

    /// Resolve fresh state, emitting zero or more records through
    /// `sink`. Emitted records carry their own keys — a backend may
    /// report sibling devices along with the requested one. Push-only
    /// backends emit the cached record instead of re-reading.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`] or [`BridgeError::Transport`].
    async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError>;

    /// Set brightness percent (0–100). Dimmable kinds only.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unsupported`] unless the device is a dimmer, plus
    /// the usual unknown-key and transport failures.
    async fn set_brightness(&self, key: &DeviceKey, percent: u8) -> Result<(), BridgeError>;

    /// Fetch current brightness percent. Dimmable kinds only.
    ///
    /// # Errors
    ///
    /// Same surface as [`set_brightness`](Self::set_brightness).
    async fn brightness(&self, key: &DeviceKey) -> Result<f64, BridgeError>;
}
