//! # lanbridge-adapter-govee
//!
//! Single-light backend for a fixed CGI endpoint. No discovery, no
//! polling, no state feedback: the device accepts `?on=1` / `?off=1`
//! toggles and reports nothing back, so power state is tracked
//! optimistically — a toggle that reaches the device is assumed to have
//! taken effect, and a toggle that does not leaves the record untouched.
//!
//! ## Dependency rule
//!
//! Depends on `lanbridge-app` (port) and `lanbridge-domain`.

mod config;

pub use config::GoveeConfig;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use lanbridge_app::ports::backend::{DeviceBackend, RecordSink};
use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::{DeviceRecord, DeviceState};
use lanbridge_domain::time;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend for the fixed-endpoint toggle light.
pub struct GoveeBackend {
    shared: Arc<Shared>,
}

struct Shared {
    config: GoveeConfig,
    http: reqwest::Client,
    device: Mutex<Option<DeviceRecord>>,
}

impl GoveeBackend {
    /// Build the backend.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: GoveeConfig) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| BridgeError::transport("building HTTP client", err))?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                http,
                device: Mutex::new(None),
            }),
        })
    }
}

#[async_trait]
impl DeviceBackend for GoveeBackend {
    fn name(&self) -> &'static str {
        "govee"
    }

    async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError> {
        if self.shared.config.endpoint.is_empty() {
            return Err(BridgeError::transport_msg("govee endpoint not configured"));
        }
        let record = DeviceRecord::new(
            self.shared.config.endpoint.clone(),
            self.shared.config.name.clone(),
            DeviceState::ColorLight { on: false },
        );
        *lock(&self.shared.device) = Some(record.clone());
        tracing::info!(device = %record.key, "govee light registered");
        discoveries.send(record);
        Ok(())
    }

    fn register_for_events(&self, key: &DeviceKey, _sink: RecordSink) -> Result<(), BridgeError> {
        // One-way transport: no event will ever fire, so the sink is
        // dropped once the key checks out.
        self.shared.require(key)?;
        Ok(())
    }

    async fn set_power(&self, key: &DeviceKey, on: bool) -> Result<(), BridgeError> {
        self.shared.require(key)?;
        let query = if on { "on=1" } else { "off=1" };
        let url = format!("http://{key}?{query}");
        // Body carries nothing useful; reaching the CGI is the whole
        // signal.
        self.shared
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| BridgeError::transport(format!("GET {url}"), err))?;

        let mut device = lock(&self.shared.device);
        if let Some(record) = device.as_mut() {
            record.state.set_power(on);
            record.last_seen = time::now();
        }
        Ok(())
    }

    async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        let record = self.shared.require(key)?;
        sink.send(record);
        Ok(())
    }

    async fn set_brightness(&self, key: &DeviceKey, _percent: u8) -> Result<(), BridgeError> {
        Err(BridgeError::unsupported(key, "set_brightness"))
    }

    async fn brightness(&self, key: &DeviceKey) -> Result<f64, BridgeError> {
        Err(BridgeError::unsupported(key, "brightness"))
    }
}

impl Shared {
    /// The record, when `key` names the configured light.
    fn require(&self, key: &DeviceKey) -> Result<DeviceRecord, BridgeError> {
        lock(&self.device)
            .as_ref()
            .filter(|record| &record.key == key)
            .cloned()
            .ok_or_else(|| BridgeError::unknown(key))
    }
}
