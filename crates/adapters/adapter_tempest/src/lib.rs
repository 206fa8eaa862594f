//! # lanbridge-adapter-tempest
//!
//! Weather-station backend — the station pushes telemetry as UDP
//! broadcast datagrams; nothing is ever requested from it.
//!
//! ## How it works
//!
//! `start` synthesizes two records up front — a thermometer and a
//! humidity sensor keyed off the configured station prefix — then binds
//! the telemetry port and applies matching observation frames as they
//! arrive. Each applied cell republishes its record through the
//! registered sink. The transport is one-way: reads serve the cached
//! record, and power or brightness commands are unsupported.
//!
//! ## Dependency rule
//!
//! Depends on `lanbridge-app` (port) and `lanbridge-domain`.

mod config;
pub mod frame;

pub use config::TempestConfig;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use lanbridge_app::ports::backend::{DeviceBackend, RecordSink};
use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::{DeviceRecord, DeviceState};
use lanbridge_domain::time;

const RECV_BUFFER: usize = 2048;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend for the pushed-telemetry weather station.
pub struct TempestBackend {
    shared: Arc<Shared>,
}

struct Shared {
    config: TempestConfig,
    devices: Mutex<HashMap<DeviceKey, DeviceRecord>>,
    sinks: Mutex<HashMap<DeviceKey, RecordSink>>,
    bound: Mutex<Option<SocketAddr>>,
}

impl TempestBackend {
    #[must_use]
    pub fn new(config: TempestConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                devices: Mutex::new(HashMap::new()),
                sinks: Mutex::new(HashMap::new()),
                bound: Mutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl DeviceBackend for TempestBackend {
    fn name(&self) -> &'static str {
        "tempest"
    }

    async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError> {
        // Records first: a failed bind leaves them registered, going
        // stale, rather than absent.
        for record in self.shared.synthesize_records() {
            discoveries.send(record);
        }

        let port = self.shared.config.port;
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|err| BridgeError::transport(format!("binding udp port {port}"), err))?;
        if let Ok(addr) = socket.local_addr() {
            *lock(&self.shared.bound) = Some(addr);
            tracing::info!(%addr, "telemetry listener bound");
        }
        tokio::spawn(recv_loop(Arc::clone(&self.shared), socket));
        Ok(())
    }

    fn register_for_events(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        if !lock(&self.shared.devices).contains_key(key) {
            return Err(BridgeError::unknown(key));
        }
        lock(&self.shared.sinks).insert(key.clone(), sink);
        Ok(())
    }

    async fn set_power(&self, key: &DeviceKey, _on: bool) -> Result<(), BridgeError> {
        Err(BridgeError::unsupported(key, "set_power"))
    }

    async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        // Push-only transport: the freshest state is whatever the last
        // frame left behind.
        let record = lock(&self.shared.devices)
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::unknown(key))?;
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
    fn thermometer_key(&self) -> DeviceKey {
        DeviceKey::new(format!("{}T", self.config.station))
    }

    fn humidity_key(&self) -> DeviceKey {
        DeviceKey::new(format!("{}H", self.config.station))
    }

    /// Create the station's two records and return them in announce
    /// order: thermometer first, humidity second.
    fn synthesize_records(&self) -> Vec<DeviceRecord> {
        let records = vec![
            DeviceRecord::new(
                self.thermometer_key(),
                "Tempest T",
                DeviceState::Thermometer { celsius: 0.0 },
            ),
            DeviceRecord::new(
                self.humidity_key(),
                "Tempest H",
                DeviceState::Humidity { percent: 0.0 },
            ),
        ];
        let mut devices = lock(&self.devices);
        for record in &records {
            devices.insert(record.key.clone(), record.clone());
        }
        records
    }

    fn handle_frame(&self, payload: &[u8]) {
        let observation = match frame::parse_frame(payload) {
            Ok(Some(observation)) => observation,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(%err, "telemetry frame skipped");
                return;
            }
        };
        if observation.is_empty() {
            tracing::debug!("observation without usable cells skipped");
            return;
        }
        if let Some(celsius) = observation.temperature {
            self.apply_reading(&self.thermometer_key(), celsius);
        }
        if let Some(percent) = observation.humidity {
            self.apply_reading(&self.humidity_key(), percent);
        }
    }

    fn apply_reading(&self, key: &DeviceKey, value: f64) {
        let updated = {
            let mut devices = lock(&self.devices);
            devices.get_mut(key).map(|record| {
                record.state.set_reading(value);
                record.last_seen = time::now();
                record.clone()
            })
        };
        let Some(record) = updated else { return };
        let sink = lock(&self.sinks).get(key).cloned();
        if let Some(sink) = sink {
            sink.send(record);
        }
    }
}

async fn recv_loop(shared: Arc<Shared>, socket: UdpSocket) {
    let mut buf = [0u8; RECV_BUFFER];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, _peer)) => shared.handle_frame(&buf[..len]),
            Err(err) => {
                tracing::warn!(%err, "telemetry receive failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
