//! # lanbridge-adapter-wemo
//!
//! Wemo relay/dimmer backend — discovers devices over mDNS and drives
//! them through the UPnP basicevent service.
//!
//! ## How it works
//!
//! The family advertises `_http._tcp` services. A case-insensitive name
//! filter picks candidates (`allow_others` adopts the rest as well); the
//! device key is its IPv4 address, and an `immer` marker in the name or
//! TXT record makes it a dimmer. Control goes out as SOAP envelopes.
//! State comes back the other way: every adopted device is subscribed to
//! one local NOTIFY listener, so commands deliberately leave the table
//! untouched and let the device push the resulting change.
//!
//! ## Dependency rule
//!
//! Depends on `lanbridge-app` (port + scan cycle) and `lanbridge-domain`.

mod client;
mod config;
mod error;
mod events;
pub mod soap;

pub use config::WemoConfig;
pub use error::WemoError;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};

use lanbridge_app::ports::backend::{DeviceBackend, RecordSink};
use lanbridge_app::scan::{ScanCycle, ScanPhase};
use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::{DeviceKind, DeviceRecord, DeviceState};
use lanbridge_domain::time;

use crate::client::{BinaryStateReport, DeviceClient};
use crate::events::{NotifyUpdate, SubscriptionTable};

const HTTP_SERVICE: &str = "_http._tcp.local.";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend for the Wemo relay/dimmer family.
pub struct WemoBackend {
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: WemoConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) devices: Mutex<HashMap<DeviceKey, DeviceRecord>>,
    pub(crate) sinks: Mutex<HashMap<DeviceKey, RecordSink>>,
    pub(crate) clients: Mutex<HashMap<DeviceKey, DeviceClient>>,
    pub(crate) subscriptions: SubscriptionTable,
}

impl WemoBackend {
    /// Build the backend.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: WemoConfig) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| BridgeError::transport("building HTTP client", err))?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                http,
                devices: Mutex::new(HashMap::new()),
                sinks: Mutex::new(HashMap::new()),
                clients: Mutex::new(HashMap::new()),
                subscriptions: SubscriptionTable::default(),
            }),
        })
    }
}

#[async_trait]
impl DeviceBackend for WemoBackend {
    fn name(&self) -> &'static str {
        "wemo"
    }

    async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError> {
        let listener = events::start_listener(&self.shared).await?;
        tokio::spawn(browse_loop(Arc::clone(&self.shared), discoveries, listener));
        Ok(())
    }

    fn register_for_events(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        self.shared.kind_of(key)?;
        lock(&self.shared.sinks).insert(key.clone(), sink);
        Ok(())
    }

    async fn set_power(&self, key: &DeviceKey, on: bool) -> Result<(), BridgeError> {
        let kind = self.shared.kind_of(key)?;
        if !kind.is_switchable() {
            return Err(BridgeError::unsupported(key, "set_power"));
        }
        let client = self.shared.client_for(key)?;
        // Fire and forget: the device reports the flip back through
        // NOTIFY, which is where the table gets updated.
        client.set_binary_state(on).await?;
        Ok(())
    }

    async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        let client = self.shared.client_for(key)?;
        let report = client.get_binary_state().await?;
        if let Some(record) = self.shared.apply_report(key, &report) {
            sink.send(record);
        }
        Ok(())
    }

    async fn set_brightness(&self, key: &DeviceKey, percent: u8) -> Result<(), BridgeError> {
        let kind = self.shared.kind_of(key)?;
        if !kind.is_dimmable() {
            return Err(BridgeError::unsupported(key, "set_brightness"));
        }
        let client = self.shared.client_for(key)?;
        client.set_brightness(percent).await?;
        Ok(())
    }

    async fn brightness(&self, key: &DeviceKey) -> Result<f64, BridgeError> {
        let kind = self.shared.kind_of(key)?;
        if !kind.is_dimmable() {
            return Err(BridgeError::unsupported(key, "brightness"));
        }
        let client = self.shared.client_for(key)?;
        let report = client.get_binary_state().await?;
        let record = self
            .shared
            .apply_report(key, &report)
            .ok_or_else(|| BridgeError::unknown(key))?;
        record
            .state
            .brightness()
            .ok_or_else(|| BridgeError::transport_msg(format!("{key} reported no brightness")))
    }
}

impl Shared {
    fn kind_of(&self, key: &DeviceKey) -> Result<DeviceKind, BridgeError> {
        lock(&self.devices)
            .get(key)
            .map(DeviceRecord::kind)
            .ok_or_else(|| BridgeError::unknown(key))
    }

    fn client_for(&self, key: &DeviceKey) -> Result<DeviceClient, BridgeError> {
        lock(&self.clients)
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::unknown(key))
    }

    pub(crate) fn sink_for(&self, key: &DeviceKey) -> Option<RecordSink> {
        lock(&self.sinks).get(key).cloned()
    }

    /// Fold a NOTIFY update into the table, refreshing freshness.
    /// Returns the updated record.
    pub(crate) fn apply_event(&self, key: &DeviceKey, update: &NotifyUpdate) -> Option<DeviceRecord> {
        let mut devices = lock(&self.devices);
        let record = devices.get_mut(key)?;
        if let Some(on) = update.power {
            record.state.set_power(on);
        }
        if let Some(level) = update.brightness {
            record.state.set_brightness(level);
        }
        record.last_seen = time::now();
        Some(record.clone())
    }

    /// Fold a fresh control reading into the table.
    fn apply_report(&self, key: &DeviceKey, report: &BinaryStateReport) -> Option<DeviceRecord> {
        let mut devices = lock(&self.devices);
        let record = devices.get_mut(key)?;
        record.state.set_power(report.power);
        if let Some(level) = report.brightness {
            record.state.set_brightness(level);
        }
        record.last_seen = time::now();
        Some(record.clone())
    }

    /// Decide whether a resolved advertisement contributes a new device,
    /// without touching the network.
    fn plan_device(&self, instance: &str, descriptor: &str, ip: &str) -> Option<DeviceRecord> {
        if !self.passes_filter(instance) {
            tracing::debug!(instance, "service skipped by name filter");
            return None;
        }
        let key = DeviceKey::from(ip);
        let known = lock(&self.devices).contains_key(&key);
        if known {
            tracing::debug!(device = %key, "device already tracked");
            return None;
        }
        let state = if classify_dimmer(descriptor) {
            DeviceState::Dimmer {
                on: false,
                brightness: 0.0,
            }
        } else {
            DeviceState::OnOff { on: false }
        };
        Some(DeviceRecord::new(key, instance, state))
    }

    fn passes_filter(&self, instance: &str) -> bool {
        self.config.allow_others
            || instance
                .to_lowercase()
                .contains(&self.config.name_filter.to_lowercase())
    }
}

/// `immer` catches both `Dimmer` and `dimmer` spellings.
fn classify_dimmer(descriptor: &str) -> bool {
    descriptor.contains("immer")
}

async fn browse_loop(shared: Arc<Shared>, discoveries: RecordSink, listener: SocketAddr) {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(err) => {
            tracing::error!(%err, "mDNS daemon unavailable, wemo discovery disabled");
            return;
        }
    };

    let mut cycle = ScanCycle::with_bursts(
        shared.config.search_window(),
        shared.config.wait_window(),
        shared.config.search_bursts,
    );
    loop {
        let (phase, window) = cycle.advance();
        match phase {
            ScanPhase::Searching => {
                let receiver = match daemon.browse(HTTP_SERVICE) {
                    Ok(receiver) => receiver,
                    Err(err) => {
                        tracing::warn!(%err, "mDNS browse failed");
                        tokio::time::sleep(window).await;
                        continue;
                    }
                };
                let deadline = tokio::time::Instant::now() + window;
                loop {
                    let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await
                    {
                        Ok(Ok(event)) => event,
                        Ok(Err(_)) | Err(_) => break,
                    };
                    if let ServiceEvent::ServiceResolved(info) = event {
                        handle_resolved(&shared, &info, &discoveries, listener);
                    }
                }
                if let Err(err) = daemon.stop_browse(HTTP_SERVICE) {
                    tracing::debug!(%err, "stopping mDNS browse failed");
                }
            }
            ScanPhase::Waiting => tokio::time::sleep(window).await,
        }
    }
}

fn handle_resolved(
    shared: &Arc<Shared>,
    info: &mdns_sd::ServiceInfo,
    discoveries: &RecordSink,
    listener: SocketAddr,
) {
    let instance = info.get_fullname().split('.').next().unwrap_or_default();
    let mut descriptor = instance.to_string();
    for property in info.get_properties().iter() {
        descriptor.push(' ');
        descriptor.push_str(&property.to_string());
    }
    let Some(ip) = info.get_addresses().iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    }) else {
        tracing::debug!(instance, "no IPv4 address advertised, skipped");
        return;
    };
    let Some(record) = shared.plan_device(instance, &descriptor, &ip.to_string()) else {
        return;
    };

    let client = DeviceClient::new(shared.http.clone(), ip.to_string(), info.get_port());
    let key = record.key.clone();
    lock(&shared.devices).insert(key.clone(), record.clone());
    lock(&shared.clients).insert(key.clone(), client.clone());
    tracing::info!(device = %key, name = %record.name, kind = %record.kind(), "wemo device discovered");
    discoveries.send(record);
    spawn_subscription(shared, key, client, listener);
}

/// Subscribe the device to the NOTIFY listener, using whichever local
/// address routes toward it.
fn spawn_subscription(
    shared: &Arc<Shared>,
    key: DeviceKey,
    client: DeviceClient,
    listener: SocketAddr,
) {
    match events::local_ip_facing(client.host()) {
        Ok(ip) => {
            let callback = format!("http://{ip}:{}/notify", listener.port());
            tokio::spawn(events::maintain_subscription(
                Arc::clone(shared),
                key,
                client,
                callback,
            ));
        }
        Err(err) => {
            tracing::warn!(%err, device = %key, "cannot build a callback URL, events disabled");
        }
    }
}
