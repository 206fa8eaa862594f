//! # lanbridge-adapter-shelly
//!
//! Shelly relay/dimmer backend — discovers devices over mDNS and keeps
//! their state fresh by polling each channel's HTTP status endpoint.
//!
//! ## How it works
//!
//! The family advertises `_http._tcp` services. Instance names carry a
//! model marker (`switch25`, `dimmer-l51`) that decides how many channels
//! a device contributes; each channel becomes its own bridged device whose
//! key doubles as the HTTP path (`host/relay/0?turn=on`). State never
//! arrives unsolicited: a poll task re-reads every known channel on a
//! fixed period and republishes whether or not anything changed.
//!
//! ## Dependency rule
//!
//! Depends on `lanbridge-app` (port + scan cycle) and `lanbridge-domain`.

mod config;
pub mod status;

pub use config::ShellyConfig;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};

use lanbridge_app::ports::backend::{DeviceBackend, RecordSink};
use lanbridge_app::scan::{ScanCycle, ScanPhase};
use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::overrides::DeviceOverrides;
use lanbridge_domain::record::{DeviceKind, DeviceRecord};
use lanbridge_domain::time;

use crate::status::{ChannelStatus, ShellyModel};

const HTTP_SERVICE: &str = "_http._tcp.local.";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend for the Shelly multi-channel relay/dimmer family.
pub struct ShellyBackend {
    shared: Arc<Shared>,
}

struct Shared {
    config: ShellyConfig,
    overrides: DeviceOverrides,
    http: reqwest::Client,
    devices: Mutex<HashMap<DeviceKey, DeviceRecord>>,
    sinks: Mutex<HashMap<DeviceKey, RecordSink>>,
}

impl ShellyBackend {
    /// Build the backend.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: ShellyConfig, overrides: DeviceOverrides) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| BridgeError::transport("building HTTP client", err))?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                overrides,
                http,
                devices: Mutex::new(HashMap::new()),
                sinks: Mutex::new(HashMap::new()),
            }),
        })
    }
}

#[async_trait]
impl DeviceBackend for ShellyBackend {
    fn name(&self) -> &'static str {
        "shelly"
    }

    async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError> {
        tokio::spawn(browse_loop(Arc::clone(&self.shared), discoveries));
        tokio::spawn(poll_loop(Arc::clone(&self.shared)));
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
        let query = if on { "turn=on" } else { "turn=off" };
        let status = self.shared.request(key, query).await?;
        // The command response echoes channel state; fold it in and let
        // the next poll republish.
        self.shared.apply_status(key, status);
        Ok(())
    }

    async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        self.shared.kind_of(key)?;
        let status = self.shared.request(key, "status").await?;
        if let Some(record) = self.shared.apply_status(key, status) {
            sink.send(record);
        }
        Ok(())
    }

    async fn set_brightness(&self, key: &DeviceKey, percent: u8) -> Result<(), BridgeError> {
        let kind = self.shared.kind_of(key)?;
        if !kind.is_dimmable() {
            return Err(BridgeError::unsupported(key, "set_brightness"));
        }
        let status = self
            .shared
            .request(key, &format!("brightness={percent}"))
            .await?;
        self.shared.apply_status(key, status);
        Ok(())
    }

    async fn brightness(&self, key: &DeviceKey) -> Result<f64, BridgeError> {
        let kind = self.shared.kind_of(key)?;
        if !kind.is_dimmable() {
            return Err(BridgeError::unsupported(key, "brightness"));
        }
        let status = self.shared.request(key, "status").await?;
        let record = self
            .shared
            .apply_status(key, status)
            .ok_or_else(|| BridgeError::unknown(key))?;
        record
            .state
            .brightness()
            .ok_or_else(|| BridgeError::transport_msg(format!("{key} status omitted brightness")))
    }
}

impl Shared {
    fn kind_of(&self, key: &DeviceKey) -> Result<DeviceKind, BridgeError> {
        lock(&self.devices)
            .get(key)
            .map(DeviceRecord::kind)
            .ok_or_else(|| BridgeError::unknown(key))
    }

    /// `GET http://{key}?{query}` parsed as a tolerant channel status.
    async fn request(&self, key: &DeviceKey, query: &str) -> Result<ChannelStatus, BridgeError> {
        let url = format!("http://{key}?{query}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| BridgeError::transport(format!("GET {url}"), err))?;
        response
            .json()
            .await
            .map_err(|err| BridgeError::transport(format!("decoding {url}"), err))
    }

    /// Fold a status into the table, refreshing freshness. Returns the
    /// updated record.
    fn apply_status(&self, key: &DeviceKey, status: ChannelStatus) -> Option<DeviceRecord> {
        let mut devices = lock(&self.devices);
        let record = devices.get_mut(key)?;
        status.apply(&mut record.state);
        record.last_seen = time::now();
        Some(record.clone())
    }

    /// Decide which channel records a resolved advertisement contributes,
    /// without touching the network. The name filter applies to the
    /// instance name; model markers may sit in the instance or anywhere in
    /// the TXT record, so classification runs on the full descriptor.
    /// Known keys and unmatched names produce nothing.
    fn plan_channels(&self, instance: &str, descriptor: &str, host: &str) -> Vec<DeviceRecord> {
        if !instance.contains(&self.config.name_filter) {
            tracing::debug!(instance, "service skipped by name filter");
            return Vec::new();
        }
        let Some(model) = ShellyModel::classify(descriptor) else {
            tracing::debug!(instance, "no channel map for model, skipped");
            return Vec::new();
        };

        let mut planned = Vec::new();
        for key in model.channel_keys(host) {
            let known = lock(&self.devices).contains_key(&key);
            if known {
                tracing::debug!(device = %key, "channel already tracked");
                continue;
            }
            let name = self.overrides.name_for(&key, instance);
            planned.push(DeviceRecord::new(key, name, model.initial_state()));
        }
        planned
    }
}

async fn browse_loop(shared: Arc<Shared>, discoveries: RecordSink) {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(err) => {
            tracing::error!(%err, "mDNS daemon unavailable, shelly discovery disabled");
            return;
        }
    };

    let mut cycle = ScanCycle::new(
        shared.config.search_window(),
        shared.config.wait_window(),
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
                        handle_resolved(&shared, &info, &discoveries).await;
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

async fn handle_resolved(shared: &Arc<Shared>, info: &mdns_sd::ServiceInfo, discoveries: &RecordSink) {
    let instance = info.get_fullname().split('.').next().unwrap_or_default();
    let host = info.get_hostname().trim_end_matches('.').to_string();
    let mut descriptor = instance.to_string();
    for property in info.get_properties().iter() {
        descriptor.push(' ');
        descriptor.push_str(&property.to_string());
    }

    for mut record in shared.plan_channels(instance, &descriptor, &host) {
        // Seed real state before the channel is announced; a failed fetch
        // still announces, with defaults.
        match shared.request(&record.key, "status").await {
            Ok(status) => status.apply(&mut record.state),
            Err(err) => {
                tracing::warn!(%err, device = %record.key, "initial status fetch failed");
            }
        }
        lock(&shared.devices).insert(record.key.clone(), record.clone());
        tracing::info!(device = %record.key, host = %host, "shelly channel discovered");
        discoveries.send(record);
    }
}

async fn poll_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.poll_period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Discovery already seeded state; skip the immediate first tick.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        poll_once(&shared).await;
    }
}

/// Re-read every tracked channel and republish it, changed or not.
async fn poll_once(shared: &Arc<Shared>) {
    let keys: Vec<DeviceKey> = lock(&shared.devices).keys().cloned().collect();
    for key in keys {
        match shared.request(&key, "status").await {
            Ok(status) => {
                let updated = shared.apply_status(&key, status);
                let sink = lock(&shared.sinks).get(&key).cloned();
                if let (Some(record), Some(sink)) = (updated, sink) {
                    sink.send(record);
                }
            }
            Err(err) => tracing::warn!(%err, device = %key, "status poll failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use lanbridge_domain::overrides::OverrideEntry;
    use lanbridge_domain::record::DeviceState;

    use super::*;

    fn backend_with(overrides: DeviceOverrides) -> ShellyBackend {
        ShellyBackend::new(ShellyConfig::default(), overrides).unwrap()
    }

    fn track(backend: &ShellyBackend, key: &str, state: DeviceState) {
        let record = DeviceRecord::new(key, "channel", state);
        lock(&backend.shared.devices).insert(record.key.clone(), record);
    }

    #[test]
    fn should_plan_two_channels_for_switch() {
        let backend = backend_with(DeviceOverrides::default());
        let planned = backend.shared.plan_channels(
            "shellyswitch25-C45BBE78",
            "shellyswitch25-C45BBE78",
            "shellyswitch25-c45bbe78.local",
        );

        let keys: Vec<_> = planned.iter().map(|record| record.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "shellyswitch25-c45bbe78.local/relay/0",
                "shellyswitch25-c45bbe78.local/relay/1",
            ]
        );
        assert_eq!(planned[0].kind(), DeviceKind::OnOff);
        assert_eq!(planned[0].name, "shellyswitch25-C45BBE78");
    }

    #[test]
    fn should_plan_nothing_for_filtered_or_unknown_names() {
        let backend = backend_with(DeviceOverrides::default());
        assert!(backend
            .shared
            .plan_channels("printer-4F", "printer-4F", "printer.local")
            .is_empty());
        // Matches the filter but no known model marker.
        assert!(backend
            .shared
            .plan_channels("shellyplug-s-7A2B11", "shellyplug-s-7A2B11", "shellyplug.local")
            .is_empty());
    }

    #[test]
    fn should_classify_from_txt_descriptor_when_instance_is_renamed() {
        let backend = backend_with(DeviceOverrides::default());
        let planned = backend.shared.plan_channels(
            "shelly-bedroom",
            "shelly-bedroom id=shellydimmer-l51-0E4A88 gen=1",
            "shelly-bedroom.local",
        );

        let keys: Vec<_> = planned.iter().map(|record| record.key.as_str()).collect();
        assert_eq!(keys, vec!["shelly-bedroom.local/light/0"]);
        assert_eq!(planned[0].kind(), DeviceKind::Dimmer);
    }

    #[test]
    fn should_skip_channels_already_tracked() {
        let backend = backend_with(DeviceOverrides::default());
        track(
            &backend,
            "shellyswitch25-c45bbe78.local/relay/0",
            DeviceState::OnOff { on: true },
        );

        let planned = backend.shared.plan_channels(
            "shellyswitch25-C45BBE78",
            "shellyswitch25-C45BBE78",
            "shellyswitch25-c45bbe78.local",
        );
        let keys: Vec<_> = planned.iter().map(|record| record.key.as_str()).collect();
        assert_eq!(keys, vec!["shellyswitch25-c45bbe78.local/relay/1"]);
    }

    #[test]
    fn should_apply_name_override_per_channel() {
        let mut overrides = DeviceOverrides::default();
        overrides.insert(
            "shellyswitch25-c45bbe78.local/relay/1",
            OverrideEntry {
                name: Some("Garage Door".to_string()),
                inside: None,
            },
        );
        let backend = backend_with(overrides);

        let planned = backend.shared.plan_channels(
            "shellyswitch25-C45BBE78",
            "shellyswitch25-C45BBE78",
            "shellyswitch25-c45bbe78.local",
        );
        assert_eq!(planned[0].name, "shellyswitch25-C45BBE78");
        assert_eq!(planned[1].name, "Garage Door");
    }

    #[test]
    fn should_refresh_last_seen_when_applying_status() {
        let backend = backend_with(DeviceOverrides::default());
        track(&backend, "host.local/relay/0", DeviceState::OnOff { on: false });
        let before = lock(&backend.shared.devices)
            .get(&"host.local/relay/0".into())
            .unwrap()
            .last_seen;

        let updated = backend
            .shared
            .apply_status(
                &"host.local/relay/0".into(),
                ChannelStatus {
                    ison: Some(true),
                    brightness: None,
                },
            )
            .unwrap();
        assert_eq!(updated.state.power(), Some(true));
        assert!(updated.last_seen >= before);
    }

    #[tokio::test]
    async fn should_fail_with_unknown_device_before_any_io() {
        let backend = backend_with(DeviceOverrides::default());
        let result = backend.set_power(&"nowhere.local/relay/0".into(), true).await;
        assert!(matches!(result, Err(BridgeError::UnknownDevice { .. })));
    }

    #[tokio::test]
    async fn should_reject_brightness_ops_on_relay_channel() {
        let backend = backend_with(DeviceOverrides::default());
        track(&backend, "host.local/relay/0", DeviceState::OnOff { on: false });

        let key: DeviceKey = "host.local/relay/0".into();
        assert!(matches!(
            backend.set_brightness(&key, 50).await,
            Err(BridgeError::Unsupported { operation, .. }) if operation == "set_brightness"
        ));
        assert!(matches!(
            backend.brightness(&key).await,
            Err(BridgeError::Unsupported { .. })
        ));
    }

    #[test]
    fn should_register_event_sink_only_for_tracked_channels() {
        let backend = backend_with(DeviceOverrides::default());
        let missing = backend.register_for_events(&"host.local/light/0".into(), RecordSink::discard());
        assert!(matches!(missing, Err(BridgeError::UnknownDevice { .. })));

        track(
            &backend,
            "host.local/light/0",
            DeviceState::Dimmer {
                on: false,
                brightness: 0.0,
            },
        );
        let registered =
            backend.register_for_events(&"host.local/light/0".into(), RecordSink::discard());
        assert!(registered.is_ok());
    }
}
