//! Device registry — deduplication, wrapping, seeding, and the
//! single-consumer callback contract.
//!
//! Backends feed discoveries through per-backend sinks into one ingest
//! task. That single task serializes populate-and-announce, so a key can
//! never be announced twice and the new-device callback fires exactly
//! once per key. Update events bypass the ingest task: they are applied
//! synchronously on the emitting backend's task, preserving per-device
//! ordering.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::{DeviceKind, DeviceRecord};

use crate::ports::backend::{DeviceBackend, RecordSink};

/// Consumer callback receiving wrapped device handles.
pub type DeviceCallback = Arc<dyn Fn(BridgedDevice) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A discovery tagged with the backend that produced it.
struct Discovery {
    backend: Arc<dyn DeviceBackend>,
    record: DeviceRecord,
}

/// The externally visible wrapped record: a shared snapshot plus bound
/// control operations routed to the owning backend.
///
/// Handles are cheap clones over shared state — a handle obtained from
/// the new-device callback keeps reflecting later updates without a
/// re-lookup. Capability checks happen here against the record kind
/// before any backend round-trip; backends enforce them again.
#[derive(Clone)]
pub struct BridgedDevice {
    key: DeviceKey,
    record: Arc<Mutex<DeviceRecord>>,
    backend: Arc<dyn DeviceBackend>,
    updates: RecordSink,
}

impl BridgedDevice {
    fn wrap(record: DeviceRecord, backend: Arc<dyn DeviceBackend>, updates: RecordSink) -> Self {
        Self {
            key: record.key.clone(),
            record: Arc::new(Mutex::new(record)),
            backend,
            updates,
        }
    }

    /// The device key.
    #[must_use]
    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    /// The kind tag, fixed at creation.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        lock(&self.record).kind()
    }

    /// A copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> DeviceRecord {
        lock(&self.record).clone()
    }

    fn absorb(&self, incoming: &DeviceRecord) -> bool {
        lock(&self.record).absorb(incoming)
    }

    /// Switch the device on or off.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unsupported`] for non-switchable kinds, plus
    /// whatever the backend reports.
    pub async fn set_power(&self, on: bool) -> Result<(), BridgeError> {
        if !self.kind().is_switchable() {
            return Err(BridgeError::unsupported(&self.key, "set_power"));
        }
        self.backend.set_power(&self.key, on).await
    }

    /// Switch the device on.
    ///
    /// # Errors
    ///
    /// See [`set_power`](Self::set_power).
    pub async fn turn_on(&self) -> Result<(), BridgeError> {
        self.set_power(true).await
    }

    /// Switch the device off.
    ///
    /// # Errors
    ///
    /// See [`set_power`](Self::set_power).
    pub async fn turn_off(&self) -> Result<(), BridgeError> {
        self.set_power(false).await
    }

    /// Set brightness percent (0–100).
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unsupported`] unless the device is a dimmer, plus
    /// whatever the backend reports.
    pub async fn set_brightness(&self, percent: u8) -> Result<(), BridgeError> {
        if !self.kind().is_dimmable() {
            return Err(BridgeError::unsupported(&self.key, "set_brightness"));
        }
        self.backend.set_brightness(&self.key, percent).await
    }

    /// Fetch current brightness percent.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unsupported`] unless the device is a dimmer, plus
    /// whatever the backend reports.
    pub async fn brightness(&self) -> Result<f64, BridgeError> {
        if !self.kind().is_dimmable() {
            return Err(BridgeError::unsupported(&self.key, "brightness"));
        }
        self.backend.brightness(&self.key).await
    }

    /// Ask the owning backend for fresh state. Results land through the
    /// registry's update path like any other event.
    ///
    /// # Errors
    ///
    /// Whatever the backend's read reports.
    pub async fn refresh(&self) -> Result<(), BridgeError> {
        self.backend
            .read_state(&self.key, self.updates.clone())
            .await
    }
}

impl fmt::Debug for BridgedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgedDevice")
            .field("key", &self.key)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

struct RegistryInner {
    backends: Mutex<Vec<Arc<dyn DeviceBackend>>>,
    devices: Mutex<HashMap<DeviceKey, BridgedDevice>>,
    discovery_tx: mpsc::UnboundedSender<Discovery>,
    discovery_rx: Mutex<Option<mpsc::UnboundedReceiver<Discovery>>>,
    on_new: Mutex<Option<DeviceCallback>>,
    on_update: Mutex<Option<DeviceCallback>>,
    started: AtomicBool,
}

/// The bridge core: one table of wrapped records fed by every attached
/// backend, exposed to a single downstream consumer.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (discovery_tx, discovery_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(RegistryInner {
                backends: Mutex::new(Vec::new()),
                devices: Mutex::new(HashMap::new()),
                discovery_tx,
                discovery_rx: Mutex::new(Some(discovery_rx)),
                on_new: Mutex::new(None),
                on_update: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Attach a backend. Call before [`start`](Self::start); backends
    /// attached later are never started.
    pub fn attach(&self, backend: Arc<dyn DeviceBackend>) {
        lock(&self.inner.backends).push(backend);
    }

    /// Register the new-device callback. One slot, last registration
    /// wins.
    pub fn on_new_device(&self, callback: impl Fn(BridgedDevice) + Send + Sync + 'static) {
        *lock(&self.inner.on_new) = Some(Arc::new(callback));
    }

    /// Register the device-updated callback. One slot, last registration
    /// wins.
    pub fn on_device_updated(&self, callback: impl Fn(BridgedDevice) + Send + Sync + 'static) {
        *lock(&self.inner.on_update) = Some(Arc::new(callback));
    }

    /// Start the ingest task and every attached backend.
    ///
    /// Idempotent: calling again is a no-op, so discovery subscriptions
    /// are never duplicated. Backend start failures are logged, never
    /// propagated — one broken transport must not take the bridge down.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("registry already started");
            return;
        }

        let receiver = lock(&self.inner.discovery_rx).take();
        if let Some(receiver) = receiver {
            tokio::spawn(ingest_loop(Arc::clone(&self.inner), receiver));
        }

        let backends: Vec<_> = lock(&self.inner.backends).clone();
        for backend in backends {
            let sink = self.discovery_sink(Arc::clone(&backend));
            match backend.start(sink).await {
                Ok(()) => tracing::info!(backend = backend.name(), "backend started"),
                Err(err) => {
                    tracing::error!(%err, backend = backend.name(), "backend failed to start");
                }
            }
        }
    }

    fn discovery_sink(&self, backend: Arc<dyn DeviceBackend>) -> RecordSink {
        let tx = self.inner.discovery_tx.clone();
        RecordSink::new(move |record| {
            // Send fails only once the ingest task is gone.
            let _ = tx.send(Discovery {
                backend: Arc::clone(&backend),
                record,
            });
        })
    }

    /// Look up one wrapped record.
    #[must_use]
    pub fn device(&self, key: &DeviceKey) -> Option<BridgedDevice> {
        lock(&self.inner.devices).get(key).cloned()
    }

    /// All wrapped records, ordered by key.
    #[must_use]
    pub fn devices(&self) -> Vec<BridgedDevice> {
        let mut devices: Vec<_> = lock(&self.inner.devices).values().cloned().collect();
        devices.sort_by(|a, b| a.key().cmp(b.key()));
        devices
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.devices).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.devices).is_empty()
    }

    /// Consumer-facing power routing.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`] for unregistered keys, otherwise
    /// whatever [`BridgedDevice::set_power`] reports.
    pub async fn set_state(&self, key: &DeviceKey, on: bool) -> Result<(), BridgeError> {
        let device = self.device(key).ok_or_else(|| BridgeError::unknown(key))?;
        device.set_power(on).await
    }

    /// Consumer-facing brightness routing.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`] for unregistered keys, otherwise
    /// whatever [`BridgedDevice::set_brightness`] reports.
    pub async fn set_brightness(&self, key: &DeviceKey, percent: u8) -> Result<(), BridgeError> {
        let device = self.device(key).ok_or_else(|| BridgeError::unknown(key))?;
        device.set_brightness(percent).await
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.len())
            .finish_non_exhaustive()
    }
}

async fn ingest_loop(inner: Arc<RegistryInner>, mut receiver: mpsc::UnboundedReceiver<Discovery>) {
    while let Some(discovery) = receiver.recv().await {
        populate(&inner, discovery).await;
    }
}

/// Wrap, register, seed, then announce — in that order, on the single
/// ingest task.
async fn populate(inner: &Arc<RegistryInner>, discovery: Discovery) {
    let Discovery { backend, record } = discovery;
    let key = record.key.clone();

    let existing = lock(&inner.devices).contains_key(&key);
    if existing {
        // Rediscovery of a known key reconciles state instead of
        // creating a duplicate; the new-device callback never re-fires.
        tracing::debug!(device = %key, backend = backend.name(), "rediscovered known device");
        apply_update(inner, record);
        return;
    }

    let updates = routing_sink(inner);
    let device = BridgedDevice::wrap(record, Arc::clone(&backend), updates.clone());
    lock(&inner.devices).insert(key.clone(), device.clone());

    if let Err(err) = backend.register_for_events(&key, updates.clone()) {
        tracing::warn!(%err, device = %key, "event registration failed");
    }

    // Seed freshness before announcing. Emitted records flow through the
    // routing sink, so the update callback may fire before the new-device
    // callback for this key.
    if let Err(err) = backend.read_state(&key, updates).await {
        tracing::warn!(%err, device = %key, "seed read failed");
    }

    tracing::info!(
        device = %key,
        kind = %device.kind(),
        backend = backend.name(),
        "device registered"
    );

    let callback = lock(&inner.on_new).clone();
    if let Some(callback) = callback {
        callback(device);
    }
}

/// Sink that folds emitted records into the table and fires the update
/// callback. Holds a weak reference so wrapped records don't keep the
/// registry alive through their own sink.
fn routing_sink(inner: &Arc<RegistryInner>) -> RecordSink {
    let weak = Arc::downgrade(inner);
    RecordSink::new(move |record| {
        if let Some(inner) = Weak::upgrade(&weak) {
            apply_update(&inner, record);
        }
    })
}

fn apply_update(inner: &Arc<RegistryInner>, record: DeviceRecord) {
    let device = lock(&inner.devices).get(&record.key).cloned();
    let Some(device) = device else {
        // Backends may report siblings that never got registered.
        tracing::debug!(device = %record.key, "update for unregistered key dropped");
        return;
    };

    if !device.absorb(&record) {
        tracing::warn!(
            device = %record.key,
            expected = %device.kind(),
            got = %record.kind(),
            "update with mismatched kind ignored"
        );
    }

    let callback = lock(&inner.on_update).clone();
    if let Some(callback) = callback {
        callback(device);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use lanbridge_domain::record::DeviceState;

    use super::*;

    /// In-memory backend fake: discoveries and events are driven by the
    /// test through the captured sinks.
    struct FakeBackend {
        name: &'static str,
        records: Mutex<HashMap<DeviceKey, DeviceRecord>>,
        sinks: Mutex<HashMap<DeviceKey, RecordSink>>,
        discoveries: Mutex<Option<RecordSink>>,
        commands: Mutex<Vec<String>>,
        start_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                records: Mutex::new(HashMap::new()),
                sinks: Mutex::new(HashMap::new()),
                discoveries: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
                start_calls: AtomicUsize::new(0),
            })
        }

        fn discover(&self, record: DeviceRecord) {
            lock(&self.records).insert(record.key.clone(), record.clone());
            let sink = lock(&self.discoveries).clone();
            sink.expect("backend not started").send(record);
        }

        fn emit_update(&self, record: DeviceRecord) {
            let sink = lock(&self.sinks).get(&record.key).cloned();
            sink.expect("no sink registered").send(record);
        }

        fn commands(&self) -> Vec<String> {
            lock(&self.commands).clone()
        }
    }

    #[async_trait]
    impl DeviceBackend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            *lock(&self.discoveries) = Some(discoveries);
            Ok(())
        }

        fn register_for_events(
            &self,
            key: &DeviceKey,
            sink: RecordSink,
        ) -> Result<(), BridgeError> {
            if !lock(&self.records).contains_key(key) {
                return Err(BridgeError::unknown(key));
            }
            lock(&self.sinks).insert(key.clone(), sink);
            Ok(())
        }

        async fn set_power(&self, key: &DeviceKey, on: bool) -> Result<(), BridgeError> {
            let record = lock(&self.records)
                .get(key)
                .cloned()
                .ok_or_else(|| BridgeError::unknown(key))?;
            if !record.kind().is_switchable() {
                return Err(BridgeError::unsupported(key, "set_power"));
            }
            lock(&self.commands).push(format!("{key}:power={on}"));
            Ok(())
        }

        async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
            let record = lock(&self.records)
                .get(key)
                .cloned()
                .ok_or_else(|| BridgeError::unknown(key))?;
            sink.send(record);
            Ok(())
        }

        async fn set_brightness(&self, key: &DeviceKey, percent: u8) -> Result<(), BridgeError> {
            lock(&self.commands).push(format!("{key}:brightness={percent}"));
            Ok(())
        }

        async fn brightness(&self, key: &DeviceKey) -> Result<f64, BridgeError> {
            let record = lock(&self.records)
                .get(key)
                .cloned()
                .ok_or_else(|| BridgeError::unknown(key))?;
            Ok(record.state.brightness().unwrap_or(0.0))
        }
    }

    fn relay(key: &str) -> DeviceRecord {
        DeviceRecord::new(key, "relay", DeviceState::OnOff { on: false })
    }

    fn thermometer(key: &str, celsius: f64) -> DeviceRecord {
        DeviceRecord::new(key, "thermometer", DeviceState::Thermometer { celsius })
    }

    async fn wait_until(check: impl Fn() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    fn event_log(registry: &DeviceRegistry) -> Arc<Mutex<Vec<String>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            registry.on_new_device(move |device| {
                lock(&events).push(format!("new:{}", device.key()));
            });
        }
        {
            let events = Arc::clone(&events);
            registry.on_device_updated(move |device| {
                lock(&events).push(format!("update:{}", device.key()));
            });
        }
        events
    }

    #[tokio::test]
    async fn should_register_discovered_device_and_announce_once() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        let events = event_log(&registry);
        registry.start().await;

        backend.discover(relay("192.168.1.40"));
        wait_until(|| registry.len() == 1).await;

        let device = registry.device(&"192.168.1.40".into()).unwrap();
        assert_eq!(device.kind(), DeviceKind::OnOff);
        // Seed read republished the cached record before the announce.
        assert_eq!(
            lock(&events).as_slice(),
            &["update:192.168.1.40", "new:192.168.1.40"]
        );
    }

    #[tokio::test]
    async fn should_deduplicate_discoveries_with_same_key() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        let events = event_log(&registry);
        registry.start().await;

        backend.discover(relay("192.168.1.40"));
        backend.discover(relay("192.168.1.40"));
        wait_until(|| lock(&events).len() >= 3).await;

        assert_eq!(registry.len(), 1);
        let news = lock(&events)
            .iter()
            .filter(|event| event.starts_with("new:"))
            .count();
        assert_eq!(news, 1);
    }

    #[tokio::test]
    async fn should_ignore_second_start() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        registry.start().await;
        registry.start().await;

        assert_eq!(backend.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_reflect_updates_through_previously_obtained_handle() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());

        let handle: Arc<Mutex<Option<BridgedDevice>>> = Arc::new(Mutex::new(None));
        {
            let handle = Arc::clone(&handle);
            registry.on_new_device(move |device| {
                *lock(&handle) = Some(device);
            });
        }
        registry.start().await;

        backend.discover(thermometer("192.168.1.77/0", 10.0));
        wait_until(|| lock(&handle).is_some()).await;
        let device = lock(&handle).clone().unwrap();
        assert_eq!(device.snapshot().state.reading(), Some(10.0));

        backend.emit_update(thermometer("192.168.1.77/0", 21.5));
        assert_eq!(device.snapshot().state.reading(), Some(21.5));
        assert_eq!(device.snapshot().name, "thermometer");
    }

    #[tokio::test]
    async fn should_fail_with_unknown_device_for_unregistered_key() {
        let registry = DeviceRegistry::new();
        let result = registry.set_state(&"nope".into(), true).await;
        assert!(matches!(result, Err(BridgeError::UnknownDevice { key }) if key.as_str() == "nope"));
    }

    #[tokio::test]
    async fn should_reject_capability_mismatches_without_backend_roundtrip() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        registry.start().await;

        backend.discover(relay("relay-host"));
        backend.discover(thermometer("sensor-host/0", 10.0));
        wait_until(|| registry.len() == 2).await;

        let relay = registry.device(&"relay-host".into()).unwrap();
        let sensor = registry.device(&"sensor-host/0".into()).unwrap();

        assert!(matches!(
            relay.set_brightness(50).await,
            Err(BridgeError::Unsupported { operation, .. }) if operation == "set_brightness"
        ));
        assert!(matches!(
            sensor.set_power(true).await,
            Err(BridgeError::Unsupported { operation, .. }) if operation == "set_power"
        ));
        assert!(matches!(
            sensor.brightness().await,
            Err(BridgeError::Unsupported { .. })
        ));
        assert!(backend.commands().is_empty());
    }

    #[tokio::test]
    async fn should_route_commands_to_owning_backend() {
        let registry = DeviceRegistry::new();
        let first = FakeBackend::new("first");
        let second = FakeBackend::new("second");
        registry.attach(first.clone());
        registry.attach(second.clone());
        registry.start().await;

        first.discover(relay("host-a"));
        second.discover(relay("host-b"));
        wait_until(|| registry.len() == 2).await;

        registry.set_state(&"host-b".into(), true).await.unwrap();

        assert!(first.commands().is_empty());
        assert_eq!(second.commands(), vec!["host-b:power=true".to_string()]);
    }

    #[tokio::test]
    async fn should_drop_updates_for_unregistered_keys() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        let events = event_log(&registry);
        registry.start().await;

        backend.discover(thermometer("host/0", 10.0));
        wait_until(|| registry.len() == 1).await;
        lock(&events).clear();

        // Sibling line that never got its own discovery.
        let sink = lock(&backend.sinks).get(&"host/0".into()).cloned().unwrap();
        sink.send(thermometer("host/3", 12.0));

        assert_eq!(registry.len(), 1);
        assert!(lock(&events).is_empty());
    }

    #[tokio::test]
    async fn should_keep_kind_when_update_reports_another() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        registry.start().await;

        backend.discover(thermometer("host/0", 10.0));
        wait_until(|| registry.len() == 1).await;

        backend.emit_update(DeviceRecord::new(
            "host/0",
            "now humid",
            DeviceState::Humidity { percent: 50.0 },
        ));

        let device = registry.device(&"host/0".into()).unwrap();
        assert_eq!(device.kind(), DeviceKind::Thermometer);
        assert_eq!(device.snapshot().state.reading(), Some(10.0));
    }

    #[tokio::test]
    async fn should_fire_update_for_every_republish() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        let events = event_log(&registry);
        registry.start().await;

        backend.discover(relay("host"));
        wait_until(|| registry.len() == 1).await;
        lock(&events).clear();

        // Same state twice — polls republish without change detection.
        backend.emit_update(relay("host"));
        backend.emit_update(relay("host"));

        assert_eq!(lock(&events).as_slice(), &["update:host", "update:host"]);
    }

    #[tokio::test]
    async fn should_let_last_callback_registration_win() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());

        let first = Arc::new(Mutex::new(0_u32));
        let second = Arc::new(Mutex::new(0_u32));
        {
            let first = Arc::clone(&first);
            registry.on_new_device(move |_| *lock(&first) += 1);
        }
        {
            let second = Arc::clone(&second);
            registry.on_new_device(move |_| *lock(&second) += 1);
        }
        registry.start().await;

        backend.discover(relay("host"));
        wait_until(|| registry.len() == 1).await;

        assert_eq!(*lock(&first), 0);
        assert_eq!(*lock(&second), 1);
    }

    #[tokio::test]
    async fn should_list_devices_ordered_by_key() {
        let registry = DeviceRegistry::new();
        let backend = FakeBackend::new("fake");
        registry.attach(backend.clone());
        registry.start().await;

        backend.discover(relay("b-host"));
        backend.discover(relay("a-host"));
        wait_until(|| registry.len() == 2).await;

        let keys: Vec<_> = registry
            .devices()
            .iter()
            .map(|device| device.key().to_string())
            .collect();
        assert_eq!(keys, vec!["a-host".to_string(), "b-host".to_string()]);
    }
}
