//! # lanbridge-adapter-probe
//!
//! Temperature-probe backend — read-only sensor hosts that serve a CSV
//! report over HTTP, one line per sensor.
//!
//! ## How it works
//!
//! Hosts advertise `_http._tcp` services and are matched by instance
//! name. A host contributes as many devices as its report has usable
//! lines, keyed `{ipv4}/{line-index}`. All of a host's lines share one
//! event sink; a poll task re-fetches every host's report on a fixed
//! period and republishes each line. The family is read-only: power and
//! brightness operations always fail as unsupported.
//!
//! ## Dependency rule
//!
//! Depends on `lanbridge-app` (port + scan cycle) and `lanbridge-domain`.

mod config;
pub mod report;

pub use config::ProbeConfig;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use lanbridge_app::ports::backend::{DeviceBackend, RecordSink};
use lanbridge_app::scan::{ScanCycle, ScanPhase};
use lanbridge_domain::error::BridgeError;
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::overrides::DeviceOverrides;
use lanbridge_domain::record::DeviceRecord;

const HTTP_SERVICE: &str = "_http._tcp.local.";
const REPORT_PATH: &str = "cgi-bin/state.cgi";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend for the CSV temperature-probe family.
pub struct ProbeBackend {
    shared: Arc<Shared>,
}

/// Per-host bookkeeping. Records are per line, but the transport unit is
/// the host: one fetch refreshes every line, and one sink slot serves
/// them all.
#[derive(Clone)]
struct ProbeHost {
    name: String,
    inside: Option<bool>,
    sink: Option<RecordSink>,
}

struct Shared {
    config: ProbeConfig,
    overrides: DeviceOverrides,
    http: reqwest::Client,
    hosts: Mutex<HashMap<String, ProbeHost>>,
}

impl ProbeBackend {
    /// Build the backend.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: ProbeConfig, overrides: DeviceOverrides) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| BridgeError::transport("building HTTP client", err))?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                overrides,
                http,
                hosts: Mutex::new(HashMap::new()),
            }),
        })
    }
}

#[async_trait]
impl DeviceBackend for ProbeBackend {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn start(&self, discoveries: RecordSink) -> Result<(), BridgeError> {
        tokio::spawn(browse_loop(Arc::clone(&self.shared), discoveries.clone()));
        tokio::spawn(poll_loop(Arc::clone(&self.shared), discoveries));
        Ok(())
    }

    fn register_for_events(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        let host = key.host().ok_or_else(|| BridgeError::unknown(key))?;
        let mut hosts = lock(&self.shared.hosts);
        // Line existence is not checked: any index under a tracked host
        // routes to the host's single slot.
        let state = hosts.get_mut(host).ok_or_else(|| BridgeError::unknown(key))?;
        state.sink = Some(sink);
        Ok(())
    }

    async fn set_power(&self, key: &DeviceKey, _on: bool) -> Result<(), BridgeError> {
        Err(BridgeError::unsupported(key, "set_power"))
    }

    async fn read_state(&self, key: &DeviceKey, sink: RecordSink) -> Result<(), BridgeError> {
        let host = key
            .host()
            .ok_or_else(|| BridgeError::unknown(key))?
            .to_string();
        let known = lock(&self.shared.hosts).contains_key(&host);
        if !known {
            return Err(BridgeError::unknown(key));
        }
        // The report is per host; every line it yields goes out, not just
        // the requested key.
        for record in self.shared.fetch_report(&host).await? {
            sink.send(record);
        }
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
    /// Track a host if it is new. Returns `false` for hosts already seen.
    fn track_host(&self, instance: &str, host: &str) -> bool {
        let mut hosts = lock(&self.hosts);
        if hosts.contains_key(host) {
            tracing::debug!(host, "probe host already tracked");
            return false;
        }
        let inside = self.overrides.inside_for_host(host);
        hosts.insert(
            host.to_string(),
            ProbeHost {
                name: instance.to_string(),
                inside,
                sink: None,
            },
        );
        tracing::info!(host, name = instance, inside = ?inside, "probe host discovered");
        true
    }

    async fn fetch_report(&self, host: &str) -> Result<Vec<DeviceRecord>, BridgeError> {
        let url = format!("http://{host}/{REPORT_PATH}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| BridgeError::transport(format!("GET {url}"), err))?;
        let body = response
            .text()
            .await
            .map_err(|err| BridgeError::transport(format!("reading {url}"), err))?;
        Ok(report::parse_report(host, &body))
    }
}

async fn browse_loop(shared: Arc<Shared>, discoveries: RecordSink) {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(err) => {
            tracing::error!(%err, "mDNS daemon unavailable, probe discovery disabled");
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

async fn handle_resolved(shared: &Arc<Shared>, info: &ServiceInfo, discoveries: &RecordSink) {
    let instance = info.get_fullname().split('.').next().unwrap_or_default();
    if !instance.contains(&shared.config.name_filter) {
        tracing::debug!(instance, "service skipped by name filter");
        return;
    }
    let Some(ipv4) = info.get_addresses().iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    }) else {
        tracing::debug!(instance, "candidate without an IPv4 address skipped");
        return;
    };

    let host = ipv4.to_string();
    if !shared.track_host(instance, &host) {
        return;
    }

    // Seed: every usable report line becomes a discovery.
    match shared.fetch_report(&host).await {
        Ok(records) => {
            for record in records {
                discoveries.send(record);
            }
        }
        Err(err) => tracing::warn!(%err, host = %host, "seed report fetch failed"),
    }
}

async fn poll_loop(shared: Arc<Shared>, discoveries: RecordSink) {
    let mut ticker = tokio::time::interval(shared.config.poll_period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Discovery already seeded; skip the immediate first tick.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        poll_once(&shared, &discoveries).await;
    }
}

async fn poll_once(shared: &Arc<Shared>, discoveries: &RecordSink) {
    let hosts: Vec<String> = lock(&shared.hosts).keys().cloned().collect();
    for host in hosts {
        match shared.fetch_report(&host).await {
            Ok(records) => {
                let state = lock(&shared.hosts).get(&host).cloned();
                let Some(state) = state else { continue };
                tracing::debug!(
                    host = %host,
                    name = %state.name,
                    inside = ?state.inside,
                    lines = records.len(),
                    "report polled"
                );
                for record in records {
                    match &state.sink {
                        Some(sink) => sink.send(record),
                        // No sink yet (seed fetch failed at discovery):
                        // route through discovery so the lines still get
                        // announced.
                        None => discoveries.send(record),
                    }
                }
            }
            Err(err) => tracing::warn!(%err, host = %host, "report poll failed"),
        }
    }
}
