//! UPnP eventing: the NOTIFY listener and subscription upkeep.
//!
//! Devices push state changes as NOTIFY requests carrying a property set:
//!
//! ```text
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property>
//!     <BinaryState>1</BinaryState>
//!   </e:property>
//! </e:propertyset>
//! ```
//!
//! One listener serves every subscribed device; the `SID` header picks the
//! device out of [`SubscriptionTable`].

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::any;

use lanbridge_domain::key::DeviceKey;

use crate::client::DeviceClient;
use crate::error::WemoError;
use crate::soap;
use crate::{Shared, lock};

/// Pause before retrying a subscription the device refused.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(60);

/// State carried by one NOTIFY body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NotifyUpdate {
    pub power: Option<bool>,
    pub brightness: Option<f64>,
}

/// Read power and brightness properties out of a NOTIFY body. Properties
/// the body does not carry stay `None`.
pub(crate) fn parse_notify(body: &str) -> NotifyUpdate {
    let power = soap::extract_tag(body, "BinaryState")
        .and_then(soap::leading_number)
        .map(|value| value != 0);
    let brightness = soap::extract_tag(body, "Brightness")
        .or_else(|| soap::extract_tag(body, "brightness"))
        .and_then(|raw| raw.trim().parse::<f64>().ok());
    NotifyUpdate { power, brightness }
}

/// Maps subscription identifiers handed out by devices to device keys.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTable {
    by_sid: Mutex<HashMap<String, DeviceKey>>,
}

impl SubscriptionTable {
    pub fn insert(&self, sid: impl Into<String>, key: DeviceKey) {
        lock(&self.by_sid).insert(sid.into(), key);
    }

    pub fn key_for(&self, sid: &str) -> Option<DeviceKey> {
        lock(&self.by_sid).get(sid).cloned()
    }

    pub fn forget(&self, sid: &str) {
        lock(&self.by_sid).remove(sid);
    }
}

/// Bind the NOTIFY listener and serve it in the background. Returns the
/// bound address so callers can build callback URLs.
pub(crate) async fn start_listener(shared: &Arc<Shared>) -> Result<SocketAddr, WemoError> {
    let port = shared.config.notify_port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|source| WemoError::Listener { port, source })?;
    let local = listener
        .local_addr()
        .map_err(|source| WemoError::Listener { port, source })?;
    let router = notify_router(Arc::clone(shared));
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!(%err, "NOTIFY listener exited");
        }
    });
    tracing::info!(%local, "NOTIFY listener ready");
    Ok(local)
}

pub(crate) fn notify_router(shared: Arc<Shared>) -> Router {
    Router::new()
        .route("/notify", any(handle_notify))
        .with_state(shared)
}

async fn handle_notify(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let sid = headers
        .get("SID")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let Some(key) = shared.subscriptions.key_for(sid) else {
        tracing::debug!(sid, "NOTIFY for an unknown subscription acknowledged");
        return StatusCode::OK;
    };
    let update = parse_notify(&body);
    if update.power.is_none() && update.brightness.is_none() {
        tracing::debug!(device = %key, "NOTIFY carried no readable properties");
        return StatusCode::OK;
    }
    let updated = shared.apply_event(&key, &update);
    let sink = shared.sink_for(&key);
    if let (Some(record), Some(sink)) = (updated, sink) {
        sink.send(record);
    }
    StatusCode::OK
}

/// Keep one device's subscription alive: subscribe, renew at half the
/// granted timeout, start over when the device refuses a renewal.
pub(crate) async fn maintain_subscription(
    shared: Arc<Shared>,
    key: DeviceKey,
    client: DeviceClient,
    callback: String,
) {
    loop {
        let subscription = match client.subscribe(&callback).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!(%err, device = %key, "event subscription failed");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                continue;
            }
        };
        tracing::info!(device = %key, sid = %subscription.sid, "subscribed for event pushes");
        shared
            .subscriptions
            .insert(subscription.sid.clone(), key.clone());
        let mut granted = subscription.timeout;
        loop {
            tokio::time::sleep(granted / 2).await;
            match client.renew(&subscription.sid).await {
                Ok(next) => granted = next,
                Err(err) => {
                    tracing::warn!(%err, device = %key, "subscription renewal refused");
                    shared.subscriptions.forget(&subscription.sid);
                    break;
                }
            }
        }
    }
}

/// Local address the OS routes through to reach `host`. Binding and
/// connecting a UDP socket picks the route without sending anything.
pub(crate) fn local_ip_facing(host: &str) -> Result<IpAddr, WemoError> {
    let probe = std::net::UdpSocket::bind(("0.0.0.0", 0)).map_err(|source| {
        WemoError::LocalAddress {
            host: host.to_string(),
            source,
        }
    })?;
    probe
        .connect((host, 9))
        .map_err(|source| WemoError::LocalAddress {
            host: host.to_string(),
            source,
        })?;
    let local = probe.local_addr().map_err(|source| WemoError::LocalAddress {
        host: host.to_string(),
        source,
    })?;
    Ok(local.ip())
}
