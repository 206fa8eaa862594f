//! # lanbridged — LAN device bridge daemon
//!
//! Composition root that wires every vendor backend into the device
//! registry and starts the control API server.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Install the tracing subscriber
//! - Load the device overrides file
//! - Construct the enabled backends and attach them to the registry
//! - Register the consumer callbacks
//! - Start discovery, bind a TCP port and serve
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use lanbridge_adapter_govee::GoveeBackend;
use lanbridge_adapter_http::router;
use lanbridge_adapter_probe::ProbeBackend;
use lanbridge_adapter_shelly::ShellyBackend;
use lanbridge_adapter_tempest::TempestBackend;
use lanbridge_adapter_wemo::WemoBackend;
use lanbridge_app::registry::DeviceRegistry;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.filter.as_str())
        .init();

    let overrides = config.load_overrides()?;
    if !overrides.is_empty() {
        tracing::info!(path = %config.overrides.path, "device overrides loaded");
    }

    // Backends
    let registry = DeviceRegistry::new();
    if config.wemo.enabled {
        registry.attach(Arc::new(WemoBackend::new(config.wemo.clone())?));
    }
    if config.shelly.enabled {
        registry.attach(Arc::new(ShellyBackend::new(
            config.shelly.clone(),
            overrides.clone(),
        )?));
    }
    if config.probe.enabled {
        registry.attach(Arc::new(ProbeBackend::new(
            config.probe.clone(),
            overrides.clone(),
        )?));
    }
    if config.tempest.enabled {
        registry.attach(Arc::new(TempestBackend::new(config.tempest.clone())));
    }
    if config.govee.enabled {
        registry.attach(Arc::new(GoveeBackend::new(config.govee.clone())?));
    }

    // Consumer callbacks
    registry.on_new_device(|device| {
        tracing::info!(device = %device.key(), kind = %device.kind(), "device bridged");
    });
    registry.on_device_updated(|device| {
        tracing::debug!(device = %device.key(), "device refreshed");
    });

    registry.start().await;

    // HTTP
    let app = router::build(registry);

    let bind_addr = config.bind_addr();
    tracing::info!(%bind_addr, "control API listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "cannot listen for the shutdown signal");
        // Keep serving rather than shutting down on a handler failure.
        std::future::pending::<()>().await;
    }
}
