//! Axum router assembly and control-API handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use lanbridge_app::registry::{BridgedDevice, DeviceRegistry};
use lanbridge_domain::key::DeviceKey;
use lanbridge_domain::record::DeviceRecord;

use crate::error::ApiError;

/// Build the top-level axum [`Router`].
///
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem.
pub fn build(registry: DeviceRegistry) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/devices", get(list_devices))
        .route("/power", post(set_power))
        .route("/brightness", post(set_brightness))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn health_check() -> &'static str {
    "ok"
}

/// Snapshot of every bridged device, ordered by key.
async fn list_devices(State(registry): State<DeviceRegistry>) -> Json<Vec<DeviceRecord>> {
    let records = registry
        .devices()
        .iter()
        .map(BridgedDevice::snapshot)
        .collect();
    Json(records)
}

#[derive(Debug, Deserialize)]
struct PowerParams {
    device: String,
    on: bool,
}

async fn set_power(
    State(registry): State<DeviceRegistry>,
    Query(params): Query<PowerParams>,
) -> Result<StatusCode, ApiError> {
    let key = DeviceKey::from(params.device);
    registry.set_state(&key, params.on).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct BrightnessParams {
    device: String,
    percent: u8,
}

async fn set_brightness(
    State(registry): State<DeviceRegistry>,
    Query(params): Query<BrightnessParams>,
) -> Result<StatusCode, ApiError> {
    if params.percent > 100 {
        return Err(ApiError::BadRequest(format!(
            "percent must be 0-100, got {}",
            params.percent
        )));
    }
    let key = DeviceKey::from(params.device);
    registry.set_brightness(&key, params.percent).await?;
    Ok(StatusCode::NO_CONTENT)
}
