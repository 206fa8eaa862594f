//! Telemetry frame parsing for the station's UDP broadcasts.
//!
//! Pure functions over raw datagram bytes. The station pushes several
//! frame types (`rapid_wind`, `hub_status`, ...); only `obs_st`
//! observation frames carry the cells the bridge consumes:
//!
//! | `obs[0]` index | Cell |
//! |----------------|------|
//! | 7 | air temperature, °C |
//! | 8 | relative humidity, % |
//!
//! Cells are nullable on the wire; a null or missing cell simply yields
//! nothing for that sensor.

use serde::Deserialize;

/// Raw frame shape: a type tag plus observation rows.
#[derive(Debug, Deserialize)]
struct TelemetryFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    obs: Vec<Vec<Option<f64>>>,
}

/// The cells of one observation the bridge cares about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl Observation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }
}

/// Parse a datagram. `Ok(None)` means a well-formed frame of a type the
/// bridge does not consume (or one without observation rows).
///
/// # Errors
///
/// The JSON error for malformed payloads, so the caller can log it.
pub fn parse_frame(payload: &[u8]) -> Result<Option<Observation>, serde_json::Error> {
    let frame: TelemetryFrame = serde_json::from_slice(payload)?;
    if frame.kind != "obs_st" {
        return Ok(None);
    }
    let Some(row) = frame.obs.first() else {
        return Ok(None);
    };
    Ok(Some(Observation {
        temperature: row.get(7).copied().flatten(),
        humidity: row.get(8).copied().flatten(),
    }))
}
