//! Bridge error taxonomy shared by the registry and every backend.

use crate::key::DeviceKey;

/// Errors surfaced by registry and backend operations.
///
/// None of these are fatal: callers log, leave device state unchanged,
/// and carry on. Discovery-layer failures never reach this type — bad
/// candidates are skipped at the adapter with a log line.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The key is not present in the table the operation was routed to.
    #[error("{key} is not a known device")]
    UnknownDevice { key: DeviceKey },

    /// The device's kind does not support the attempted operation.
    #[error("{key} does not support {operation}")]
    Unsupported {
        key: DeviceKey,
        operation: &'static str,
    },

    /// Talking to the device failed: connection, HTTP status, or a
    /// malformed payload.
    #[error("transport failure: {detail}")]
    Transport {
        detail: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BridgeError {
    /// Unknown-device error for `key`.
    #[must_use]
    pub fn unknown(key: &DeviceKey) -> Self {
        Self::UnknownDevice { key: key.clone() }
    }

    /// Capability-mismatch error for `operation` on `key`.
    #[must_use]
    pub fn unsupported(key: &DeviceKey, operation: &'static str) -> Self {
        Self::Unsupported {
            key: key.clone(),
            operation,
        }
    }

    /// Transport error wrapping an underlying failure.
    pub fn transport(
        detail: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            detail: detail.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Transport error with no underlying cause worth keeping.
    pub fn transport_msg(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
            source: None,
        }
    }
}
