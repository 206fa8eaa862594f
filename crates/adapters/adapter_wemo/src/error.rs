//! Wemo adapter errors.

use lanbridge_domain::error::BridgeError;

/// Failures raised while driving a Wemo device over UPnP.
#[derive(Debug, thiserror::Error)]
pub enum WemoError {
    /// A SOAP control call could not be completed.
    #[error("SOAP {action} against {url} failed")]
    Soap {
        action: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The device answered a control call with an unusable body.
    #[error("malformed {action} response: {detail}")]
    Response {
        action: &'static str,
        detail: String,
    },

    /// An event subscription could not be established or renewed.
    #[error("event subscription with {url} failed")]
    Subscribe {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The subscription response is missing a GENA header.
    #[error("subscription response from {url} lacks a {header} header")]
    SubscriptionHeader {
        url: String,
        header: &'static str,
    },

    /// No local address faces the device, so no callback URL can be built.
    #[error("no local address facing {host}")]
    LocalAddress {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The NOTIFY listener socket could not be bound.
    #[error("NOTIFY listener failed to bind port {port}")]
    Listener {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl WemoError {
    /// Convert into the domain error shared by every backend.
    #[must_use]
    pub fn into_domain(self) -> BridgeError {
        let detail = self.to_string();
        BridgeError::transport(detail, self)
    }
}

impl From<WemoError> for BridgeError {
    fn from(err: WemoError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_render_listener_bind_failure() {
        let err = WemoError::Listener {
            port: 49152,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(err.to_string(), "NOTIFY listener failed to bind port 49152");
    }

    #[test]
    fn should_convert_into_transport_error() {
        let err = WemoError::Response {
            action: "GetBinaryState",
            detail: "missing BinaryState".to_string(),
        };
        let domain: BridgeError = err.into();
        assert!(matches!(domain, BridgeError::Transport { .. }));
        assert!(domain.to_string().contains("GetBinaryState"));
    }

    #[test]
    fn should_keep_bind_error_as_source() {
        let err = WemoError::Listener {
            port: 0,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let domain = err.into_domain();
        assert!(std::error::Error::source(&domain).is_some());
    }
}
