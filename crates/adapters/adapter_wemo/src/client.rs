//! Per-device UPnP client: SOAP control calls and GENA subscriptions.

use std::time::Duration;

use reqwest::Method;

use crate::error::WemoError;
use crate::soap;

/// Subscription length requested from the device; the grant may differ.
pub(crate) const DEFAULT_GRANT_SECS: u64 = 300;

/// What a `GetBinaryState` round-trip reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BinaryStateReport {
    pub power: bool,
    /// Dimming level; plain switches never report one.
    pub brightness: Option<f64>,
}

/// An established GENA subscription.
#[derive(Debug, Clone)]
pub(crate) struct Subscription {
    pub sid: String,
    pub timeout: Duration,
}

/// Control and event endpoints of one discovered device.
#[derive(Debug, Clone)]
pub(crate) struct DeviceClient {
    http: reqwest::Client,
    host: String,
    port: u16,
}

impl DeviceClient {
    pub fn new(http: reqwest::Client, host: impl Into<String>, port: u16) -> Self {
        Self {
            http,
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn control_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, soap::CONTROL_PATH)
    }

    fn event_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, soap::EVENT_PATH)
    }

    /// POST one control envelope and hand back the raw response body.
    async fn call(
        &self,
        action: &'static str,
        arguments: &[(&str, &str)],
    ) -> Result<String, WemoError> {
        let url = self.control_url();
        let envelope = soap::build_envelope(action, arguments);
        let response = self
            .http
            .post(&url)
            .header("SOAPACTION", soap::action_header(action))
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
            .body(envelope)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| WemoError::Soap {
                action,
                url: url.clone(),
                source,
            })?;
        response
            .text()
            .await
            .map_err(|source| WemoError::Soap { action, url, source })
    }

    /// Fresh reading of power (and brightness, when the firmware reports one).
    pub async fn get_binary_state(&self) -> Result<BinaryStateReport, WemoError> {
        let body = self.call("GetBinaryState", &[]).await?;
        parse_binary_state(&body)
    }

    pub async fn set_binary_state(&self, on: bool) -> Result<(), WemoError> {
        let value = if on { "1" } else { "0" };
        self.call("SetBinaryState", &[("BinaryState", value)])
            .await?;
        Ok(())
    }

    /// Set the dimming level; the device switches on as a side effect.
    pub async fn set_brightness(&self, percent: u8) -> Result<(), WemoError> {
        let level = percent.to_string();
        self.call("SetBinaryState", &[("BinaryState", "1"), ("brightness", &level)])
            .await?;
        Ok(())
    }

    /// Establish a subscription delivering NOTIFY requests to `callback`.
    pub async fn subscribe(&self, callback: &str) -> Result<Subscription, WemoError> {
        let url = self.event_url();
        let response = self
            .http
            .request(subscribe_method(), &url)
            .header("CALLBACK", format!("<{callback}>"))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{DEFAULT_GRANT_SECS}"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| WemoError::Subscribe {
                url: url.clone(),
                source,
            })?;
        let sid = header_str(&response, "SID")
            .ok_or(WemoError::SubscriptionHeader {
                url,
                header: "SID",
            })?
            .to_string();
        Ok(Subscription {
            sid,
            timeout: granted_timeout(&response),
        })
    }

    /// Extend an existing subscription; returns the newly granted length.
    pub async fn renew(&self, sid: &str) -> Result<Duration, WemoError> {
        let url = self.event_url();
        let response = self
            .http
            .request(subscribe_method(), &url)
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{DEFAULT_GRANT_SECS}"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| WemoError::Subscribe { url, source })?;
        Ok(granted_timeout(&response))
    }
}

fn subscribe_method() -> Method {
    // "SUBSCRIBE" is a valid token, from_bytes cannot reject it.
    Method::from_bytes(b"SUBSCRIBE").expect("SUBSCRIBE is a valid method token")
}

fn header_str<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|value| value.to_str().ok())
}

fn granted_timeout(response: &reqwest::Response) -> Duration {
    header_str(response, "TIMEOUT")
        .and_then(parse_granted)
        .unwrap_or(Duration::from_secs(DEFAULT_GRANT_SECS))
}

/// Parse a GENA `TIMEOUT` header value of the form `Second-300`.
fn parse_granted(value: &str) -> Option<Duration> {
    let secs = value.trim().strip_prefix("Second-")?.parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

/// Pull power and brightness out of a `GetBinaryState` response body.
///
/// `0` is off; anything else (`1`, or `8` on standby-capable firmware) is
/// on. The lowercase `brightness` tag only appears on dimmers.
fn parse_binary_state(body: &str) -> Result<BinaryStateReport, WemoError> {
    let raw = soap::extract_tag(body, "BinaryState").ok_or_else(|| WemoError::Response {
        action: "GetBinaryState",
        detail: "missing BinaryState".to_string(),
    })?;
    let value = soap::leading_number(raw).ok_or_else(|| WemoError::Response {
        action: "GetBinaryState",
        detail: format!("unparseable BinaryState {raw:?}"),
    })?;
    let brightness =
        soap::extract_tag(body, "brightness").and_then(|level| level.trim().parse::<f64>().ok());
    Ok(BinaryStateReport {
        power: value != 0,
        brightness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_body(inner: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
             s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
             <s:Body><u:GetBinaryStateResponse xmlns:u=\"urn:Belkin:service:basicevent:1\">\
             {inner}</u:GetBinaryStateResponse></s:Body></s:Envelope>"
        )
    }

    // ── response parsing ──

    #[test]
    fn should_read_power_off() {
        let report = parse_binary_state(&response_body("<BinaryState>0</BinaryState>")).unwrap();
        assert!(!report.power);
        assert_eq!(report.brightness, None);
    }

    #[test]
    fn should_treat_standby_value_as_on() {
        let report = parse_binary_state(&response_body("<BinaryState>8</BinaryState>")).unwrap();
        assert!(report.power);
    }

    #[test]
    fn should_tolerate_piped_energy_fields() {
        let report = parse_binary_state(&response_body(
            "<BinaryState>1|1611831989|322|0</BinaryState>",
        ))
        .unwrap();
        assert!(report.power);
    }

    #[test]
    fn should_read_brightness_from_dimmer_responses() {
        let report = parse_binary_state(&response_body(
            "<BinaryState>1</BinaryState><brightness>35</brightness>",
        ))
        .unwrap();
        assert!(report.power);
        assert_eq!(report.brightness, Some(35.0));
    }

    #[test]
    fn should_fail_on_missing_state_tag() {
        let err = parse_binary_state(&response_body("")).unwrap_err();
        assert!(matches!(err, WemoError::Response { .. }));
    }

    #[test]
    fn should_fail_on_unparseable_state() {
        let err =
            parse_binary_state(&response_body("<BinaryState>Error</BinaryState>")).unwrap_err();
        assert!(err.to_string().contains("unparseable"));
    }

    // ── GENA header parsing ──

    #[test]
    fn should_parse_granted_timeout() {
        assert_eq!(parse_granted("Second-300"), Some(Duration::from_secs(300)));
        assert_eq!(parse_granted(" Second-120 "), Some(Duration::from_secs(120)));
    }

    #[test]
    fn should_reject_malformed_timeouts() {
        assert_eq!(parse_granted("infinite"), None);
        assert_eq!(parse_granted("Second-"), None);
        assert_eq!(parse_granted("Second-abc"), None);
    }

    #[test]
    fn should_build_urls_from_host_and_port() {
        let client = DeviceClient::new(reqwest::Client::new(), "192.168.1.60", 49153);
        assert_eq!(
            client.control_url(),
            "http://192.168.1.60:49153/upnp/control/basicevent1"
        );
        assert_eq!(
            client.event_url(),
            "http://192.168.1.60:49153/upnp/event/basicevent1"
        );
    }
}
