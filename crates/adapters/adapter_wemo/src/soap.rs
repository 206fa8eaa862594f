//! Minimal SOAP plumbing for the Belkin basicevent service.
//!
//! Control calls POST an envelope of this shape to
//! [`CONTROL_PATH`]:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"
//!             s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
//!   <s:Body>
//!     <u:SetBinaryState xmlns:u="urn:Belkin:service:basicevent:1">
//!       <BinaryState>1</BinaryState>
//!     </u:SetBinaryState>
//!   </s:Body>
//! </s:Envelope>
//! ```
//!
//! Responses and NOTIFY bodies are mined with [`extract_tag`] rather than a
//! full XML parser; the firmware emits flat, predictable documents.

/// UPnP service that carries power and brightness for the whole family.
pub const BASICEVENT_SERVICE: &str = "urn:Belkin:service:basicevent:1";

/// Path control envelopes are POSTed to.
pub const CONTROL_PATH: &str = "/upnp/control/basicevent1";

/// Path SUBSCRIBE requests are sent to.
pub const EVENT_PATH: &str = "/upnp/event/basicevent1";

/// Build a control envelope for `action` with the given argument tags.
///
/// Values are inserted verbatim; callers pass numeric strings, which never
/// need escaping.
#[must_use]
pub fn build_envelope(action: &str, arguments: &[(&str, &str)]) -> String {
    let mut body = String::with_capacity(256);
    body.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    body.push_str(
        "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">",
    );
    body.push_str("<s:Body>");
    body.push_str(&format!("<u:{action} xmlns:u=\"{BASICEVENT_SERVICE}\">"));
    for (tag, value) in arguments {
        body.push_str(&format!("<{tag}>{value}</{tag}>"));
    }
    body.push_str(&format!("</u:{action}>"));
    body.push_str("</s:Body></s:Envelope>");
    body
}

/// `SOAPACTION` header value for `action`, quotes included.
#[must_use]
pub fn action_header(action: &str) -> String {
    format!("\"{BASICEVENT_SERVICE}#{action}\"")
}

/// Slice the text between the first `<tag>`/`</tag>` pair, if any.
///
/// Matches literal tags only; the documents the adapter reads never carry
/// attributes on the tags of interest.
#[must_use]
pub fn extract_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(&body[start..end])
}

/// Leading numeric field of a state value. Insight-class firmware appends
/// `|`-separated energy fields after the number; only the number matters.
pub(crate) fn leading_number(raw: &str) -> Option<i64> {
    raw.split('|').next()?.trim().parse().ok()
}
