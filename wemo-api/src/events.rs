//! Decoding of NOTIFY `propertyset` bodies.
//!
//! Switches publish `<BinaryState>` directly. Bridges publish a
//! `<StatusChange>` whose text is an escaped `<StateEvent>` document, so the
//! decoder unescapes that text and decodes it as a second document.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::state::BinaryState;
use crate::xml;
use crate::{ApiError, Result};

/// State carried by one notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventState {
    /// Relay state of a switch or Insight plug
    Binary(BinaryState),
    /// Capability change on a bridged bulb
    StateChange {
        device_id: String,
        capability_id: String,
        value: String,
    },
}

#[derive(Debug, Default)]
struct Collected {
    binary_state: Option<String>,
    status_change: Option<String>,
    device_id: Option<String>,
    capability_id: Option<String>,
    value: Option<String>,
}

/// Decode a notification body
pub fn decode_event(body: &str) -> Result<EventState> {
    let collected = match collect(body) {
        Ok(collected) => collected,
        Err(e) => {
            tracing::debug!(error = %e, "event body is not well formed, using tag search");
            tolerant_collect(body)
        }
    };

    if let Some(raw) = &collected.binary_state {
        return BinaryState::parse(raw)
            .map(EventState::Binary)
            .ok_or_else(|| ApiError::Parse(format!("unrecognised BinaryState '{}'", raw)));
    }

    if let Some(inner) = &collected.status_change {
        return decode_event(xml::strip_declaration(inner));
    }

    match (collected.device_id, collected.capability_id, collected.value) {
        (Some(device_id), Some(capability_id), Some(value)) => Ok(EventState::StateChange {
            device_id,
            capability_id,
            value,
        }),
        _ => Err(ApiError::MissingField("BinaryState or StateEvent".to_string())),
    }
}

/// Walk the document and record the text of the elements we care about
fn collect(body: &str) -> std::result::Result<Collected, quick_xml::Error> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut collected = Collected::default();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                current = Some(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Event::End(_) => current = None,
            Event::Text(text) => {
                let raw = String::from_utf8_lossy(&text);
                let value = xml::unescape(&raw).trim().to_string();
                record(&mut collected, current.as_deref(), value);
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).trim().to_string();
                record(&mut collected, current.as_deref(), value);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(collected)
}

fn record(collected: &mut Collected, element: Option<&str>, value: String) {
    let slot = match element {
        Some("BinaryState") => &mut collected.binary_state,
        Some("StatusChange") => &mut collected.status_change,
        Some("DeviceID") => &mut collected.device_id,
        Some("CapabilityId") => &mut collected.capability_id,
        Some("Value") => &mut collected.value,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Fallback for bodies quick-xml rejects
fn tolerant_collect(body: &str) -> Collected {
    let unescaped = xml::unescape(body);
    let grab = |tag: &str| xml::extract_tag(&unescaped, tag).map(|t| t.trim().to_string());

    Collected {
        binary_state: grab("BinaryState"),
        status_change: None,
        device_id: device_id_text(&unescaped),
        capability_id: grab("CapabilityId"),
        value: grab("Value"),
    }
}

/// `<DeviceID available="YES">id</DeviceID>` carries an attribute, so a plain tag search misses it
fn device_id_text(body: &str) -> Option<String> {
    let start = body.find("<DeviceID")?;
    let open_end = start + body[start..].find('>')? + 1;
    let close = open_end + body[open_end..].find("</DeviceID>")?;
    Some(body[open_end..close].trim().to_string())
}
