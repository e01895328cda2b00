//! Request body encoding for the control channel.
//!
//! Every control request is the same SOAP envelope around an action element.
//! Encoding is plain string templating: the output for a given input is
//! always byte-for-byte identical, and nothing is validated against a schema.

use html_escape::{encode_double_quoted_attribute, encode_text};

/// Opening half of the SOAP envelope shared by every request.
pub const ENVELOPE_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body>"#;

/// Closing half of the SOAP envelope.
pub const ENVELOPE_FOOTER: &str = "</s:Body></s:Envelope>";

/// Wrap an action element in the SOAP envelope.
pub fn envelope(action_element: &str) -> String {
    let mut body =
        String::with_capacity(ENVELOPE_HEADER.len() + action_element.len() + ENVELOPE_FOOTER.len());
    body.push_str(ENVELOPE_HEADER);
    body.push_str(action_element);
    body.push_str(ENVELOPE_FOOTER);
    body
}

/// `basicevent#GetBinaryState`
pub fn get_binary_state() -> String {
    envelope(r#"<u:GetBinaryState xmlns:u="urn:Belkin:service:basicevent:1"></u:GetBinaryState>"#)
}

/// `basicevent#SetBinaryState`; `on` encodes as `1`, off as `0`.
pub fn set_binary_state(on: bool) -> String {
    let value = if on { 1 } else { 0 };
    envelope(&format!(
        r#"<u:SetBinaryState xmlns:u="urn:Belkin:service:basicevent:1"><BinaryState>{value}</BinaryState></u:SetBinaryState>"#
    ))
}

/// `insight#GetInsightParams`
pub fn get_insight_params() -> String {
    envelope(r#"<u:GetInsightParams xmlns:u="urn:Belkin:service:insight:1"></u:GetInsightParams>"#)
}

/// `bridge#GetEndDevices` for the paired list of the bridge identified by `udn`.
pub fn get_end_devices(udn: &str) -> String {
    envelope(&format!(
        r#"<u:GetEndDevices xmlns:u="urn:Belkin:service:bridge:1"><DevUDN>{}</DevUDN><ReqListType>PAIRED_LIST</ReqListType></u:GetEndDevices>"#,
        encode_text(udn)
    ))
}

/// `bridge#SetDeviceStatus`.
///
/// The bridge expects a complete XML document as the text content of
/// `DeviceStatusList`, so the inner document is built first and then
/// entity-escaped into the outer body.
pub fn set_device_status(device_id: &str, capability: &str, value: &str, is_group: bool) -> String {
    let group = if is_group { "YES" } else { "NO" };
    let inner = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><DeviceStatus><IsGroupAction>{group}</IsGroupAction><DeviceID available="YES">{}</DeviceID><CapabilityID>{}</CapabilityID><CapabilityValue>{}</CapabilityValue></DeviceStatus>"#,
        encode_text(device_id),
        encode_text(capability),
        encode_text(value),
    );

    envelope(&format!(
        r#"<u:SetDeviceStatus xmlns:u="urn:Belkin:service:bridge:1"><DeviceStatusList>{}</DeviceStatusList></u:SetDeviceStatus>"#,
        encode_double_quoted_attribute(&inner)
    ))
}

/// `bridge#GetDeviceStatus` for one or more end-device IDs.
pub fn get_device_status<S: AsRef<str>>(device_ids: &[S]) -> String {
    let ids = device_ids
        .iter()
        .map(|id| encode_text(id.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(",");

    envelope(&format!(
        r#"<u:GetDeviceStatus xmlns:u="urn:Belkin:service:bridge:1"><DeviceIDs>{ids}</DeviceIDs></u:GetDeviceStatus>"#
    ))
}
