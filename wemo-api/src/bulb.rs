//! Bulb commands and status for bridge-controlled lights.

use std::collections::HashMap;

use serde::Deserialize;

use crate::xml;
use crate::{ApiError, Result};

/// On/off capability
pub const CAPABILITY_ON_OFF: &str = "10006";
/// Level capability, value `<level>:<transition>`
pub const CAPABILITY_LEVEL: &str = "10008";

/// Supported bulb commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulbCommand {
    On,
    Off,
    /// Brightness 0-255, applied with no transition
    Dim(u8),
}

impl BulbCommand {
    /// Build a command from its name and value, e.g. `("dim", "128")`
    pub fn parse(command: &str, value: &str) -> Result<Self> {
        match command.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "dim" => value
                .trim()
                .parse::<u8>()
                .map(Self::Dim)
                .map_err(|_| ApiError::InvalidCommand(format!("dim level '{}' is not 0-255", value))),
            other => Err(ApiError::InvalidCommand(format!("unknown bulb command '{}'", other))),
        }
    }

    pub fn capability(&self) -> &'static str {
        match self {
            Self::On | Self::Off => CAPABILITY_ON_OFF,
            Self::Dim(_) => CAPABILITY_LEVEL,
        }
    }

    pub fn value(&self) -> String {
        match self {
            Self::On => "1".to_string(),
            Self::Off => "0".to_string(),
            Self::Dim(level) => format!("{}:0", level),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceStatusList {
    #[serde(rename = "DeviceStatus", default)]
    entries: Vec<DeviceStatus>,
}

#[derive(Debug, Deserialize)]
struct DeviceStatus {
    #[serde(rename = "DeviceID")]
    device_id: DeviceId,
    #[serde(rename = "CapabilityValue", default)]
    capability_value: String,
}

#[derive(Debug, Deserialize)]
struct DeviceId {
    #[serde(rename = "@available", default)]
    available: Option<String>,
    #[serde(rename = "$text", default)]
    id: String,
}

/// Decode a `GetDeviceStatus` response into device ID → capability values
pub(crate) fn parse_device_status(body: &str) -> Result<HashMap<String, String>> {
    let document = xml::nested_document(body, "DeviceStatusList")?;
    if document.is_empty() {
        return Ok(HashMap::new());
    }
    let list: DeviceStatusList = xml::parse(&document)?;

    Ok(list
        .entries
        .into_iter()
        .map(|status| {
            if status.device_id.available.as_deref() == Some("NO") {
                tracing::debug!(device_id = %status.device_id.id, "bulb reported unavailable");
            }
            (status.device_id.id.trim().to_string(), status.capability_value)
        })
        .collect())
}

/// IDs listed in a `SetDeviceStatus` response's `ErrorDeviceIDs`
pub(crate) fn error_device_ids(body: &str) -> Vec<String> {
    xml::field(body, "ErrorDeviceIDs")
        .map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("on", "", BulbCommand::On, "10006", "1")]
    #[case("OFF", "", BulbCommand::Off, "10006", "0")]
    #[case("dim", "128", BulbCommand::Dim(128), "10008", "128:0")]
    #[case("dim", "0", BulbCommand::Dim(0), "10008", "0:0")]
    fn test_bulb_command_vocabulary(
        #[case] command: &str,
        #[case] value: &str,
        #[case] expected: BulbCommand,
        #[case] capability: &str,
        #[case] wire_value: &str,
    ) {
        let parsed = BulbCommand::parse(command, value).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.capability(), capability);
        assert_eq!(parsed.value(), wire_value);
    }

    #[rstest]
    #[case("blink", "")]
    #[case("dim", "256")]
    #[case("dim", "bright")]
    fn test_invalid_bulb_commands(#[case] command: &str, #[case] value: &str) {
        assert!(matches!(
            BulbCommand::parse(command, value),
            Err(ApiError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_parse_device_status() {
        let body = concat!(
            "<s:Envelope><s:Body><u:GetDeviceStatusResponse><DeviceStatusList>",
            "&lt;?xml version=&quot;1.0&quot; encoding=&quot;utf-8&quot;?&gt;",
            "&lt;DeviceStatusList&gt;",
            "&lt;DeviceStatus&gt;&lt;IsGroupAction&gt;NO&lt;/IsGroupAction&gt;",
            "&lt;DeviceID available=&quot;YES&quot;&gt;94103EA2B27803ED&lt;/DeviceID&gt;",
            "&lt;CapabilityID&gt;10006,10008&lt;/CapabilityID&gt;",
            "&lt;CapabilityValue&gt;1,255:0&lt;/CapabilityValue&gt;&lt;/DeviceStatus&gt;",
            "&lt;DeviceStatus&gt;&lt;IsGroupAction&gt;NO&lt;/IsGroupAction&gt;",
            "&lt;DeviceID available=&quot;NO&quot;&gt;94103EA2B2780001&lt;/DeviceID&gt;",
            "&lt;CapabilityID&gt;10006,10008&lt;/CapabilityID&gt;",
            "&lt;CapabilityValue&gt;,&lt;/CapabilityValue&gt;&lt;/DeviceStatus&gt;",
            "&lt;/DeviceStatusList&gt;",
            "</DeviceStatusList></u:GetDeviceStatusResponse></s:Body></s:Envelope>"
        );

        let status = parse_device_status(body).unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status["94103EA2B27803ED"], "1,255:0");
        assert_eq!(status["94103EA2B2780001"], ",");
    }

    #[test]
    fn test_error_device_ids() {
        assert!(error_device_ids("<ErrorDeviceIDs></ErrorDeviceIDs>").is_empty());
        assert!(error_device_ids("<SetDeviceStatusResponse/>").is_empty());
        assert_eq!(
            error_device_ids("<ErrorDeviceIDs>94103EA2B27803ED</ErrorDeviceIDs>"),
            vec!["94103EA2B27803ED".to_string()]
        );
    }
}
