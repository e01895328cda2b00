//! Device metadata from `setup.xml` and bridged end devices.

use serde::{Deserialize, Serialize};

use crate::xml;
use crate::Result;

/// Metadata snapshot for one device.
///
/// Field order drives the derived ordering, so listings sort by host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceInfo {
    /// `host:port` the metadata was fetched from
    pub host: String,
    pub device_type: String,
    pub friendly_name: String,
    pub mac_address: String,
    pub firmware_version: String,
    pub serial_number: String,
    /// Unique device name, e.g. `uuid:Bridge-1_0-231447B0100D61`
    pub udn: String,
    /// Bulbs and groups paired with a bridge; empty for other devices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub end_devices: Vec<EndDevice>,
}

impl DeviceInfo {
    /// Decode a `setup.xml` document fetched from `host`
    pub fn from_setup_xml(host: &str, body: &str) -> Result<Self> {
        let root: SetupRoot = xml::parse(body)?;
        let description = root.device;

        Ok(Self {
            host: host.to_string(),
            device_type: description.device_type,
            friendly_name: description.friendly_name,
            mac_address: description.mac_address,
            firmware_version: description.firmware_version,
            serial_number: description.serial_number,
            udn: description.udn,
            end_devices: Vec::new(),
        })
    }

    /// Whether the device is a bridge aggregating end devices
    pub fn is_bridge(&self) -> bool {
        self.device_type.contains(":bridge:")
    }

    /// MAC address as colon-separated pairs, e.g. `EC:1A:59:74:B1:EC`
    pub fn formatted_mac(&self) -> String {
        let chars: Vec<char> = self.mac_address.trim().chars().collect();
        chars
            .chunks(2)
            .map(|pair| pair.iter().collect::<String>().to_uppercase())
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// A bulb or group controlled through a bridge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndDevice {
    /// Device ID, or group ID when `is_group` is set
    pub device_id: String,
    pub friendly_name: String,
    /// Capability IDs in the same order as `current_state`
    pub capability_ids: Vec<String>,
    /// Comma-separated capability values, e.g. `1,255:0,,,`
    pub current_state: String,
    #[serde(default)]
    pub is_group: bool,
}

impl EndDevice {
    /// Current value for one capability, e.g. `10006` for on/off
    pub fn capability(&self, capability_id: &str) -> Option<&str> {
        let index = self.capability_ids.iter().position(|id| id == capability_id)?;
        self.current_state.split(',').nth(index)
    }
}

#[derive(Debug, Deserialize)]
struct SetupRoot {
    device: SetupDevice,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupDevice {
    device_type: String,
    friendly_name: String,
    #[serde(default)]
    mac_address: String,
    #[serde(default)]
    firmware_version: String,
    #[serde(default)]
    serial_number: String,
    #[serde(rename = "UDN", default)]
    udn: String,
}

#[derive(Debug, Deserialize)]
struct DeviceLists {
    #[serde(rename = "DeviceList", default)]
    lists: Vec<DeviceList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeviceList {
    #[serde(default)]
    device_infos: Option<DeviceInfos>,
    #[serde(default)]
    group_infos: Option<GroupInfos>,
}

#[derive(Debug, Deserialize)]
struct DeviceInfos {
    #[serde(rename = "DeviceInfo", default)]
    entries: Vec<PairedDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PairedDevice {
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(default)]
    friendly_name: String,
    #[serde(rename = "CapabilityIDs", default)]
    capability_ids: String,
    #[serde(default)]
    current_state: String,
}

#[derive(Debug, Deserialize)]
struct GroupInfos {
    #[serde(rename = "GroupInfo", default)]
    entries: Vec<PairedGroup>,
}

#[derive(Debug, Deserialize)]
struct PairedGroup {
    #[serde(rename = "GroupID")]
    group_id: String,
    #[serde(rename = "GroupName", default)]
    group_name: String,
    #[serde(rename = "GroupCapabilityIDs", default)]
    capability_ids: String,
    #[serde(rename = "GroupCapabilityValues", default)]
    capability_values: String,
}

fn split_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode a `GetEndDevices` response body
pub(crate) fn parse_end_devices(body: &str) -> Result<Vec<EndDevice>> {
    let document = xml::nested_document(body, "DeviceLists")?;
    if document.is_empty() {
        return Ok(Vec::new());
    }
    let lists: DeviceLists = xml::parse(&document)?;

    let mut devices = Vec::new();
    for list in lists.lists {
        if let Some(infos) = list.device_infos {
            devices.extend(infos.entries.into_iter().map(|entry| EndDevice {
                device_id: entry.device_id.trim().to_string(),
                friendly_name: entry.friendly_name,
                capability_ids: split_ids(&entry.capability_ids),
                current_state: entry.current_state,
                is_group: false,
            }));
        }
        if let Some(groups) = list.group_infos {
            devices.extend(groups.entries.into_iter().map(|group| EndDevice {
                device_id: group.group_id.trim().to_string(),
                friendly_name: group.group_name,
                capability_ids: split_ids(&group.capability_ids),
                current_state: group.capability_values,
                is_group: true,
            }));
        }
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:Belkin:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:Belkin:device:controllee:1</deviceType>
    <friendlyName>Pirate Light Right</friendlyName>
    <manufacturer>Belkin International Inc.</manufacturer>
    <modelName>Socket</modelName>
    <serialNumber>221248K0102C92</serialNumber>
    <UDN>uuid:Socket-1_0-221248K0102C92</UDN>
    <firmwareVersion>WeMo_US_2.00.2769.PVT</firmwareVersion>
    <macAddress>EC1A5974B1EC</macAddress>
    <serviceList>
      <service>
        <serviceType>urn:Belkin:service:basicevent:1</serviceType>
        <controlURL>/upnp/control/basicevent1</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_setup_xml_fields_verbatim() {
        let info = DeviceInfo::from_setup_xml("10.0.1.17:49153", SETUP_XML).unwrap();

        assert_eq!(info.friendly_name, "Pirate Light Right");
        assert_eq!(info.mac_address, "EC1A5974B1EC");
        assert_eq!(info.serial_number, "221248K0102C92");
        assert_eq!(info.firmware_version, "WeMo_US_2.00.2769.PVT");
        assert_eq!(info.device_type, "urn:Belkin:device:controllee:1");
        assert_eq!(info.udn, "uuid:Socket-1_0-221248K0102C92");
        assert_eq!(info.host, "10.0.1.17:49153");
        assert!(!info.is_bridge());
    }

    #[test]
    fn test_formatted_mac() {
        let info = DeviceInfo::from_setup_xml("10.0.1.17:49153", SETUP_XML).unwrap();
        assert_eq!(info.formatted_mac(), "EC:1A:59:74:B1:EC");
    }

    #[test]
    fn test_json_uses_kebab_case_keys() {
        let info = DeviceInfo::from_setup_xml("10.0.1.17:49153", SETUP_XML).unwrap();
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["friendly-name"], "Pirate Light Right");
        assert_eq!(json["mac-address"], "EC1A5974B1EC");
        assert_eq!(json["firmware-version"], "WeMo_US_2.00.2769.PVT");
        assert_eq!(json["serial-number"], "221248K0102C92");
        assert_eq!(json["device-type"], "urn:Belkin:device:controllee:1");
        assert_eq!(json["host"], "10.0.1.17:49153");
        assert!(json.get("end-devices").is_none());

        let back: DeviceInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_sorts_by_host() {
        let mut a = DeviceInfo::from_setup_xml("10.0.1.9:49153", SETUP_XML).unwrap();
        let b = DeviceInfo::from_setup_xml("10.0.1.10:49153", SETUP_XML).unwrap();
        a.friendly_name = "Aardvark".to_string();

        let mut infos = vec![a.clone(), b.clone()];
        infos.sort();
        assert_eq!(infos[0].host, "10.0.1.10:49153");
        assert_eq!(infos[1].host, "10.0.1.9:49153");
    }

    #[test]
    fn test_parse_end_devices() {
        let body = concat!(
            "<s:Envelope><s:Body><u:GetEndDevicesResponse><DeviceLists>",
            "&lt;?xml version=&quot;1.0&quot; encoding=&quot;utf-8&quot;?&gt;",
            "&lt;DeviceLists&gt;&lt;DeviceList&gt;&lt;DeviceListType&gt;Paired&lt;/DeviceListType&gt;",
            "&lt;DeviceInfos&gt;&lt;DeviceInfo&gt;&lt;DeviceIndex&gt;0&lt;/DeviceIndex&gt;",
            "&lt;DeviceID&gt;94103EA2B27803ED&lt;/DeviceID&gt;&lt;FriendlyName&gt;Porch&lt;/FriendlyName&gt;",
            "&lt;CapabilityIDs&gt;10006,10008,30008,30009,3000A&lt;/CapabilityIDs&gt;",
            "&lt;CurrentState&gt;1,255:0,,,&lt;/CurrentState&gt;&lt;/DeviceInfo&gt;&lt;/DeviceInfos&gt;",
            "&lt;GroupInfos&gt;&lt;GroupInfo&gt;&lt;GroupID&gt;1402600346&lt;/GroupID&gt;",
            "&lt;GroupName&gt;Downstairs&lt;/GroupName&gt;",
            "&lt;GroupCapabilityIDs&gt;10006,10008&lt;/GroupCapabilityIDs&gt;",
            "&lt;GroupCapabilityValues&gt;0,128:0&lt;/GroupCapabilityValues&gt;",
            "&lt;/GroupInfo&gt;&lt;/GroupInfos&gt;",
            "&lt;/DeviceList&gt;&lt;/DeviceLists&gt;",
            "</DeviceLists></u:GetEndDevicesResponse></s:Body></s:Envelope>"
        );

        let devices = parse_end_devices(body).unwrap();
        assert_eq!(devices.len(), 2);

        let bulb = &devices[0];
        assert_eq!(bulb.device_id, "94103EA2B27803ED");
        assert_eq!(bulb.friendly_name, "Porch");
        assert_eq!(bulb.capability("10006"), Some("1"));
        assert_eq!(bulb.capability("10008"), Some("255:0"));
        assert!(!bulb.is_group);

        let group = &devices[1];
        assert_eq!(group.device_id, "1402600346");
        assert_eq!(group.capability("10008"), Some("128:0"));
        assert!(group.is_group);
    }

    #[test]
    fn test_parse_end_devices_missing_list() {
        assert!(parse_end_devices("<s:Envelope/>").is_err());
    }
}
