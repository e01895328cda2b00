use std::collections::HashMap;
use std::time::Duration;

use soap_client::{message, RawResponse, SoapClient, SubscriptionResponse};
use wemo_discovery::{Device, Wemo};

use crate::bulb::{self, BulbCommand};
use crate::device_info::{self, DeviceInfo, EndDevice};
use crate::state::{BinaryState, InsightParams};
use crate::xml;
use crate::{ApiError, Result, Service, Unknown};

/// Action applied by [`WemoClient::switch_named`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
    Toggle,
}

/// A client for reading and changing the state of WeMo devices
///
/// Reads such as [`binary_state`](Self::binary_state) are best effort and
/// report [`Unknown`] instead of failing the caller. State changes surface
/// every failure as an [`ApiError`].
///
/// ```no_run
/// use wemo_api::WemoClient;
/// use wemo_discovery::Device;
///
/// let client = WemoClient::new();
/// let device = Device::new("10.0.1.17:49153");
///
/// match client.binary_state(&device) {
///     Ok(state) => println!("{} is {}", device, state),
///     Err(unknown) => println!("{} is unknown: {}", device, unknown),
/// }
/// # Ok::<(), wemo_api::ApiError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct WemoClient {
    soap: SoapClient,
}

impl WemoClient {
    pub fn new() -> Self {
        Self {
            soap: SoapClient::new(),
        }
    }

    /// Use a transport with custom timeouts
    pub fn with_soap_client(soap: SoapClient) -> Self {
        Self { soap }
    }

    /// Fetch `setup.xml` and decode the device metadata.
    ///
    /// Bridges also list their paired bulbs; a failure there is logged and
    /// leaves `end_devices` empty.
    pub fn fetch_device_info(&self, device: &Device) -> Result<DeviceInfo> {
        let response = self.soap.fetch(&device.host, "/setup.xml")?;
        if !response.is_success() {
            return Err(ApiError::Status {
                action: "GET /setup.xml".to_string(),
                status: response.status,
            });
        }

        let mut info = DeviceInfo::from_setup_xml(&device.host, &response.body)?;
        if info.is_bridge() {
            match self.bridge_end_devices(device, &info.udn) {
                Ok(end_devices) => info.end_devices = end_devices,
                Err(e) => {
                    tracing::warn!(host = %device.host, error = %e, "unable to list bridge end devices")
                }
            }
        }
        Ok(info)
    }

    /// Current relay state
    pub fn binary_state(&self, device: &Device) -> std::result::Result<BinaryState, Unknown> {
        let raw = self.read_field(
            device,
            Service::BasicEvent,
            "GetBinaryState",
            &message::get_binary_state(),
            "BinaryState",
        )?;

        BinaryState::parse(&raw).ok_or_else(|| {
            let unknown = Unknown::new(format!("unrecognised BinaryState '{}'", raw));
            tracing::warn!(host = %device.host, %unknown, "GetBinaryState");
            unknown
        })
    }

    pub fn on(&self, device: &Device) -> Result<()> {
        self.set_binary_state(device, true)
    }

    pub fn off(&self, device: &Device) -> Result<()> {
        self.set_binary_state(device, false)
    }

    /// Read the state and request the opposite. Returns the requested state.
    ///
    /// Not atomic: a change made elsewhere between the read and the write
    /// is not detected.
    pub fn toggle(&self, device: &Device) -> Result<BinaryState> {
        let target = self.binary_state(device)?.toggled();
        self.set_binary_state(device, target.is_on())?;
        Ok(target)
    }

    fn set_binary_state(&self, device: &Device, on: bool) -> Result<()> {
        tracing::info!(host = %device.host, on, "SetBinaryState");
        self.command(
            device,
            Service::BasicEvent,
            "SetBinaryState",
            &message::set_binary_state(on),
        )?;
        Ok(())
    }

    /// Energy readings of an Insight plug
    pub fn insight_params(&self, device: &Device) -> std::result::Result<InsightParams, Unknown> {
        let raw = self.read_field(
            device,
            Service::Insight,
            "GetInsightParams",
            &message::get_insight_params(),
            "InsightParams",
        )?;

        InsightParams::parse(&raw).ok_or_else(|| {
            let unknown = Unknown::new(format!("unrecognised InsightParams '{}'", raw));
            tracing::warn!(host = %device.host, %unknown, "GetInsightParams");
            unknown
        })
    }

    /// Bulbs and groups paired with a bridge
    pub fn bridge_end_devices(&self, device: &Device, udn: &str) -> Result<Vec<EndDevice>> {
        let response = self.command(
            device,
            Service::Bridge,
            "GetEndDevices",
            &message::get_end_devices(udn),
        )?;
        device_info::parse_end_devices(&response.body)
    }

    /// Apply a bulb command to one bulb, or to a group when `is_group` is set
    pub fn set_bulb_state(
        &self,
        device: &Device,
        device_id: &str,
        command: BulbCommand,
        is_group: bool,
    ) -> Result<()> {
        tracing::info!(host = %device.host, %device_id, ?command, is_group, "SetDeviceStatus");

        let body = message::set_device_status(device_id, command.capability(), &command.value(), is_group);
        let response = self.command(device, Service::Bridge, "SetDeviceStatus", &body)?;

        let rejected = bulb::error_device_ids(&response.body);
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(ApiError::DeviceRejected(rejected.join(",")))
        }
    }

    /// Current capability values keyed by bulb ID
    pub fn bulb_status<S: AsRef<str>>(
        &self,
        device: &Device,
        device_ids: &[S],
    ) -> Result<HashMap<String, String>> {
        let response = self.command(
            device,
            Service::Bridge,
            "GetDeviceStatus",
            &message::get_device_status(device_ids),
        )?;
        bulb::parse_device_status(&response.body)
    }

    /// Subscribe `callback_url` to a device's events
    pub fn subscribe(
        &self,
        device: &Device,
        service: Service,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse> {
        Ok(self
            .soap
            .subscribe(&device.host, service.event_path(), callback_url, timeout_seconds)?)
    }

    /// Renew a subscription
    pub fn resubscribe(
        &self,
        device: &Device,
        service: Service,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse> {
        Ok(self
            .soap
            .resubscribe(&device.host, service.event_path(), sid, timeout_seconds)?)
    }

    /// Cancel a subscription and return the device's status code
    pub fn unsubscribe(&self, device: &Device, service: Service, sid: &str) -> Result<u16> {
        Ok(self.soap.unsubscribe(&device.host, service.event_path(), sid)?)
    }

    /// Discover every device, then apply `action` to those named `friendly_name`.
    ///
    /// Returns the hosts acted on. Search targets that fail are logged by
    /// discovery and contribute no devices.
    pub fn switch_named(
        &self,
        wemo: &Wemo,
        friendly_name: &str,
        timeout: Duration,
        action: Switch,
    ) -> Vec<String> {
        self.switch_matching(wemo.discover_all(timeout), friendly_name, action)
    }

    /// Apply `action` to each of `devices` whose friendly name matches.
    ///
    /// Devices whose metadata cannot be read are skipped, as are devices
    /// where the action fails.
    pub fn switch_matching<I>(&self, devices: I, friendly_name: &str, action: Switch) -> Vec<String>
    where
        I: IntoIterator<Item = Device>,
    {
        let mut acted = Vec::new();

        for device in devices {
            let info = match self.fetch_device_info(&device) {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(host = %device.host, error = %e, "skipping device");
                    continue;
                }
            };
            if info.friendly_name != friendly_name {
                continue;
            }

            let result = match action {
                Switch::On => self.on(&device),
                Switch::Off => self.off(&device),
                Switch::Toggle => self.toggle(&device).map(|_| ()),
            };
            match result {
                Ok(()) => acted.push(device.host),
                Err(e) => tracing::warn!(host = %device.host, error = %e, ?action, "switch failed"),
            }
        }

        acted
    }

    /// Send a state-changing command; any failure is an error
    fn command(&self, device: &Device, service: Service, action: &str, body: &str) -> Result<RawResponse> {
        let response = self.soap.invoke(&device.host, service.segment(), action, body)?;
        if !response.is_success() {
            tracing::warn!(host = %device.host, %action, status = response.status, "command rejected");
            return Err(ApiError::Status {
                action: action.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Best-effort scalar read; every failure becomes [`Unknown`]
    fn read_field(
        &self,
        device: &Device,
        service: Service,
        action: &str,
        body: &str,
        tag: &str,
    ) -> std::result::Result<String, Unknown> {
        let unknown = |reason: String| {
            tracing::warn!(host = %device.host, %action, %reason, "read failed");
            Unknown::new(reason)
        };

        let response = self
            .soap
            .invoke(&device.host, service.segment(), action, body)
            .map_err(|e| unknown(format!("{} failed: {}", action, e)))?;

        if !response.is_success() {
            return Err(unknown(format!(
                "{} returned HTTP status {}",
                action, response.status
            )));
        }

        xml::field(&response.body, tag)
            .ok_or_else(|| unknown(format!("{} response has no {}", action, tag)))
    }
}
