//! WeMo device discovery library
//!
//! Devices are located with an SSDP `M-SEARCH` sent from a chosen local
//! IPv4 address. Every reply's `LOCATION` header is collected, and those that
//! point at `http://<host>/setup.xml` become [`Device`] handles.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use wemo_discovery::Wemo;
//!
//! let wemo = Wemo::detect()?;
//! for device in wemo.discover_all(Duration::from_secs(3)) {
//!     println!("Found device at {}", device);
//! }
//! # Ok::<(), wemo_discovery::DiscoveryError>(())
//! ```

mod error;
mod ssdp;

pub use error::{DiscoveryError, Result};

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::thread;
use std::time::Duration;

/// Search targets queried by [`Wemo::discover_all`]
pub const KNOWN_DEVICE_TYPES: [&str; 9] = [
    "urn:Belkin:device:bridge:1",
    "urn:Belkin:device:controllee:1",
    "urn:Belkin:device:crockpot:1",
    "urn:Belkin:device:insight:1",
    "urn:Belkin:device:lightswitch:1",
    "urn:Belkin:device:Maker:1",
    "urn:Belkin:device:netcam:1",
    "urn:Belkin:device:sensor:1",
    "urn:Belkin:device:wemo_baby:1",
];

/// Default discovery window
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// A WeMo device reachable at `host:port`.
///
/// The host is the device's only identity; the handle owns no other state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Device {
    /// Host and port, e.g. `10.0.1.17:49153`
    pub host: String,
}

impl Device {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// Discovery controller bound to one local IPv4 address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wemo {
    ip_addr: Ipv4Addr,
}

impl Wemo {
    /// Search from an explicit local address
    pub fn new_by_ip(ip_addr: Ipv4Addr) -> Self {
        Self { ip_addr }
    }

    /// Search from the first non-loopback IPv4 address of the named interface
    pub fn new_by_interface(name: &str) -> Result<Self> {
        let interfaces = local_ip_address::list_afinet_netifas().map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to list network interfaces: {}", e))
        })?;

        let mut seen = false;
        for (iface, addr) in interfaces {
            if iface != name {
                continue;
            }
            seen = true;
            if let IpAddr::V4(ipv4) = addr {
                if !ipv4.is_loopback() {
                    tracing::debug!(interface = name, ip = %ipv4, "using interface address");
                    return Ok(Self::new_by_ip(ipv4));
                }
            }
        }

        if seen {
            Err(DiscoveryError::NoIpv4Address(name.to_string()))
        } else {
            Err(DiscoveryError::InterfaceNotFound(name.to_string()))
        }
    }

    /// Search from the address used for outbound traffic
    pub fn detect() -> Result<Self> {
        local_ipv4().map(Self::new_by_ip)
    }

    /// Use the interface named by `WEMO_IFACE`, falling back to [`Wemo::detect`]
    pub fn from_env() -> Result<Self> {
        match std::env::var("WEMO_IFACE") {
            Ok(name) if !name.trim().is_empty() => Self::new_by_interface(name.trim()),
            _ => Self::detect(),
        }
    }

    /// Local address searches are sent from
    pub fn ip_addr(&self) -> Ipv4Addr {
        self.ip_addr
    }

    /// Collect the distinct LOCATION values advertised for `search_target`,
    /// exactly as the devices sent them.
    ///
    /// No replies before the deadline is an empty result. A reply whose
    /// LOCATION does not parse as a URI fails the whole scan.
    pub fn scan(&self, search_target: &str, timeout: Duration) -> Result<Vec<String>> {
        ssdp::search(self.ip_addr, search_target, timeout)
    }

    /// Discover devices of one type
    pub fn discover(&self, search_target: &str, timeout: Duration) -> Result<Vec<Device>> {
        let locations = self.scan(search_target, timeout)?;
        Ok(devices_from_locations(&locations))
    }

    /// Discover every known device type concurrently.
    ///
    /// A failing search target is logged and contributes nothing. The result
    /// holds each host once, in host order.
    pub fn discover_all(&self, timeout: Duration) -> Vec<Device> {
        let per_target: Vec<Vec<Device>> = thread::scope(|scope| {
            let handles: Vec<_> = KNOWN_DEVICE_TYPES
                .iter()
                .map(|urn| (urn, scope.spawn(move || self.discover(urn, timeout))))
                .collect();

            handles
                .into_iter()
                .filter_map(|(urn, handle)| match handle.join() {
                    Ok(Ok(devices)) => Some(devices),
                    Ok(Err(e)) => {
                        tracing::warn!(search_target = urn, error = %e, "discovery failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(search_target = urn, "discovery thread panicked");
                        None
                    }
                })
                .collect()
        });

        merge_devices(per_target)
    }
}

/// Union of per-target results, deduplicated by host and ordered by host
pub fn merge_devices<I>(results: I) -> Vec<Device>
where
    I: IntoIterator<Item = Vec<Device>>,
{
    results
        .into_iter()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Devices for the advertised locations that point at `setup.xml`
fn devices_from_locations(locations: &[String]) -> Vec<Device> {
    locations
        .iter()
        .filter_map(|location| host_from_location(location))
        .map(Device::new)
        .collect()
}

/// Extract the host from a `http://<host>/setup.xml` location
///
/// # Examples
///
/// ```
/// use wemo_discovery::host_from_location;
///
/// assert_eq!(host_from_location("http://10.0.1.17:49153/setup.xml"), Some("10.0.1.17:49153"));
/// assert_eq!(host_from_location("http://10.0.1.1:80/description.xml"), None);
/// ```
pub fn host_from_location(location: &str) -> Option<&str> {
    let rest = location.strip_prefix("http://")?;
    let (host, path) = rest.split_once('/')?;
    if host.is_empty() || !path.starts_with("setup.xml") {
        return None;
    }
    Some(host)
}

/// Local IPv4 address used for outbound traffic
pub fn local_ipv4() -> Result<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(ip)) => Ok(ip),
        Ok(IpAddr::V6(_)) => Err(DiscoveryError::NoIpv4Address("default route".to_string())),
        Err(e) => Err(DiscoveryError::NetworkError(format!(
            "Failed to detect local IP: {}",
            e
        ))),
    }
}

/// Discovery window from `WEMO_TIMEOUT_DISCOVERY` (seconds), default 3 s
pub fn discovery_timeout_from_env() -> Duration {
    match std::env::var("WEMO_TIMEOUT_DISCOVERY") {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(value = %raw, "invalid WEMO_TIMEOUT_DISCOVERY, using default");
                DEFAULT_DISCOVERY_TIMEOUT
            }
        },
        Err(_) => DEFAULT_DISCOVERY_TIMEOUT,
    }
}
