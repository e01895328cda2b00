//! SSDP search over UDP multicast
//!
//! Internal to the crate: [`crate::Wemo::scan`] is the public entry point.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use url::Url;

use crate::error::{DiscoveryError, Result};

/// Well-known SSDP multicast group
pub(crate) const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Build the M-SEARCH datagram for a search target
pub(crate) fn msearch_request(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 10\r\n\
         ST: {}\r\n\
         USER-AGENT: unix/5.1 UPnP/1.1 wemo-rs/1.0\r\n\
         \r\n",
        search_target
    )
}

/// Location URIs collected from SSDP replies, keyed by their exact text.
///
/// The advertised text is kept verbatim; `Url` only validates it, since its
/// normalised form can differ (a default `:80` port is dropped, for one).
#[derive(Debug, Default)]
pub(crate) struct LocationSet {
    locations: BTreeSet<String>,
}

impl LocationSet {
    /// Scan one reply datagram for LOCATION headers.
    ///
    /// A LOCATION value that does not parse as a URI aborts the scan.
    pub fn absorb(&mut self, datagram: &str) -> Result<()> {
        for line in datagram.lines() {
            let Some(value) = extract_header_value(line.trim(), "LOCATION:") else {
                continue;
            };

            Url::parse(&value).map_err(|e| {
                DiscoveryError::ParseError(format!("Invalid LOCATION '{}': {}", value, e))
            })?;
            self.locations.insert(value);
        }
        Ok(())
    }

    /// Number of distinct locations seen
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Distinct locations as advertised, ordered by their text
    pub fn into_sorted(self) -> Vec<String> {
        self.locations.into_iter().collect()
    }
}

/// Send one M-SEARCH from `local_ip` and collect replies until `timeout` elapses
pub(crate) fn search(local_ip: Ipv4Addr, search_target: &str, timeout: Duration) -> Result<Vec<String>> {
    let socket = UdpSocket::bind((local_ip, 0))
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;
    let destination: SocketAddr = SSDP_MULTICAST_ADDR
        .parse()
        .map_err(|e| DiscoveryError::NetworkError(format!("Invalid SSDP address: {}", e)))?;

    search_on(&socket, destination, search_target, timeout)
}

/// Send one M-SEARCH from `socket` to `destination` and collect replies
/// until `timeout` elapses.
///
/// No replies before the deadline is an empty result.
pub(crate) fn search_on(
    socket: &UdpSocket,
    destination: SocketAddr,
    search_target: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let request = msearch_request(search_target);
    socket
        .send_to(request.as_bytes(), destination)
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to send M-SEARCH: {}", e)))?;
    tracing::debug!(%destination, %search_target, "sent M-SEARCH");

    let deadline = Instant::now() + timeout;
    let mut locations = LocationSet::default();
    let mut buffer = [0u8; 2048];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set read timeout: {}", e)))?;

        match socket.recv_from(&mut buffer) {
            Ok((size, from)) => {
                let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
                    tracing::debug!(%from, "ignoring non UTF-8 SSDP reply");
                    continue;
                };
                tracing::trace!(%from, reply = text, "SSDP reply");
                locations.absorb(text)?;
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(e) => {
                tracing::debug!(error = %e, "SSDP read ended");
                break;
            }
        }
    }

    tracing::debug!(%search_target, found = locations.len(), "SSDP search complete");
    Ok(locations.into_sorted())
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len()
        && line.is_char_boundary(header.len())
        && line[..header.len()].eq_ignore_ascii_case(header)
    {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}
