//! Private SOAP transport for WeMo device communication
//!
//! Every control command is sent over its own short-lived connection: the
//! embedded HTTP stacks on these devices misbehave with keep-alive and
//! pipelining, so the client never reuses a socket. The same client also
//! issues the UPnP `SUBSCRIBE`/`UNSUBSCRIBE` verbs used for eventing and the
//! plain `GET` used to fetch `setup.xml`.

mod error;
pub mod message;

pub use error::SoapError;

use std::time::Duration;

/// Default connect timeout for a single exchange.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default read/write timeout for a single exchange.
pub const DEFAULT_READ_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Complete response read from a device.
///
/// Non-2xx statuses are not errors at this layer; callers decide what a
/// status means for their operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers in the order the device sent them
    pub headers: Vec<(String, String)>,
    /// Entire response body
    pub body: String,
}

impl RawResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// How a device answered a `SUBSCRIBE`/`UNSUBSCRIBE` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// 200
    Accepted,
    /// 400, incompatible header fields
    IncompatibleHeaders,
    /// 412, usually a stale or unknown SID
    PreconditionFailed,
    /// Anything else; the device is unable to accept the request
    Rejected(u16),
}

impl SubscriptionStatus {
    /// Classify a raw status code
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => Self::Accepted,
            400 => Self::IncompatibleHeaders,
            412 => Self::PreconditionFailed,
            other => Self::Rejected(other),
        }
    }

    /// Human readable explanation used in log lines
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::IncompatibleHeaders => "incompatible header fields",
            Self::PreconditionFailed => "precondition failed",
            Self::Rejected(_) => "unable to accept request",
        }
    }
}

/// Response from a `SUBSCRIBE` request (initial or renewal)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// HTTP status code returned by the device
    pub status: u16,
    /// Subscription ID from the `SID` header, present on success
    pub sid: Option<String>,
    /// Timeout granted through the `TIMEOUT: Second-N` header, if any
    pub timeout_seconds: Option<u32>,
}

impl SubscriptionResponse {
    /// Classified status
    pub fn outcome(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_code(self.status)
    }

    /// A subscription is only live when the device answered 200 with a SID
    pub fn accepted_sid(&self) -> Option<&str> {
        match self.outcome() {
            SubscriptionStatus::Accepted => self.sid.as_deref(),
            _ => None,
        }
    }
}

/// A minimal SOAP client for WeMo device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    connect_timeout: Duration,
    read_write_timeout: Duration,
}

impl SoapClient {
    /// Create a new SOAP client with the default 2 s connect and read/write timeouts
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_WRITE_TIMEOUT)
    }

    /// Create a client with explicit timeouts
    pub fn with_timeouts(connect_timeout: Duration, read_write_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_write_timeout,
        }
    }

    /// Build an agent that never keeps a connection around after the exchange.
    ///
    /// The overall timeout bounds the whole exchange, so a device trickling
    /// its response byte by byte still fails within `connect + read_write`.
    fn dial(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(self.connect_timeout + self.read_write_timeout)
            .timeout_connect(self.connect_timeout)
            .timeout_read(self.read_write_timeout)
            .timeout_write(self.read_write_timeout)
            .max_idle_connections(0)
            .max_idle_connections_per_host(0)
            .build()
    }

    /// Send one control command and return the raw response.
    ///
    /// # Arguments
    /// * `host` - Device `host:port`
    /// * `service` - Service segment, e.g. `basicevent`; the request goes to
    ///   `/upnp/control/<service>1`
    /// * `action` - Action name, e.g. `GetBinaryState`
    /// * `body` - Complete SOAP body, usually from [`message`]
    pub fn invoke(
        &self,
        host: &str,
        service: &str,
        action: &str,
        body: &str,
    ) -> Result<RawResponse, SoapError> {
        let url = format!("http://{host}/upnp/control/{service}1");
        let soap_action = format!("\"urn:Belkin:service:{service}:1#{action}\"");

        tracing::debug!(%host, %service, %action, "sending control command");

        let result = self
            .dial()
            .post(&url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .set("Connection", "close")
            .send_string(body);

        let response = read_response(result)?;
        tracing::debug!(%host, %action, status = response.status, "control command answered");
        Ok(response)
    }

    /// Issue a plain `GET` against the device, e.g. for `/setup.xml`
    pub fn fetch(&self, host: &str, path: &str) -> Result<RawResponse, SoapError> {
        let url = format!("http://{host}{path}");
        let result = self.dial().get(&url).set("Connection", "close").call();
        read_response(result)
    }

    /// Subscribe to the event service at `event_path`.
    ///
    /// # Arguments
    /// * `host` - Device `host:port`
    /// * `event_path` - Event resource, e.g. `/upnp/event/basicevent1`
    /// * `callback_url` - URL notifications should be delivered to
    /// * `timeout_seconds` - Requested subscription lifetime
    pub fn subscribe(
        &self,
        host: &str,
        event_path: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        let url = format!("http://{host}{event_path}");

        let result = self
            .dial()
            .request("SUBSCRIBE", &url)
            .set("HOST", host)
            .set("PATH", event_path)
            .set("CALLBACK", &format!("<{callback_url}>"))
            .set("NT", "upnp:event")
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call();

        let response = read_response(result)?;
        let subscription = subscription_response(&response);
        log_subscription_status("SUBSCRIBE", host, subscription.status);
        Ok(subscription)
    }

    /// Renew an existing subscription identified by `sid`
    pub fn resubscribe(
        &self,
        host: &str,
        event_path: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        let url = format!("http://{host}{event_path}");

        let result = self
            .dial()
            .request("SUBSCRIBE", &url)
            .set("HOST", host)
            .set("SID", sid)
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call();

        let response = read_response(result)?;
        let mut subscription = subscription_response(&response);
        // Renewals keep the SID even when the device omits the header.
        if subscription.outcome() == SubscriptionStatus::Accepted && subscription.sid.is_none() {
            subscription.sid = Some(sid.to_string());
        }
        log_subscription_status("SUBSCRIBE renewal", host, subscription.status);
        Ok(subscription)
    }

    /// Cancel a subscription. Returns the status code the device answered with.
    pub fn unsubscribe(&self, host: &str, event_path: &str, sid: &str) -> Result<u16, SoapError> {
        let url = format!("http://{host}{event_path}");

        let result = self
            .dial()
            .request("UNSUBSCRIBE", &url)
            .set("HOST", host)
            .set("SID", sid)
            .call();

        let response = read_response(result)?;
        log_subscription_status("UNSUBSCRIBE", host, response.status);
        Ok(response.status)
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a ureq result into a [`RawResponse`], keeping non-2xx answers.
fn read_response(result: Result<ureq::Response, ureq::Error>) -> Result<RawResponse, SoapError> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(transport) => return Err(SoapError::Network(transport.to_string())),
    };

    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name, value))
        })
        .collect();

    let body = response
        .into_string()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => {
                SoapError::Parse(format!("Response body is not UTF-8: {e}"))
            }
            _ => SoapError::Network(format!("Failed to read response body: {e}")),
        })?;

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

fn subscription_response(response: &RawResponse) -> SubscriptionResponse {
    SubscriptionResponse {
        status: response.status,
        sid: response
            .header("SID")
            .map(str::trim)
            .filter(|sid| !sid.is_empty())
            .map(str::to_string),
        timeout_seconds: response.header("TIMEOUT").and_then(parse_timeout_header),
    }
}

/// Parse the `Second-N` format used by the `TIMEOUT` header
fn parse_timeout_header(value: &str) -> Option<u32> {
    value.trim().strip_prefix("Second-")?.parse::<u32>().ok()
}

fn log_subscription_status(verb: &str, host: &str, status: u16) {
    let outcome = SubscriptionStatus::from_code(status);
    match outcome {
        SubscriptionStatus::Accepted => tracing::debug!(%host, status, "{verb} {}", outcome.describe()),
        _ => tracing::warn!(%host, status, "{verb} unsuccessful: {}", outcome.describe()),
    }
}
