//! Configuration for the event broker.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, StreamError};

/// Subscription timeout used when none is given
pub const DEFAULT_SUBSCRIPTION_TIMEOUT: u32 = 300;

/// Configuration for the EventBroker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Address the event listener binds to.
    /// An unspecified IP advertises the outbound interface address to devices.
    /// Default: 0.0.0.0:6767
    pub listener_address: SocketAddr,

    /// Requested subscription lifetime in seconds
    /// Default: 300
    pub subscription_timeout: u32,

    /// How long before expiry a subscription is renewed
    /// Default: 30 seconds
    pub renewal_offset: Duration,

    /// How long teardown waits for a renewal loop to stop
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            listener_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 6767)),
            subscription_timeout: DEFAULT_SUBSCRIPTION_TIMEOUT,
            renewal_offset: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on an OS-assigned port instead of 6767
    pub fn ephemeral_port() -> Self {
        Self {
            listener_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            ..Default::default()
        }
    }

    /// Loopback listener on an OS-assigned port, for local fakes
    pub fn loopback() -> Self {
        Self {
            listener_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Default::default()
        }
    }

    /// Read `WEMO_LISTENER_ADDR`, `WEMO_SUBSCRIPTION_TIMEOUT` and
    /// `WEMO_RENEWAL_OFFSET` over the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("WEMO_LISTENER_ADDR") {
            config.listener_address = raw.trim().parse().map_err(|e| {
                StreamError::Configuration(format!("WEMO_LISTENER_ADDR '{}': {}", raw, e))
            })?;
        }
        if let Some(raw) = lookup("WEMO_SUBSCRIPTION_TIMEOUT") {
            config.subscription_timeout = raw.trim().parse().map_err(|e| {
                StreamError::Configuration(format!("WEMO_SUBSCRIPTION_TIMEOUT '{}': {}", raw, e))
            })?;
        }
        if let Some(raw) = lookup("WEMO_RENEWAL_OFFSET") {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                StreamError::Configuration(format!("WEMO_RENEWAL_OFFSET '{}': {}", raw, e))
            })?;
            config.renewal_offset = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.subscription_timeout == 0 {
            return Err(StreamError::Configuration(
                "Subscription timeout must be greater than 0".to_string(),
            ));
        }

        if self.renewal_offset >= Duration::from_secs(u64::from(self.subscription_timeout)) {
            return Err(StreamError::Configuration(
                "Renewal offset must be shorter than the subscription timeout".to_string(),
            ));
        }

        if self.shutdown_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Time between renewals for a granted timeout, never below one second
    pub fn renewal_interval(&self, granted_timeout: u32) -> Duration {
        Duration::from_secs(u64::from(granted_timeout))
            .saturating_sub(self.renewal_offset)
            .max(Duration::from_secs(1))
    }
}
