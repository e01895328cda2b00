//! Subscription lifecycle: subscribe, renew in the background, tear down.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use wemo_api::{Device, Service};

use crate::config::{StreamConfig, DEFAULT_SUBSCRIPTION_TIMEOUT};
use crate::error::{Result, StreamError};
use crate::registry::{SubscriptionInfo, SubscriptionRegistry};
use crate::renewal::{RenewalHandle, RenewalLoop};
use crate::subscriber::{run_blocking, EventSubscriber};

/// Owns one renewal loop per subscribed host.
///
/// At most one subscription exists per host. Subscribing a host that is
/// already subscribed tears the old subscription down first.
pub struct SubscriptionManager {
    subscriber: Arc<dyn EventSubscriber>,
    registry: SubscriptionRegistry,
    config: StreamConfig,
    callback_url: String,
    /// Host -> running renewal loop. Held across a whole subscribe or
    /// teardown so operations on one host never interleave.
    loops: Mutex<HashMap<String, RenewalHandle>>,
}

impl SubscriptionManager {
    pub fn new(
        subscriber: Arc<dyn EventSubscriber>,
        registry: SubscriptionRegistry,
        config: StreamConfig,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            subscriber,
            registry,
            config,
            callback_url: callback_url.into(),
            loops: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// URL devices are told to deliver NOTIFY requests to
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Subscribe with the configured timeout
    pub async fn subscribe(&self, device: &Device) -> Result<SubscriptionInfo> {
        self.subscribe_with_timeout(device, self.config.subscription_timeout)
            .await
    }

    /// Subscribe to `device` and start renewing.
    ///
    /// The event service is chosen from the device type fetched here, once.
    /// A timeout of 0 means the default of 300 seconds.
    pub async fn subscribe_with_timeout(
        &self,
        device: &Device,
        timeout_secs: u32,
    ) -> Result<SubscriptionInfo> {
        let requested = if timeout_secs == 0 {
            DEFAULT_SUBSCRIPTION_TIMEOUT
        } else {
            timeout_secs
        };

        let mut loops = self.loops.lock().await;
        if loops.contains_key(&device.host) {
            tracing::debug!(host = %device.host, "replacing existing subscription");
            if let Err(e) = self.teardown(&mut loops, &device.host).await {
                tracing::warn!(host = %device.host, error = %e, "previous subscription did not stop cleanly");
            }
        }

        let target = device.clone();
        let device_info =
            run_blocking(&self.subscriber, move |subscriber| subscriber.device_info(&target))
                .await?;
        let service = Service::events_for(&device_info);

        let target = device.clone();
        let callback_url = self.callback_url.clone();
        let response = run_blocking(&self.subscriber, move |subscriber| {
            subscriber.subscribe(&target, service, &callback_url, requested)
        })
        .await?;

        let sid = match response.accepted_sid() {
            Some(sid) => sid.to_string(),
            None => {
                tracing::warn!(
                    host = %device.host,
                    status = response.status,
                    reason = response.outcome().describe(),
                    "subscription rejected"
                );
                return Err(StreamError::rejected(&device.host, response.status));
            }
        };

        let info = SubscriptionInfo {
            device_info,
            timeout_secs: response.timeout_seconds.unwrap_or(requested),
            sid,
            host: device.host.clone(),
            service,
            last_event: None,
        };
        self.registry.insert(info.clone()).await;

        let renewal = RenewalLoop::new(
            Arc::clone(&self.subscriber),
            self.registry.clone(),
            self.config.clone(),
            self.callback_url.clone(),
            &info,
            requested,
        );
        loops.insert(device.host.clone(), renewal.spawn());

        tracing::info!(
            host = %info.host,
            sid = %info.sid,
            service = ?info.service,
            timeout = info.timeout_secs,
            "subscribed"
        );
        Ok(info)
    }

    /// Cancel the subscription currently registered under `sid`.
    ///
    /// Fails only for an unknown SID. A renewal loop that does not stop within
    /// the shutdown timeout is logged and left to finish on its own.
    pub async fn unsubscribe(&self, sid: &str) -> Result<()> {
        let mut loops = self.loops.lock().await;
        let host = self
            .registry
            .get(sid)
            .await
            .map(|info| info.host)
            .ok_or_else(|| StreamError::NotFound(sid.to_string()))?;
        self.teardown_logged(&mut loops, &host).await;
        Ok(())
    }

    /// Cancel whatever subscription `host` has, including one whose
    /// recovery is still pending
    pub async fn unsubscribe_host(&self, host: &str) -> Result<()> {
        let mut loops = self.loops.lock().await;
        if !loops.contains_key(host) && self.registry.sid_for_host(host).await.is_none() {
            return Err(StreamError::NotFound(host.to_string()));
        }
        self.teardown_logged(&mut loops, host).await;
        Ok(())
    }

    /// Hosts with a running renewal loop
    pub async fn active_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.loops.lock().await.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Stop every renewal loop and release every subscription.
    ///
    /// All hosts are torn down even if some fail; the first failure is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let mut loops = self.loops.lock().await;
        let mut hosts: Vec<String> = loops.keys().cloned().collect();
        for info in self.registry.snapshot().await {
            if !hosts.contains(&info.host) {
                hosts.push(info.host);
            }
        }

        let mut first_error = None;
        for host in hosts {
            if let Err(e) = self.teardown(&mut loops, &host).await {
                tracing::warn!(%host, error = %e, "teardown failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn teardown_logged(&self, loops: &mut HashMap<String, RenewalHandle>, host: &str) {
        if let Err(e) = self.teardown(loops, host).await {
            tracing::warn!(%host, error = %e, "renewal loop did not stop cleanly");
        }
    }

    /// Stop the host's loop, drop its entries and UNSUBSCRIBE them.
    ///
    /// UNSUBSCRIBE results are logged only; the loop stop result is returned.
    async fn teardown(&self, loops: &mut HashMap<String, RenewalHandle>, host: &str) -> Result<()> {
        let stopped = match loops.remove(host) {
            Some(handle) => handle.stop(self.config.shutdown_timeout).await,
            None => Ok(()),
        };

        for info in self.registry.remove_host(host).await {
            let device = Device::new(info.host.clone());
            let service = info.service;
            let sid = info.sid.clone();
            match run_blocking(&self.subscriber, move |subscriber| {
                subscriber.unsubscribe(&device, service, &sid)
            })
            .await
            {
                Ok(status) => tracing::info!(%host, sid = %info.sid, status, "unsubscribed"),
                Err(e) => tracing::warn!(%host, sid = %info.sid, error = %e, "unsubscribe failed"),
            }
        }

        stopped
    }
}
