//! Per-host subscription renewal.
//!
//! Each subscribed host gets one background task that:
//! - sleeps until `granted timeout - renewal offset` (at least one second)
//! - renews the SID, or recovers with a fresh subscription when renewal fails
//! - swaps the stale SID for the new one atomically in the registry
//!
//! A failed recovery leaves no registry entry for the host; the next tick
//! attempts a full subscribe again. Cancellation is checked before every
//! device call of a recovery and again under the registry lock, so a stopped
//! loop never subscribes afresh and never writes an entry.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use wemo_api::{Device, DeviceInfo, Service};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::registry::{SubscriptionInfo, SubscriptionRegistry};
use crate::subscriber::{run_blocking, EventSubscriber};

/// Whether the loop should keep going after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// State owned by one host's renewal task
pub(crate) struct RenewalLoop {
    subscriber: Arc<dyn EventSubscriber>,
    registry: SubscriptionRegistry,
    config: StreamConfig,
    device: Device,
    device_info: DeviceInfo,
    service: Service,
    callback_url: String,
    requested_timeout: u32,
    granted_timeout: u32,
    sid: Option<String>,
}

impl RenewalLoop {
    pub(crate) fn new(
        subscriber: Arc<dyn EventSubscriber>,
        registry: SubscriptionRegistry,
        config: StreamConfig,
        callback_url: String,
        info: &SubscriptionInfo,
        requested_timeout: u32,
    ) -> Self {
        Self {
            subscriber,
            registry,
            config,
            device: Device::new(info.host.clone()),
            device_info: info.device_info.clone(),
            service: info.service,
            callback_url,
            requested_timeout,
            granted_timeout: info.timeout_secs,
            sid: Some(info.sid.clone()),
        }
    }

    /// Start the background task
    pub(crate) fn spawn(self) -> RenewalHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let host = self.device.host.clone();
        let task = tokio::spawn(self.run(shutdown_rx));

        RenewalHandle {
            host,
            shutdown_tx,
            task,
        }
    }

    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = sleep(self.interval()) => {}
                // Also fires when the handle is dropped
                _ = shutdown_rx.recv() => {
                    break;
                }
            }

            if self.tick(&mut shutdown_rx).await == Flow::Stop {
                break;
            }
        }
        tracing::debug!(host = %self.device.host, "renewal loop stopped");
    }

    fn interval(&self) -> Duration {
        self.config.renewal_interval(self.granted_timeout)
    }

    /// Renew the current SID, or subscribe afresh when there is none
    pub(crate) async fn tick(&mut self, shutdown_rx: &mut mpsc::Receiver<()>) -> Flow {
        match self.sid.clone() {
            Some(sid) => self.renew(sid, shutdown_rx).await,
            None => self.recover(None, shutdown_rx).await,
        }
    }

    async fn renew(&mut self, sid: String, shutdown_rx: &mut mpsc::Receiver<()>) -> Flow {
        let device = self.device.clone();
        let service = self.service;
        let requested = self.requested_timeout;
        let stale = sid.clone();
        let outcome = run_blocking(&self.subscriber, move |subscriber| {
            subscriber.resubscribe(&device, service, &stale, requested)
        })
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(host = %self.device.host, %sid, error = %e, "renewal failed");
                if is_cancelled(shutdown_rx) {
                    return Flow::Stop;
                }
                return self.recover(Some(sid), shutdown_rx).await;
            }
        };

        let Some(renewed) = response.accepted_sid().map(str::to_string) else {
            tracing::warn!(
                host = %self.device.host,
                %sid,
                status = response.status,
                reason = response.outcome().describe(),
                "renewal rejected"
            );
            if is_cancelled(shutdown_rx) {
                return Flow::Stop;
            }
            return self.recover(Some(sid), shutdown_rx).await;
        };
        let granted = response.timeout_seconds.unwrap_or(requested);

        let mut entries = self.registry.lock().await;
        if is_cancelled(shutdown_rx) {
            return Flow::Stop;
        }
        let mut info = entries
            .remove(&sid)
            .unwrap_or_else(|| self.entry(renewed.clone(), granted));
        info.sid = renewed.clone();
        info.timeout_secs = granted;
        entries.insert(renewed.clone(), info);
        drop(entries);

        tracing::debug!(host = %self.device.host, sid = %renewed, granted, "subscription renewed");
        self.sid = Some(renewed);
        self.granted_timeout = granted;
        Flow::Continue
    }

    /// Release `stale` if given, subscribe again and swap the registry entry.
    ///
    /// Stopping before the fresh SUBSCRIBE leaves the stale entry in place for
    /// the owner's teardown to release.
    async fn recover(&mut self, stale: Option<String>, shutdown_rx: &mut mpsc::Receiver<()>) -> Flow {
        if is_cancelled(shutdown_rx) {
            return Flow::Stop;
        }

        if let Some(old) = stale.clone() {
            match self.release(old).await {
                Ok(status) => tracing::debug!(host = %self.device.host, status, "released stale subscription"),
                Err(e) => tracing::debug!(host = %self.device.host, error = %e, "could not release stale subscription"),
            }
            if is_cancelled(shutdown_rx) {
                return Flow::Stop;
            }
        }

        let device = self.device.clone();
        let service = self.service;
        let callback_url = self.callback_url.clone();
        let requested = self.requested_timeout;
        let outcome = run_blocking(&self.subscriber, move |subscriber| {
            subscriber.subscribe(&device, service, &callback_url, requested)
        })
        .await;

        let fresh = match outcome {
            Ok(response) => match response.accepted_sid() {
                Some(sid) => Some((sid.to_string(), response.timeout_seconds.unwrap_or(requested))),
                None => {
                    tracing::warn!(
                        host = %self.device.host,
                        status = response.status,
                        reason = response.outcome().describe(),
                        "resubscribe rejected"
                    );
                    None
                }
            },
            Err(e) => {
                tracing::warn!(host = %self.device.host, error = %e, "resubscribe failed");
                None
            }
        };

        let mut entries = self.registry.lock().await;
        if is_cancelled(shutdown_rx) {
            drop(entries);
            if let Some((sid, _)) = fresh {
                let _ = self.release(sid).await;
            }
            return Flow::Stop;
        }

        let previous = stale.as_deref().and_then(|sid| entries.remove(sid));
        match fresh {
            Some((sid, granted)) => {
                let mut info = previous.unwrap_or_else(|| self.entry(sid.clone(), granted));
                info.sid = sid.clone();
                info.timeout_secs = granted;
                entries.insert(sid.clone(), info);
                drop(entries);

                tracing::info!(host = %self.device.host, %sid, "subscription recovered");
                self.sid = Some(sid);
                self.granted_timeout = granted;
            }
            None => {
                drop(entries);
                self.sid = None;
                self.granted_timeout = self.requested_timeout;
            }
        }
        Flow::Continue
    }

    async fn release(&self, sid: String) -> Result<u16> {
        let device = self.device.clone();
        let service = self.service;
        run_blocking(&self.subscriber, move |subscriber| {
            subscriber.unsubscribe(&device, service, &sid)
        })
        .await
    }

    fn entry(&self, sid: String, granted: u32) -> SubscriptionInfo {
        SubscriptionInfo {
            device_info: self.device_info.clone(),
            timeout_secs: granted,
            sid,
            host: self.device.host.clone(),
            service: self.service,
            last_event: None,
        }
    }
}

fn is_cancelled(shutdown_rx: &mut mpsc::Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty))
}

/// Owner's side of a running renewal loop
pub(crate) struct RenewalHandle {
    host: String,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RenewalHandle {
    /// Signal the loop and wait up to `wait` for it to finish.
    ///
    /// A loop still inside a device call when `wait` runs out is detached,
    /// not aborted: it sees the signal once the call returns and releases
    /// any SID it was granted in the meantime.
    pub(crate) async fn stop(self, wait: Duration) -> Result<()> {
        let _ = self.shutdown_tx.try_send(());

        match timeout(wait, self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StreamError::Shutdown(format!(
                "Renewal loop for {} panicked: {e}",
                self.host
            ))),
            Err(_) => Err(StreamError::Shutdown(format!(
                "Renewal loop for {} did not stop within {:?}",
                self.host, wait
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_info;
    use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
    use std::sync::Mutex;
    use wemo_api::{ApiError, SubscriptionResponse};

    const HOST: &str = "10.0.1.17:49153";

    /// Answers with configurable status codes and records every call.
    ///
    /// `cancel_on` signals shutdown while the first call starting with the
    /// given prefix is in flight, as an owner stopping the loop would.
    struct ScriptedDevice {
        resubscribe_status: AtomicU16,
        subscribe_status: AtomicU16,
        next_sid: AtomicU32,
        calls: Mutex<Vec<String>>,
        cancel_on: Mutex<Option<(&'static str, mpsc::Sender<()>)>>,
    }

    impl ScriptedDevice {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                resubscribe_status: AtomicU16::new(200),
                subscribe_status: AtomicU16::new(200),
                next_sid: AtomicU32::new(1),
                calls: Mutex::new(Vec::new()),
                cancel_on: Mutex::new(None),
            })
        }

        fn cancel_during(&self, prefix: &'static str, shutdown_tx: mpsc::Sender<()>) {
            *self.cancel_on.lock().unwrap() = Some((prefix, shutdown_tx));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            let mut cancel_on = self.cancel_on.lock().unwrap();
            if cancel_on.as_ref().is_some_and(|(prefix, _)| call.starts_with(prefix)) {
                if let Some((_, shutdown_tx)) = cancel_on.take() {
                    shutdown_tx.try_send(()).unwrap();
                }
            }
            self.calls.lock().unwrap().push(call);
        }
    }

    impl EventSubscriber for ScriptedDevice {
        fn device_info(&self, device: &Device) -> std::result::Result<DeviceInfo, ApiError> {
            Ok(test_info(&device.host, "unused").device_info)
        }

        fn subscribe(
            &self,
            _device: &Device,
            _service: Service,
            _callback_url: &str,
            _timeout_seconds: u32,
        ) -> std::result::Result<SubscriptionResponse, ApiError> {
            self.record("subscribe".to_string());
            let status = self.subscribe_status.load(Ordering::SeqCst);
            let sid = (status == 200)
                .then(|| format!("uuid:fresh-{}", self.next_sid.fetch_add(1, Ordering::SeqCst)));
            Ok(SubscriptionResponse {
                status,
                sid,
                timeout_seconds: Some(300),
            })
        }

        fn resubscribe(
            &self,
            _device: &Device,
            _service: Service,
            sid: &str,
            _timeout_seconds: u32,
        ) -> std::result::Result<SubscriptionResponse, ApiError> {
            self.record(format!("resubscribe {sid}"));
            let status = self.resubscribe_status.load(Ordering::SeqCst);
            Ok(SubscriptionResponse {
                status,
                sid: (status == 200).then(|| sid.to_string()),
                timeout_seconds: Some(120),
            })
        }

        fn unsubscribe(
            &self,
            _device: &Device,
            _service: Service,
            sid: &str,
        ) -> std::result::Result<u16, ApiError> {
            self.record(format!("unsubscribe {sid}"));
            Ok(200)
        }
    }

    async fn setup(device: &Arc<ScriptedDevice>) -> (RenewalLoop, SubscriptionRegistry) {
        let registry = SubscriptionRegistry::new();
        let info = test_info(HOST, "uuid:old");
        registry.insert(info.clone()).await;

        let subscriber: Arc<dyn EventSubscriber> = device.clone();
        let renewal = RenewalLoop::new(
            subscriber,
            registry.clone(),
            StreamConfig::default(),
            "http://10.0.1.2:6767/listener".to_string(),
            &info,
            300,
        );
        (renewal, registry)
    }

    #[tokio::test]
    async fn test_successful_renewal_adopts_granted_timeout() {
        let device = ScriptedDevice::new();
        let (mut renewal, registry) = setup(&device).await;
        let (_tx, mut rx) = mpsc::channel(1);

        assert_eq!(renewal.tick(&mut rx).await, Flow::Continue);

        assert_eq!(device.calls(), vec!["resubscribe uuid:old"]);
        let info = registry.get("uuid:old").await.unwrap();
        assert_eq!(info.timeout_secs, 120);
        assert_eq!(renewal.interval(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_failed_renewal_recovers_with_single_entry() {
        let device = ScriptedDevice::new();
        device.resubscribe_status.store(412, Ordering::SeqCst);
        let (mut renewal, registry) = setup(&device).await;
        let (_tx, mut rx) = mpsc::channel(1);

        assert_eq!(renewal.tick(&mut rx).await, Flow::Continue);

        assert_eq!(
            device.calls(),
            vec!["resubscribe uuid:old", "unsubscribe uuid:old", "subscribe"]
        );
        assert!(registry.get("uuid:old").await.is_none());
        let entries = registry.snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sid, "uuid:fresh-1");
        assert_eq!(entries[0].host, HOST);
    }

    #[tokio::test]
    async fn test_failed_recovery_clears_entry_then_retries_subscribe() {
        let device = ScriptedDevice::new();
        device.resubscribe_status.store(412, Ordering::SeqCst);
        device.subscribe_status.store(503, Ordering::SeqCst);
        let (mut renewal, registry) = setup(&device).await;
        let (_tx, mut rx) = mpsc::channel(1);

        assert_eq!(renewal.tick(&mut rx).await, Flow::Continue);
        assert!(registry.is_empty().await);

        device.subscribe_status.store(200, Ordering::SeqCst);
        assert_eq!(renewal.tick(&mut rx).await, Flow::Continue);

        assert_eq!(
            device.calls(),
            vec!["resubscribe uuid:old", "unsubscribe uuid:old", "subscribe", "subscribe"]
        );
        assert_eq!(
            registry.sid_for_host(HOST).await.as_deref(),
            Some("uuid:fresh-1")
        );
    }

    #[tokio::test]
    async fn test_stop_during_failed_renewal_skips_recovery() {
        let device = ScriptedDevice::new();
        device.resubscribe_status.store(412, Ordering::SeqCst);
        let (mut renewal, registry) = setup(&device).await;
        let (tx, mut rx) = mpsc::channel(1);
        device.cancel_during("resubscribe", tx);

        assert_eq!(renewal.tick(&mut rx).await, Flow::Stop);

        assert_eq!(device.calls(), vec!["resubscribe uuid:old"]);
        assert_eq!(registry.sid_for_host(HOST).await.as_deref(), Some("uuid:old"));
    }

    #[tokio::test]
    async fn test_stop_during_stale_release_skips_subscribe() {
        let device = ScriptedDevice::new();
        device.resubscribe_status.store(412, Ordering::SeqCst);
        let (mut renewal, registry) = setup(&device).await;
        let (tx, mut rx) = mpsc::channel(1);
        device.cancel_during("unsubscribe", tx);

        assert_eq!(renewal.tick(&mut rx).await, Flow::Stop);

        assert_eq!(
            device.calls(),
            vec!["resubscribe uuid:old", "unsubscribe uuid:old"]
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_stop_during_subscribe_releases_fresh_sid() {
        let device = ScriptedDevice::new();
        device.resubscribe_status.store(412, Ordering::SeqCst);
        let (mut renewal, registry) = setup(&device).await;
        let (tx, mut rx) = mpsc::channel(1);
        device.cancel_during("subscribe", tx);

        assert_eq!(renewal.tick(&mut rx).await, Flow::Stop);

        assert_eq!(
            device.calls(),
            vec![
                "resubscribe uuid:old",
                "unsubscribe uuid:old",
                "subscribe",
                "unsubscribe uuid:fresh-1"
            ]
        );
        assert!(registry.get("uuid:fresh-1").await.is_none());
    }

    #[tokio::test]
    async fn test_stopped_loop_skips_pending_subscribe() {
        let device = ScriptedDevice::new();
        device.subscribe_status.store(503, Ordering::SeqCst);
        let (mut renewal, _registry) = setup(&device).await;
        renewal.sid = None;
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(()).unwrap();

        assert_eq!(renewal.tick(&mut rx).await, Flow::Stop);
        assert!(device.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_renewal() {
        let device = ScriptedDevice::new();
        let (renewal, _registry) = setup(&device).await;
        let handle = renewal.spawn();

        tokio::time::advance(Duration::from_secs(200)).await;
        handle.stop(Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_loop() {
        let device = ScriptedDevice::new();
        let (renewal, _registry) = setup(&device).await;
        let RenewalHandle { shutdown_tx, task, .. } = renewal.spawn();

        drop(shutdown_tx);
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
