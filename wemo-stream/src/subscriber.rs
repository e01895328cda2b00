//! Blocking device calls behind a trait so the lifecycle can be driven by fakes

use std::sync::Arc;

use wemo_api::{ApiError, Device, DeviceInfo, Service, SubscriptionResponse, WemoClient};

use crate::error::{Result, StreamError};

/// The device operations the subscription lifecycle needs.
///
/// Implementations block; the manager runs them on tokio's blocking pool.
pub trait EventSubscriber: Send + Sync + 'static {
    fn device_info(&self, device: &Device) -> std::result::Result<DeviceInfo, ApiError>;

    fn subscribe(
        &self,
        device: &Device,
        service: Service,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> std::result::Result<SubscriptionResponse, ApiError>;

    fn resubscribe(
        &self,
        device: &Device,
        service: Service,
        sid: &str,
        timeout_seconds: u32,
    ) -> std::result::Result<SubscriptionResponse, ApiError>;

    fn unsubscribe(
        &self,
        device: &Device,
        service: Service,
        sid: &str,
    ) -> std::result::Result<u16, ApiError>;
}

impl EventSubscriber for WemoClient {
    fn device_info(&self, device: &Device) -> std::result::Result<DeviceInfo, ApiError> {
        self.fetch_device_info(device)
    }

    fn subscribe(
        &self,
        device: &Device,
        service: Service,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> std::result::Result<SubscriptionResponse, ApiError> {
        WemoClient::subscribe(self, device, service, callback_url, timeout_seconds)
    }

    fn resubscribe(
        &self,
        device: &Device,
        service: Service,
        sid: &str,
        timeout_seconds: u32,
    ) -> std::result::Result<SubscriptionResponse, ApiError> {
        WemoClient::resubscribe(self, device, service, sid, timeout_seconds)
    }

    fn unsubscribe(
        &self,
        device: &Device,
        service: Service,
        sid: &str,
    ) -> std::result::Result<u16, ApiError> {
        WemoClient::unsubscribe(self, device, service, sid)
    }
}

/// Run a blocking subscriber call on the blocking pool
pub(crate) async fn run_blocking<T, F>(subscriber: &Arc<dyn EventSubscriber>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn EventSubscriber) -> std::result::Result<T, ApiError> + Send + 'static,
{
    let subscriber = Arc::clone(subscriber);
    let outcome = tokio::task::spawn_blocking(move || call(subscriber.as_ref()))
        .await
        .map_err(|e| StreamError::Shutdown(format!("device call aborted: {}", e)))?;
    Ok(outcome?)
}
