//! The EventBroker ties the listener, the subscription manager and the
//! event channel together.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use wemo_api::{Device, WemoClient};

use crate::config::StreamConfig;
use crate::error::Result;
use crate::listener::{EventListener, SubscriptionEvent};
use crate::manager::SubscriptionManager;
use crate::registry::{SubscriptionInfo, SubscriptionRegistry};
use crate::subscriber::EventSubscriber;

/// Entry point for streaming device events.
///
/// ```rust,no_run
/// use wemo_stream::{EventBroker, StreamConfig};
/// use wemo_api::Device;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut broker = EventBroker::start(StreamConfig::default()).await?;
/// broker.subscribe(&Device::new("10.0.1.17:49153")).await?;
///
/// while let Some(event) = broker.next_event().await {
///     println!("{} -> {:?}", event.sid, event.state);
/// }
/// # Ok(())
/// # }
/// ```
pub struct EventBroker {
    manager: SubscriptionManager,
    listener: EventListener,
    events: Option<mpsc::UnboundedReceiver<SubscriptionEvent>>,
}

impl EventBroker {
    /// Start with the real device client
    pub async fn start(config: StreamConfig) -> Result<Self> {
        Self::with_subscriber(config, Arc::new(WemoClient::new())).await
    }

    /// Start with a custom [`EventSubscriber`]
    pub async fn with_subscriber(
        config: StreamConfig,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = SubscriptionRegistry::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let listener =
            EventListener::start(config.listener_address, registry.clone(), events_tx).await?;
        let manager = SubscriptionManager::new(
            subscriber,
            registry,
            config,
            listener.callback_url().to_string(),
        );

        Ok(Self {
            manager,
            listener,
            events: Some(events_rx),
        })
    }

    pub async fn subscribe(&self, device: &Device) -> Result<SubscriptionInfo> {
        self.manager.subscribe(device).await
    }

    pub async fn subscribe_with_timeout(
        &self,
        device: &Device,
        timeout_secs: u32,
    ) -> Result<SubscriptionInfo> {
        self.manager.subscribe_with_timeout(device, timeout_secs).await
    }

    pub async fn unsubscribe(&self, sid: &str) -> Result<()> {
        self.manager.unsubscribe(sid).await
    }

    pub async fn unsubscribe_host(&self, host: &str) -> Result<()> {
        self.manager.unsubscribe_host(host).await
    }

    /// Current registry contents, ordered by host
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.manager.registry().snapshot().await
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        self.manager.registry()
    }

    pub fn callback_url(&self) -> &str {
        self.listener.callback_url()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Wait for the next event. Returns `None` once the receiver was taken
    /// or the listener stopped.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.as_mut()?.recv().await
    }

    /// Take the event receiver to drain it on another task
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SubscriptionEvent>> {
        self.events.take()
    }

    /// Release every subscription, then stop the listener
    pub async fn shutdown(self) -> Result<()> {
        let result = self.manager.shutdown().await;
        self.listener.shutdown().await;
        result
    }
}
