//! Inbound NOTIFY handling: decode payloads and publish them per SID

use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use callback_server::{CallbackServer, NotificationPayload};
use wemo_api::{decode_event, EventState};

use crate::error::Result;
use crate::registry::SubscriptionRegistry;

/// A decoded notification from a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
    /// SID header of the NOTIFY request
    pub sid: String,
    pub state: EventState,
}

/// Callback server plus the task that turns raw notifications into
/// [`SubscriptionEvent`]s.
///
/// Decoding runs on its own task so a slow consumer never stalls the HTTP side.
pub struct EventListener {
    server: CallbackServer,
    adapter: JoinHandle<()>,
}

impl EventListener {
    /// Bind the listener and start publishing to `events`
    pub async fn start(
        addr: SocketAddr,
        registry: SubscriptionRegistry,
        events: mpsc::UnboundedSender<SubscriptionEvent>,
    ) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let server = CallbackServer::bind(addr, raw_tx).await?;
        let adapter = tokio::spawn(publish_events(raw_rx, registry, events));

        Ok(Self { server, adapter })
    }

    pub fn callback_url(&self) -> &str {
        self.server.callback_url()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Stop accepting notifications and drain the ones already received
    pub async fn shutdown(self) {
        self.server.shutdown().await;
        if let Err(e) = self.adapter.await {
            tracing::warn!(error = %e, "event adapter ended abnormally");
        }
    }
}

async fn publish_events(
    mut raw_rx: mpsc::UnboundedReceiver<NotificationPayload>,
    registry: SubscriptionRegistry,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
) {
    while let Some(NotificationPayload {
        subscription_id,
        event_xml,
    }) = raw_rx.recv().await
    {
        let state = match decode_event(&event_xml) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(sid = %subscription_id, error = %e, "ignoring notification");
                continue;
            }
        };

        if !registry.record_event(&subscription_id, state.clone()).await {
            tracing::debug!(sid = %subscription_id, "notification for unregistered SID");
        }

        tracing::debug!(sid = %subscription_id, ?state, "event received");
        let event = SubscriptionEvent {
            sid: subscription_id,
            state,
        };
        if events.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}
