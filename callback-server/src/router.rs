//! Event routing for HTTP callback notifications.
//!
//! The router forwards every notification that carries a SID. Devices may
//! send their first NOTIFY before the SUBSCRIBE response has been processed,
//! so matching SIDs to subscriptions is left to the consumer.

use tokio::sync::mpsc;

/// Generic notification payload for UPnP event notifications.
///
/// Unparsed: only the subscription ID and raw XML body, with no
/// device-specific context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// The subscription ID from the UPnP SID header
    pub subscription_id: String,
    /// The raw XML event body
    pub event_xml: String,
}

/// Routes events from HTTP callbacks to a channel.
#[derive(Debug, Clone)]
pub struct EventRouter {
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    /// Create a new event router.
    ///
    /// # Example
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use callback_server::router::{EventRouter, NotificationPayload};
    ///
    /// let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
    /// let router = EventRouter::new(tx);
    /// ```
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self { event_sender }
    }

    /// Route an incoming event to the channel.
    ///
    /// Never blocks. Returns `false` when the receiving side has been dropped.
    pub fn route_event(&self, subscription_id: String, event_xml: String) -> bool {
        let payload = NotificationPayload {
            subscription_id,
            event_xml,
        };
        self.event_sender.send(payload).is_ok()
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.event_sender.is_closed()
    }
}
