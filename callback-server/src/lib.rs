//! Generic UPnP callback server for receiving event notifications.
//!
//! A thin HTTP layer with no knowledge of device payloads:
//!
//! - [`CallbackServer`]: binds the listener address and accepts `NOTIFY`
//!   requests at `/listener`.
//! - [`EventRouter`]: forwards each notification onto an unbounded channel
//!   so accepting requests never waits on the consumer.
//! - [`NotificationPayload`]: the SID and raw XML body of one notification.
//!
//! Decoding payloads and tying SIDs to devices belongs to the consuming crate.
//!
//! ```no_run
//! use callback_server::{CallbackServer, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::ServerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
//!     let server = CallbackServer::bind("0.0.0.0:6767".parse().unwrap(), tx).await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(notification) = rx.recv().await {
//!             println!("{}: {}", notification.subscription_id, notification.event_xml);
//!         }
//!     });
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod router;
mod server;

pub use router::{EventRouter, NotificationPayload};
pub use server::{detect_local_ip, CallbackServer, ServerError, CALLBACK_PATH};
