//! Event streaming for WeMo devices
//!
//! This crate keeps UPnP event subscriptions alive and turns the NOTIFY
//! requests devices send back into [`SubscriptionEvent`]s:
//!
//! - [`EventListener`] accepts NOTIFY at `/listener` and decodes the payload
//! - [`SubscriptionManager`] subscribes, renews each host on its own task
//!   and recovers with a fresh SID when renewal fails
//! - [`SubscriptionRegistry`] maps live SIDs to their device
//! - [`EventBroker`] wires the three together from a [`StreamConfig`]
//!
//! Applications that want log output can install a subscriber through
//! [`logging`].

pub mod broker;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod registry;
mod renewal;
pub mod subscriber;

pub use broker::EventBroker;
pub use config::{StreamConfig, DEFAULT_SUBSCRIPTION_TIMEOUT};
pub use error::{Result, StreamError};
pub use listener::{EventListener, SubscriptionEvent};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use manager::SubscriptionManager;
pub use registry::{SubscriptionInfo, SubscriptionRegistry};
pub use subscriber::EventSubscriber;

pub use wemo_api::{BinaryState, Device, EventState};
