//! Device state client for WeMo devices
//!
//! Reads and changes the state of switches, Insight plugs and bridge
//! controlled bulbs through the SOAP control channel, and decodes the
//! payloads those devices push to event subscribers.
//!
//! ```no_run
//! use std::time::Duration;
//! use wemo_api::WemoClient;
//! use wemo_discovery::Wemo;
//!
//! let client = WemoClient::new();
//! let wemo = Wemo::detect()?;
//! for device in wemo.discover_all(Duration::from_secs(3)) {
//!     let info = client.fetch_device_info(&device)?;
//!     println!("{} ({}) at {}", info.friendly_name, info.formatted_mac(), info.host);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bulb;
pub mod client;
pub mod device_info;
pub mod error;
pub mod events;
pub mod service;
pub mod state;
mod xml;

pub use bulb::BulbCommand;
pub use client::{Switch, WemoClient};
pub use device_info::{DeviceInfo, EndDevice};
pub use error::{ApiError, Result, Unknown};
pub use events::{decode_event, EventState};
pub use service::Service;
pub use state::{BinaryState, InsightParams};

pub use soap_client::{SubscriptionResponse, SubscriptionStatus};
pub use wemo_discovery::{Device, Wemo};
