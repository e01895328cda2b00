//! Live subscriptions keyed by SID
//!
//! The registry is shared by the subscription manager, each host's renewal
//! loop and the event listener. Swapping a stale SID for a fresh one happens
//! under a single write lock so readers never see both or neither.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

use wemo_api::{DeviceInfo, EventState, Service};

/// One live event subscription
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    /// Metadata captured when the subscription was created
    pub device_info: DeviceInfo,
    /// Timeout granted by the device, in seconds
    pub timeout_secs: u32,
    /// Subscription identifier issued by the device
    pub sid: String,
    /// Host and port of the device
    pub host: String,
    /// Event service subscribed to
    pub service: Service,
    /// Most recent decoded notification
    pub last_event: Option<EventState>,
}

pub(crate) type Entries = HashMap<String, SubscriptionInfo>;

/// Thread-safe map from SID to [`SubscriptionInfo`]
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: Arc<RwLock<Entries>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite the entry for `info.sid`
    pub async fn insert(&self, info: SubscriptionInfo) {
        let mut entries = self.entries.write().await;
        entries.insert(info.sid.clone(), info);
    }

    /// Remove `old_sid` and insert `info` in one step.
    ///
    /// Returns the removed entry, if any.
    pub async fn replace(&self, old_sid: &str, info: SubscriptionInfo) -> Option<SubscriptionInfo> {
        let mut entries = self.entries.write().await;
        let previous = entries.remove(old_sid);
        entries.insert(info.sid.clone(), info);
        previous
    }

    pub async fn remove(&self, sid: &str) -> Option<SubscriptionInfo> {
        self.entries.write().await.remove(sid)
    }

    /// Remove every entry for `host`
    pub async fn remove_host(&self, host: &str) -> Vec<SubscriptionInfo> {
        let mut entries = self.entries.write().await;
        let sids: Vec<String> = entries
            .values()
            .filter(|info| info.host == host)
            .map(|info| info.sid.clone())
            .collect();
        sids.iter().filter_map(|sid| entries.remove(sid)).collect()
    }

    pub async fn get(&self, sid: &str) -> Option<SubscriptionInfo> {
        self.entries.read().await.get(sid).cloned()
    }

    pub async fn sid_for_host(&self, host: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .values()
            .find(|info| info.host == host)
            .map(|info| info.sid.clone())
    }

    /// Store `state` as the latest event for `sid`.
    ///
    /// Returns false when the SID is not registered.
    pub async fn record_event(&self, sid: &str, state: EventState) -> bool {
        match self.entries.write().await.get_mut(sid) {
            Some(info) => {
                info.last_event = Some(state);
                true
            }
            None => false,
        }
    }

    /// Copy of every entry, ordered by host
    pub async fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let mut all: Vec<SubscriptionInfo> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.host.cmp(&b.host).then_with(|| a.sid.cmp(&b.sid)));
        all
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Hold the write lock across a check-then-mutate sequence
    pub(crate) async fn lock(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().await
    }
}

#[cfg(test)]
pub(crate) fn test_info(host: &str, sid: &str) -> SubscriptionInfo {
    SubscriptionInfo {
        device_info: DeviceInfo {
            host: host.to_string(),
            device_type: "urn:Belkin:device:controllee:1".to_string(),
            friendly_name: "Desk Lamp".to_string(),
            mac_address: "94103E4830B4".to_string(),
            firmware_version: "WeMo_WW_2.00.11057.PVT-OWRT-SNS".to_string(),
            serial_number: "221517K0101769".to_string(),
            udn: "uuid:Socket-1_0-221517K0101769".to_string(),
            end_devices: Vec::new(),
        },
        timeout_secs: 300,
        sid: sid.to_string(),
        host: host.to_string(),
        service: Service::BasicEvent,
        last_event: None,
    }
}
