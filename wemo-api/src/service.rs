use crate::DeviceInfo;

/// UPnP services the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    BasicEvent,
    Insight,
    Bridge,
}

impl Service {
    /// Segment used in control paths and SOAP actions, e.g. `basicevent`
    pub fn segment(&self) -> &'static str {
        match self {
            Self::BasicEvent => "basicevent",
            Self::Insight => "insight",
            Self::Bridge => "bridge",
        }
    }

    /// Event subscription resource, e.g. `/upnp/event/basicevent1`
    pub fn event_path(&self) -> &'static str {
        match self {
            Self::BasicEvent => "/upnp/event/basicevent1",
            Self::Insight => "/upnp/event/insight1",
            Self::Bridge => "/upnp/event/bridge1",
        }
    }

    /// Event service to subscribe to for a device: bridges publish on `bridge1`
    pub fn events_for(info: &DeviceInfo) -> Self {
        if info.is_bridge() {
            Self::Bridge
        } else {
            Self::BasicEvent
        }
    }
}
