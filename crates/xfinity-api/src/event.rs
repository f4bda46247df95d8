//! Notifications pushed by the box over the WebSocket.

use std::sync::LazyLock;

use serde::Deserialize;

use crate::registry::{Registry, Vocabulary, lenient_string};

/// Field carrying the tag of a [`DeviceEvent`].
pub const EVENT_TAG_FIELD: &str = "event_type";

static EVENTS: LazyLock<Registry<DeviceEvent>> = LazyLock::new(|| {
    Registry::new(EVENT_TAG_FIELD)
        .with("DEVICE_INFO", DeviceEvent::DeviceInfo)
        .with("STATUS_CHANGE", DeviceEvent::StatusChange)
        .with("CHANNEL_CHANGE", DeviceEvent::ChannelChange)
        .with("ERROR", DeviceEvent::Error)
        .with("INFO", DeviceEvent::Info)
});

/// One notification from the box, tagged by `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceEvent {
    DeviceInfo(DeviceInfo),
    StatusChange(StatusChange),
    ChannelChange(ChannelChange),
    Error(DeviceError),
    Info(InfoMessage),
}

impl Vocabulary for DeviceEvent {
    fn registry() -> &'static Registry<Self> {
        &EVENTS
    }

    fn tag(&self) -> &'static str {
        self.into()
    }
}

/// Identity of the box, usually sent right after the session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub firmware: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mac_address: Option<String>,
}

/// Power/activity status reported by the box (free-form, e.g. `"on"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusChange {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelChange {
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceError {
    #[serde(default, deserialize_with = "lenient_string")]
    pub error_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InfoMessage {
    #[serde(default, deserialize_with = "lenient_string")]
    pub info_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
}
