// ── Outbound bus messages ──
//
// The core never talks to the broker itself. It emits `BusMessage`s on a
// channel and the host forwards them. Payload builders live here so the
// JSON shapes stay in one place.

use serde_json::{Value, json};

use crate::auth::SessionToken;
use crate::config::GatewayConfig;
use crate::store::DeviceState;

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// One publish request for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }
}

/// Entity metadata describing the box as a media player.
pub fn discovery_payload(config: &GatewayConfig, state: &DeviceState) -> Value {
    let topics = &config.topics;

    let mut device = json!({
        "identifiers": [config.unique_id],
        "name": config.device_name,
        "manufacturer": "Xfinity",
    });
    if let Some(model) = &state.model {
        device["model"] = json!(model);
    }
    if let Some(firmware) = &state.firmware {
        device["sw_version"] = json!(firmware);
    }
    if let Some(mac) = state.mac_address.as_ref().or(config.box_mac.as_ref()) {
        device["connections"] = json!([["mac", mac]]);
    }

    json!({
        "name": config.device_name,
        "unique_id": config.unique_id,
        "command_topic": topics.control,
        "state_topic": topics.state,
        "value_template": "{{ value_json.status }}",
        "availability_topic": topics.availability,
        "payload_available": ONLINE,
        "payload_not_available": OFFLINE,
        "json_attributes_topic": topics.state,
        "device": device,
    })
}

/// Current state as published on the state topic. Carries the session
/// token so bus-side automations can sign their controls.
pub fn state_payload(state: &DeviceState, token: &SessionToken) -> Value {
    json!({
        "status": state.status,
        "device_id": state.device_id,
        "model": state.model,
        "firmware": state.firmware,
        "mac_address": state.mac_address,
        "channel": state.current_channel,
        "channel_name": state.current_channel_name,
        "is_muted": state.is_muted,
        "volume_level": state.volume_level,
        "last_error": state.last_error,
        "session_token": token.as_str(),
    })
}
