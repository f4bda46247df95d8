// ── Device state store ──
//
// Single snapshot of what the gateway knows about the box. Pure data, no
// I/O; the gateway is the only writer. Every update except
// `set_unavailable` is refused while the link is down, so `status` reads
// "unavailable" for as long as there is no live session.

use serde::Serialize;
use xfinity_api::event::DeviceInfo;

/// Status reported while no session to the box is up.
pub const UNAVAILABLE: &str = "unavailable";

/// Last error the box reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub description: Option<String>,
}

/// Everything known about the box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub device_id: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub mac_address: Option<String>,
    pub status: String,
    pub current_channel: Option<String>,
    pub current_channel_name: Option<String>,
    pub is_muted: bool,
    pub volume_level: Option<u8>,
    pub last_error: Option<LastError>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            device_id: None,
            model: None,
            firmware: None,
            mac_address: None,
            status: UNAVAILABLE.into(),
            current_channel: None,
            current_channel_name: None,
            is_muted: false,
            volume_level: None,
            last_error: None,
        }
    }
}

/// Owner of the [`DeviceState`] plus the link flag that gates updates.
///
/// Every `update_*` returns whether the snapshot changed; a refused
/// update (link down) reports `false`.
#[derive(Debug, Default)]
pub struct StateStore {
    state: DeviceState,
    link_up: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    // ── Link ─────────────────────────────────────────────────────────

    /// The session came up. Status stays as it is until the box reports
    /// one.
    pub fn mark_connected(&mut self) {
        self.link_up = true;
    }

    /// The session went away. Idempotent, and the one mutation allowed
    /// while the link is down.
    pub fn set_unavailable(&mut self) -> bool {
        self.link_up = false;
        if self.state.status == UNAVAILABLE {
            return false;
        }
        UNAVAILABLE.clone_into(&mut self.state.status);
        true
    }

    // ── Updates ──────────────────────────────────────────────────────

    /// Replace the identity fields with exactly what the box reported.
    pub fn update_from_device_info(&mut self, info: &DeviceInfo) -> bool {
        self.apply(|state| {
            state.device_id.clone_from(&info.device_id);
            state.model.clone_from(&info.model);
            state.firmware.clone_from(&info.firmware);
            state.mac_address.clone_from(&info.mac_address);
        })
    }

    pub fn update_status(&mut self, status: &str) -> bool {
        self.apply(|state| status.clone_into(&mut state.status))
    }

    /// Replace the channel, and the channel name only when one is given.
    pub fn update_channel(&mut self, channel: Option<&str>, channel_name: Option<&str>) -> bool {
        self.apply(|state| {
            state.current_channel = channel.map(str::to_owned);
            if let Some(name) = channel_name.filter(|name| !name.is_empty()) {
                state.current_channel_name = Some(name.to_owned());
            }
        })
    }

    /// Replace whichever volume parts are given.
    pub fn update_volume(&mut self, is_muted: Option<bool>, volume_level: Option<u8>) -> bool {
        self.apply(|state| {
            if let Some(muted) = is_muted {
                state.is_muted = muted;
            }
            if volume_level.is_some() {
                state.volume_level = volume_level;
            }
        })
    }

    pub fn update_error(&mut self, error_type: Option<&str>, description: Option<&str>) -> bool {
        self.apply(|state| {
            state.last_error = Some(LastError {
                error_type: error_type.map(str::to_owned),
                description: description.map(str::to_owned),
            });
        })
    }

    fn apply(&mut self, update: impl FnOnce(&mut DeviceState)) -> bool {
        if !self.link_up {
            return false;
        }
        let before = self.state.clone();
        update(&mut self.state);
        self.state != before
    }
}
