use serde::Serialize;

/// A command frame written to the box.
///
/// Serializes as a flat object tagged by `action`, e.g.
/// `{"action":"set_channel","channel":"12"}` or `{"action":"keep_alive"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SetChannel { channel: String },
    VolumeControl { volume_action: String },
    PowerControl { power_action: String },
    KeepAlive,
}

impl Action {
    /// Wire name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetChannel { .. } => "set_channel",
            Self::VolumeControl { .. } => "volume_control",
            Self::PowerControl { .. } => "power_control",
            Self::KeepAlive => "keep_alive",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_shape() {
        let frame = serde_json::to_value(Action::SetChannel {
            channel: "12".into(),
        })
        .unwrap();
        assert_eq!(frame, json!({"action": "set_channel", "channel": "12"}));

        let frame = serde_json::to_value(Action::KeepAlive).unwrap();
        assert_eq!(frame, json!({"action": "keep_alive"}));

        let frame = serde_json::to_value(Action::VolumeControl {
            volume_action: "mute".into(),
        })
        .unwrap();
        assert_eq!(frame["action"], Action::VolumeControl { volume_action: String::new() }.name());
    }
}
