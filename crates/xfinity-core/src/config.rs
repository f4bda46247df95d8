// ── Runtime gateway configuration ──
//
// Identity, topics, and control secrets for one box. Never touches disk;
// the host builds a `GatewayConfig` (usually through `xfinity-config`) and
// hands it to the `Gateway`.

use secrecy::{ExposeSecret, SecretString};

pub const DEFAULT_UNIQUE_ID: &str = "xfinity_box";
pub const DEFAULT_DEVICE_NAME: &str = "Xfinity Box";
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Bus topics the gateway reads from and publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Entity metadata, e.g. `homeassistant/media_player/xfinity_box/config`.
    pub discovery: String,
    /// Inbound controls.
    pub control: String,
    /// Mirrored box events (and inbound events from other publishers).
    pub event: String,
    pub state: String,
    pub availability: String,
}

impl Topics {
    /// Default topic layout for `unique_id` under `discovery_prefix`.
    pub fn for_device(discovery_prefix: &str, unique_id: &str) -> Self {
        Self {
            discovery: format!("{discovery_prefix}/media_player/{unique_id}/config"),
            control: format!("{discovery_prefix}/media_player/{unique_id}/set"),
            event: format!("xfinity/{unique_id}/event"),
            state: format!("xfinity/{unique_id}/state"),
            availability: format!("xfinity/{unique_id}/availability"),
        }
    }
}

/// Configuration for a single gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub unique_id: String,
    pub device_name: String,
    /// MAC advertised in the entity metadata when the box has not
    /// reported its own.
    pub box_mac: Option<String>,
    /// Code a channel change must carry when set.
    pub parental_code: Option<SecretString>,
    /// Long-lived token accepted in addition to the per-run session token.
    pub user_control_token: Option<SecretString>,
    pub topics: Topics,
    /// Retain flag for everything the gateway publishes.
    pub retain: bool,
}

impl GatewayConfig {
    pub fn new(unique_id: impl Into<String>) -> Self {
        let unique_id = unique_id.into();
        Self {
            topics: Topics::for_device(DEFAULT_DISCOVERY_PREFIX, &unique_id),
            unique_id,
            device_name: DEFAULT_DEVICE_NAME.into(),
            box_mac: None,
            parental_code: None,
            user_control_token: None,
            retain: true,
        }
    }

    /// Configured parental code, with an empty value treated as unset.
    pub fn parental_code(&self) -> Option<&str> {
        self.parental_code
            .as_ref()
            .map(|secret| secret.expose_secret())
            .filter(|code| !code.is_empty())
    }

    /// Configured override token, with an empty value treated as unset.
    pub fn user_control_token(&self) -> Option<&str> {
        self.user_control_token
            .as_ref()
            .map(|secret| secret.expose_secret())
            .filter(|token| !token.is_empty())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_UNIQUE_ID)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_topics_follow_unique_id() {
        let config = GatewayConfig::new("den_box");
        assert_eq!(
            config.topics,
            Topics {
                discovery: "homeassistant/media_player/den_box/config".into(),
                control: "homeassistant/media_player/den_box/set".into(),
                event: "xfinity/den_box/event".into(),
                state: "xfinity/den_box/state".into(),
                availability: "xfinity/den_box/availability".into(),
            }
        );
        assert!(config.retain);
    }

    #[test]
    fn empty_secrets_count_as_unset() {
        let mut config = GatewayConfig::default();
        config.parental_code = Some(SecretString::from(""));
        config.user_control_token = Some(SecretString::from("override"));

        assert_eq!(config.parental_code(), None);
        assert_eq!(config.user_control_token(), Some("override"));
    }
}
