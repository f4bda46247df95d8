//! Configuration for the xfinity gateway.
//!
//! A flat TOML file merged with `XFINITY_`-prefixed environment variables,
//! validated, and translated into the runtime configs the other crates
//! take: [`ConnectionConfig`] for the box session and [`GatewayConfig`]
//! for the orchestrator. Nested keys use a double underscore in the
//! environment (`XFINITY_MQTT__HOST`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use xfinity_api::transport::DEFAULT_PORT;
use xfinity_api::{ConnectionConfig, TlsMode};
use xfinity_core::config::{DEFAULT_DEVICE_NAME, DEFAULT_DISCOVERY_PREFIX, DEFAULT_UNIQUE_ID};
use xfinity_core::{GatewayConfig, Topics};

pub const ENV_PREFIX: &str = "XFINITY_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Box address on the LAN. Required.
    pub box_host: String,
    pub box_port: u16,
    /// Bearer token for the box. Required.
    pub box_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_mac: Option<String>,
    pub box_unique_id: String,
    pub box_device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_parental_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_control_token: Option<String>,

    /// Accept the box's self-signed certificate.
    pub insecure: bool,
    /// Seconds allowed for one connect attempt.
    pub connect_timeout: u64,

    pub discovery_topic: String,
    /// Defaults to `{discovery_topic}/media_player/{box_unique_id}/set`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_topic: Option<String>,
    /// Defaults to `xfinity/{box_unique_id}/event`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_topic: Option<String>,

    pub mqtt: MqttSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            box_host: String::new(),
            box_port: DEFAULT_PORT,
            box_token: String::new(),
            box_mac: None,
            box_unique_id: DEFAULT_UNIQUE_ID.into(),
            box_device_name: DEFAULT_DEVICE_NAME.into(),
            box_parental_code: None,
            user_control_token: None,
            insecure: true,
            connect_timeout: 10,
            discovery_topic: DEFAULT_DISCOVERY_PREFIX.into(),
            control_topic: None,
            event_topic: None,
            mqtt: MqttSettings::default(),
        }
    }
}

/// Broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Retain flag for everything the gateway publishes.
    pub retain: bool,
    /// Broker keep-alive in seconds.
    pub keep_alive: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "xfinity-gw".into(),
            username: None,
            password: None,
            retain: true,
            keep_alive: 30,
        }
    }
}

impl MqttSettings {
    pub fn password(&self) -> Option<SecretString> {
        self.password.clone().map(SecretString::from)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "xfinity-gw", "xfinity-gw").map_or_else(
        || PathBuf::from("xfinity-gw.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path` (skipped if missing), then the
/// environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    Config::from_figment(&figment(path))
}

impl Config {
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require("box_host", &self.box_host)?;
        require("box_token", &self.box_token)?;
        require("box_unique_id", &self.box_unique_id)?;

        if self.box_port == 0 {
            return Err(ConfigError::Validation {
                field: "box_port".into(),
                reason: "must not be 0".into(),
            });
        }
        if self.connect_timeout == 0 {
            return Err(ConfigError::Validation {
                field: "connect_timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        Ok(())
    }

    /// TOML rendering with secrets masked, for `--print-config`.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        let mask = |secret: &mut Option<String>| {
            if secret.is_some() {
                *secret = Some("********".into());
            }
        };
        if !shown.box_token.is_empty() {
            shown.box_token = "********".into();
        }
        mask(&mut shown.box_parental_code);
        mask(&mut shown.user_control_token);
        mask(&mut shown.mqtt.password);

        Ok(toml::to_string_pretty(&shown)?)
    }

    // ── Runtime configs ─────────────────────────────────────────────

    pub fn to_connection_config(&self) -> ConnectionConfig {
        let mut config =
            ConnectionConfig::new(self.box_host.as_str(), SecretString::from(self.box_token.as_str()));
        config.port = self.box_port;
        config.tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else {
            TlsMode::System
        };
        config.connect_timeout = Duration::from_secs(self.connect_timeout);
        config
    }

    pub fn to_gateway_config(&self) -> GatewayConfig {
        let mut topics = Topics::for_device(&self.discovery_topic, &self.box_unique_id);
        if let Some(control) = non_empty(self.control_topic.as_ref()) {
            topics.control = control;
        }
        if let Some(event) = non_empty(self.event_topic.as_ref()) {
            topics.event = event;
        }

        GatewayConfig {
            unique_id: self.box_unique_id.clone(),
            device_name: self.box_device_name.clone(),
            box_mac: non_empty(self.box_mac.as_ref()),
            parental_code: non_empty(self.box_parental_code.as_ref()).map(SecretString::from),
            user_control_token: non_empty(self.user_control_token.as_ref()).map(SecretString::from),
            topics,
            retain: self.mqtt.retain,
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "is required".into(),
        });
    }
    Ok(())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    /// Defaults plus a TOML file, without the process environment.
    fn from_toml(contents: &str) -> Result<Config, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(file.path()));
        Config::from_figment(&figment)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let config = from_toml(
            r#"
            box_host = "192.168.1.20"
            box_token = "t0ken"
            "#,
        )
        .unwrap();

        assert_eq!(config.box_port, 12345);
        assert_eq!(config.box_unique_id, "xfinity_box");
        assert_eq!(config.box_device_name, "Xfinity Box");
        assert!(config.insecure);
        assert_eq!(config.mqtt, MqttSettings::default());

        let gateway = config.to_gateway_config();
        assert_eq!(
            gateway.topics.control,
            "homeassistant/media_player/xfinity_box/set"
        );
        assert_eq!(gateway.topics.event, "xfinity/xfinity_box/event");
        assert!(gateway.retain);
        assert_eq!(gateway.parental_code(), None);
    }

    #[test]
    fn topics_and_secrets_carry_through() {
        let config = from_toml(
            r#"
            box_host = "10.0.0.5"
            box_port = 4443
            box_token = "t0ken"
            box_unique_id = "den"
            box_parental_code = "1234"
            user_control_token = "automation"
            discovery_topic = "ha"
            event_topic = "custom/events"
            insecure = false
            connect_timeout = 3

            [mqtt]
            host = "broker.lan"
            username = "gw"
            password = "hunter2"
            retain = false
            "#,
        )
        .unwrap();

        let gateway = config.to_gateway_config();
        assert_eq!(gateway.topics.control, "ha/media_player/den/set");
        assert_eq!(gateway.topics.discovery, "ha/media_player/den/config");
        assert_eq!(gateway.topics.event, "custom/events");
        assert_eq!(gateway.parental_code(), Some("1234"));
        assert_eq!(gateway.user_control_token(), Some("automation"));
        assert!(!gateway.retain);

        let connection = config.to_connection_config();
        assert_eq!(connection.url().unwrap().as_str(), "wss://10.0.0.5:4443/control4");
        assert_eq!(connection.tls, TlsMode::System);
        assert_eq!(connection.connect_timeout, Duration::from_secs(3));
        assert_eq!(connection.token.expose_secret(), "t0ken");

        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(
            config.mqtt.password().map(|p| p.expose_secret().to_owned()),
            Some("hunter2".into())
        );
    }

    #[test]
    fn missing_required_keys_fail_validation() {
        let err = from_toml(r#"box_token = "t0ken""#).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "box_host"),
            "{err:?}"
        );

        let err = from_toml(r#"box_host = "10.0.0.5""#).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "box_token"),
            "{err:?}"
        );
    }

    #[test]
    fn wrong_types_are_a_loading_error() {
        let err = from_toml(
            r#"
            box_host = "10.0.0.5"
            box_token = "t0ken"
            box_port = "not a port"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "{err:?}");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(dir.path().join("absent.toml")));

        let config: Config = figment.extract().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn redacted_toml_hides_secrets() {
        let config = from_toml(
            r#"
            box_host = "10.0.0.5"
            box_token = "t0ken"
            box_parental_code = "1234"
            [mqtt]
            password = "hunter2"
            "#,
        )
        .unwrap();

        let rendered = config.to_redacted_toml().unwrap();
        assert!(rendered.contains("box_host = \"10.0.0.5\""));
        assert!(!rendered.contains("t0ken"));
        assert!(!rendered.contains("1234"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("user_control_token"));
    }
}
