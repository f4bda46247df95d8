//! User-issued controls arriving from the message bus.
//!
//! Each control variant describes its own handling through the [`Control`]
//! trait: whether it needs gateway configuration to validate, the
//! validation itself, and the [`Action`] it turns into once its required
//! fields are populated.

use std::sync::LazyLock;

use serde::Deserialize;
use thiserror::Error;

use crate::action::Action;
use crate::registry::{Registry, Vocabulary, lenient_string};

/// Field carrying the tag of a [`ControlCommand`].
pub const CONTROL_TAG_FIELD: &str = "control_type";

static CONTROLS: LazyLock<Registry<ControlCommand>> = LazyLock::new(|| {
    Registry::new(CONTROL_TAG_FIELD)
        .with("CHANNEL", ControlCommand::ChannelChange)
        .with("VOLUME", ControlCommand::VolumeControl)
        .with("POWER", ControlCommand::PowerControl)
});

// ── Validation ───────────────────────────────────────────────────────

/// A control that failed its own precondition check.
///
/// Only ever stops that one control; the gateway keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a user code is required")]
    MissingUserCode,

    #[error("the user code is invalid")]
    InvalidUserCode,
}

/// Read-only view of gateway configuration handed to controls that
/// declare [`Control::requires_config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlContext<'a> {
    /// Parental code configured for the box, if any.
    pub parental_code: Option<&'a str>,
}

/// Capabilities every control variant carries.
pub trait Control {
    /// Token the sender presented for authorization.
    fn session_token(&self) -> Option<&str>;

    /// Whether [`check`](Self::check) needs a [`ControlContext`].
    fn requires_config(&self) -> bool {
        false
    }

    /// Validate the control. `context` is `Some` exactly when
    /// [`requires_config`](Self::requires_config) is true.
    fn check(&self, _context: Option<&ControlContext<'_>>) -> Result<(), ValidationError> {
        Ok(())
    }

    /// The frame to send to the box, or `None` when a required field is
    /// empty and there is nothing to do.
    fn to_action(&self) -> Option<Action>;
}

fn non_empty(field: Option<&String>) -> Option<String> {
    field.filter(|value| !value.is_empty()).cloned()
}

// ── ControlCommand ───────────────────────────────────────────────────

/// One user instruction, tagged by `control_type`.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
pub enum ControlCommand {
    #[strum(serialize = "CHANNEL")]
    ChannelChange(ChannelChange),
    #[strum(serialize = "VOLUME")]
    VolumeControl(VolumeControl),
    #[strum(serialize = "POWER")]
    PowerControl(PowerControl),
}

impl ControlCommand {
    fn inner(&self) -> &dyn Control {
        match self {
            Self::ChannelChange(c) => c,
            Self::VolumeControl(c) => c,
            Self::PowerControl(c) => c,
        }
    }
}

impl Vocabulary for ControlCommand {
    fn registry() -> &'static Registry<Self> {
        &CONTROLS
    }

    fn tag(&self) -> &'static str {
        self.into()
    }
}

impl Control for ControlCommand {
    fn session_token(&self) -> Option<&str> {
        self.inner().session_token()
    }

    fn requires_config(&self) -> bool {
        self.inner().requires_config()
    }

    fn check(&self, context: Option<&ControlContext<'_>>) -> Result<(), ValidationError> {
        self.inner().check(context)
    }

    fn to_action(&self) -> Option<Action> {
        self.inner().to_action()
    }
}

// ── Variants ─────────────────────────────────────────────────────────

/// Tune to `channel`. Guarded by the parental code when one is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelChange {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_code: Option<String>,
}

impl Control for ChannelChange {
    fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    fn requires_config(&self) -> bool {
        true
    }

    fn check(&self, context: Option<&ControlContext<'_>>) -> Result<(), ValidationError> {
        let Some(expected) = context.and_then(|ctx| ctx.parental_code) else {
            return Ok(());
        };

        match self.user_code.as_deref() {
            None | Some("") => Err(ValidationError::MissingUserCode),
            Some(code) if code == expected => Ok(()),
            Some(_) => Err(ValidationError::InvalidUserCode),
        }
    }

    fn to_action(&self) -> Option<Action> {
        non_empty(self.channel.as_ref()).map(|channel| Action::SetChannel { channel })
    }
}

/// Volume step or mute (`up`, `down`, `mute`, as the box understands them).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VolumeControl {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub volume_action: Option<String>,
}

impl Control for VolumeControl {
    fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    fn to_action(&self) -> Option<Action> {
        non_empty(self.volume_action.as_ref())
            .map(|volume_action| Action::VolumeControl { volume_action })
    }
}

/// Power `on`, `off`, or `toggle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PowerControl {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub power_action: Option<String>,
}

impl Control for PowerControl {
    fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    fn to_action(&self) -> Option<Action> {
        non_empty(self.power_action.as_ref()).map(|power_action| Action::PowerControl { power_action })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
