// ── Control authorization and validation ──
//
// A control reaches the box only if it carries a token the gateway
// recognises and, for controls that ask for it, passes its own check
// against configuration.

use std::fmt;

use uuid::Uuid;
use xfinity_api::{Control, ControlContext, ValidationError};

use crate::config::GatewayConfig;

/// Per-run token controls must present. Generated once at startup and
/// published with the device state.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Whether `control` presents the session token or, when one is
/// configured, the user override token.
pub fn authorize(control: &impl Control, session: &SessionToken, user_token: Option<&str>) -> bool {
    let Some(presented) = control.session_token() else {
        return false;
    };
    presented == session.as_str() || user_token.is_some_and(|token| token == presented)
}

/// Run the control's own check, giving it configuration when it asks for
/// it.
pub fn prepare(control: &impl Control, config: &GatewayConfig) -> Result<(), ValidationError> {
    if !control.requires_config() {
        return control.check(None);
    }

    let context = ControlContext {
        parental_code: config.parental_code(),
    };
    control.check(Some(&context))
}
