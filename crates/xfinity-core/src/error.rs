// ── Core error types ──
//
// Errors surfaced by the gateway core. The `From<xfinity_api::Error>` impl
// folds transport-layer failures into a handful of domain variants so the
// host never has to match on WebSocket details.

use thiserror::Error;
use xfinity_api::{DecodeError, ValidationError};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the box: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Box connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Box disconnected")]
    BoxDisconnected,

    // ── Control errors ───────────────────────────────────────────────
    #[error("Undecodable message: {0}")]
    Decode(#[from] DecodeError),

    #[error("Control carries no valid session token")]
    Unauthorized,

    #[error("Control rejected: {0}")]
    Rejected(#[from] ValidationError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<xfinity_api::Error> for CoreError {
    fn from(err: xfinity_api::Error) -> Self {
        match err {
            xfinity_api::Error::Decode(e) => Self::Decode(e),
            xfinity_api::Error::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            xfinity_api::Error::WebSocketConnect(reason) => Self::ConnectionFailed { reason },
            xfinity_api::Error::Tls(msg) => Self::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            xfinity_api::Error::WebSocketSend(_) | xfinity_api::Error::NotConnected => {
                Self::BoxDisconnected
            }
            xfinity_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid box address: {e}"),
            },
            xfinity_api::Error::Serialization(e) => Self::Internal(e.to_string()),
        }
    }
}
