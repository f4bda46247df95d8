use thiserror::Error;

/// Top-level error type for the `xfinity-api` crate.
///
/// Covers every failure mode of the box-facing surface: message decoding,
/// TLS setup, and the WebSocket session. `xfinity-core` maps these into
/// gateway-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Decoding ────────────────────────────────────────────────────
    /// Inbound payload could not be turned into a known message.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Outbound action could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Transport ───────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connect attempt did not complete in time.
    #[error("Connect timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Writing a frame to the box failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    /// No live session to write to.
    #[error("Not connected to the box")]
    NotConnected,
}

/// Why a tagged payload could not be decoded.
///
/// Always non-fatal: the message is dropped and the caller moves on.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid JSON.
    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Payload has no usable tag field.
    #[error("no {field} in payload")]
    MissingTag { field: &'static str },

    /// Tag is not one this vocabulary knows.
    #[error("unknown {field}: {tag}")]
    UnknownVariant { field: &'static str, tag: String },
}
