//! Tag-dispatched decoding for the two message vocabularies.
//!
//! Every message the gateway accepts is a JSON object carrying a tag field
//! (`event_type` for box events, `control_type` for user controls). A
//! [`Registry`] maps the uppercased tag to a parser for that variant's
//! payload. Each vocabulary owns exactly one registry, built once on first
//! use and never mutated afterwards.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::DecodeError;

type Parser<T> = Box<dyn Fn(Value) -> Result<T, serde_json::Error> + Send + Sync>;

// ── Registry ─────────────────────────────────────────────────────────

/// Static tag → parser table for one vocabulary.
pub struct Registry<T> {
    field: &'static str,
    parsers: HashMap<&'static str, Parser<T>>,
}

impl<T: 'static> Registry<T> {
    /// Start an empty registry reading its tag from `field`.
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            parsers: HashMap::new(),
        }
    }

    /// Register the variant for `tag`.
    ///
    /// `P` is the payload struct deserialized from the whole message;
    /// `wrap` lifts it into the vocabulary's enum (usually the tuple
    /// variant constructor).
    pub fn with<P>(mut self, tag: &'static str, wrap: fn(P) -> T) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        debug_assert!(
            tag.bytes().all(|b| !b.is_ascii_lowercase()),
            "registry tags are stored uppercase"
        );
        let previous = self.parsers.insert(
            tag,
            Box::new(move |value| serde_json::from_value::<P>(value).map(wrap)),
        );
        debug_assert!(previous.is_none(), "duplicate tag {tag}");
        self
    }

    /// Decode `raw` into one of the registered variants.
    pub fn decode(&self, raw: &str) -> Result<T, DecodeError> {
        let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;

        let tag = value
            .get(self.field)
            .and_then(Value::as_str)
            .filter(|tag| !tag.is_empty())
            .ok_or(DecodeError::MissingTag { field: self.field })?;

        let parse = self
            .parsers
            .get(tag.to_ascii_uppercase().as_str())
            .ok_or_else(|| DecodeError::UnknownVariant {
                field: self.field,
                tag: tag.to_owned(),
            })?;

        parse(value).map_err(DecodeError::Malformed)
    }
}

// ── Vocabulary ───────────────────────────────────────────────────────

/// A closed family of tagged messages with its own registry.
pub trait Vocabulary: Sized + 'static {
    /// Process-wide registry for this vocabulary.
    fn registry() -> &'static Registry<Self>;

    /// Tag of this particular message, uppercase.
    fn tag(&self) -> &'static str;

    /// Decode a raw frame or bus payload as one of this vocabulary's
    /// messages.
    fn from_json(raw: &str) -> Result<Self, DecodeError> {
        Self::registry().decode(raw)
    }
}

// ── Field helpers ────────────────────────────────────────────────────

/// Deserialize an optional string field without ever failing.
///
/// Boxes and home-automation templates are loose about types: a channel
/// may arrive as `12` or `"12"`. Scalars are stringified; nulls, arrays,
/// and objects become `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
