//! Compound version tags.
//!
//! A compound tag wraps the native tag of whichever backend last served a
//! record. It is serialized to a compact JSON object that callers treat as
//! an opaque string:
//!
//! ```text
//! {"served_by":"neither"}
//! {"served_by":"source","tag":"17"}
//! {"served_by":"destination","tag":"3"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which backend served a record, and the tag it reported.
///
/// At most one side is ever populated; a tag carrying both cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "served_by", content = "tag", rename_all = "snake_case")]
pub enum CompoundTag {
    /// No backend holds the record (or the caller never observed one).
    Neither,
    /// Last served by the source backend.
    Source(String),
    /// Last served by, or written to, the destination backend.
    Destination(String),
}

/// The string handed to [`CompoundTag::decode`] was not produced by
/// [`CompoundTag::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed compound tag {tag:?}: {reason}")]
pub struct MalformedTagError {
    pub tag: String,
    pub reason: String,
}

impl CompoundTag {
    /// Build a tag from its two optional halves.
    ///
    /// Fails when both halves are present.
    pub fn from_parts(
        source: Option<String>,
        destination: Option<String>,
    ) -> Result<Self, MalformedTagError> {
        match (source, destination) {
            (None, None) => Ok(Self::Neither),
            (Some(s), None) => Ok(Self::Source(s)),
            (None, Some(d)) => Ok(Self::Destination(d)),
            (Some(s), Some(d)) => Err(MalformedTagError {
                tag: format!("source={s:?}, destination={d:?}"),
                reason: "both backends populated".into(),
            }),
        }
    }

    /// Split into `(source, destination)`.
    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Neither => (None, None),
            Self::Source(s) => (Some(s), None),
            Self::Destination(d) => (None, Some(d)),
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::Destination(d) => Some(d),
            _ => None,
        }
    }

    /// Serialize to the opaque string handed to callers.
    ///
    /// Infallible: every variant is a unit or a single `String`, and
    /// serde_json only fails on non-string map keys or writer I/O.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a string produced by [`encode`](Self::encode).
    pub fn decode(encoded: &str) -> Result<Self, MalformedTagError> {
        serde_json::from_str(encoded).map_err(|e| MalformedTagError {
            tag: encoded.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Encode a `(source, destination)` pair.
pub fn encode(source: Option<&str>, destination: Option<&str>) -> Result<String, MalformedTagError> {
    let tag = CompoundTag::from_parts(source.map(str::to_string), destination.map(str::to_string))?;
    Ok(tag.encode())
}

/// Decode a string into its `(source, destination)` pair.
pub fn decode(encoded: &str) -> Result<(Option<String>, Option<String>), MalformedTagError> {
    CompoundTag::decode(encoded).map(CompoundTag::into_parts)
}
