//! Judgment references and their canonical encoding.
//!
//! The chain never sees judgment bodies. It commits to *references*:
//! a globally unique id, an optional 0-100 quality score, an opaque
//! verdict tag, and a millisecond timestamp. The canonical JSON encoding
//! of those four fields (optionals omitted when absent) is the byte
//! string hashed into each Merkle leaf, so it must stay byte-stable
//! across implementations.

use serde::{Deserialize, Serialize};

use super::Hash256;

/// Reference to a judgment, as committed into blocks.
///
/// Field order matters: the canonical form serializes fields in
/// declaration order, and `None` optionals are omitted entirely to stay
/// compatible with peers whose serializers drop absent properties.
///
/// Ingress tolerates both snake_case and camelCase spellings
/// (`judgment_id` / `judgmentId`, `q_score` / `qScore`); emission always
/// uses the canonical snake_case form.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRef {
    /// Globally unique judgment identifier. Never empty.
    #[serde(alias = "judgmentId")]
    pub judgment_id: String,

    /// Optional quality score in `0..=100`.
    #[serde(
        alias = "qScore",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub q_score: Option<u8>,

    /// Opaque short verdict tag. The chain does not interpret it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,

    /// Judgment timestamp in milliseconds.
    pub timestamp: u64,
}

impl JudgmentRef {
    /// Returns the canonical byte encoding of this reference.
    ///
    /// This is the exact byte string whose SHA-256 hash becomes the
    /// Merkle leaf for this judgment. All implementations on a chain
    /// must agree on it.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails, which would be a programming error:
    /// every field is serializable.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("JudgmentRef should always serialize to JSON")
    }

    /// Computes the Merkle leaf hash for this reference.
    pub fn leaf_hash(&self) -> Hash256 {
        Hash256::compute(&self.canonical_bytes())
    }
}

/// Input form accepted by the chain manager's `add_judgment`.
///
/// The manager normalizes a draft into a [`JudgmentRef`], generating a
/// fresh id and stamping the current time where absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JudgmentDraft {
    /// Caller-supplied id; generated when absent.
    #[serde(alias = "judgmentId", default)]
    pub judgment_id: Option<String>,

    /// Optional quality score in `0..=100`.
    #[serde(alias = "qScore", default)]
    pub q_score: Option<u8>,

    /// Opaque verdict tag.
    #[serde(default)]
    pub verdict: Option<String>,

    /// Judgment timestamp in milliseconds; stamped when absent.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl JudgmentDraft {
    /// Convenience constructor for a draft carrying only an id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            judgment_id: Some(id.into()),
            ..Self::default()
        }
    }
}
