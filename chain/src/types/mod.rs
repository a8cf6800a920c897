//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, operator key material, and
//! the judgment/block records that are shared across the chain
//! implementation. The goal is to avoid "naked" byte buffers in public
//! APIs and instead use domain-specific newtypes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Block header, block body, and canonical hashing/signing forms.
pub mod block;
/// Judgment references and their canonical leaf encoding.
pub mod judgment;

pub use block::{
    Block, BlockHash, Header, WireBlock, genesis_judgments_root, genesis_prev_hash,
    signing_payload,
};
pub use judgment::{JudgmentDraft, JudgmentRef};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Length in bytes of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length in bytes of an Ed25519 secret seed.
pub const SECRET_KEY_LEN: usize = 32;

/// Length in bytes of an Ed25519 detached signature.
pub const SIGNATURE_LEN: usize = 64;

/// Strongly-typed 256-bit hash wrapper (SHA-256).
///
/// This type is used as the backing representation for all fixed-size
/// hashes in the chain (block hashes, parent links, Merkle roots,
/// judgment leaf hashes). It is always exactly [`HASH_LEN`] bytes long.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the SHA-256 hash of `data`.
    ///
    /// The result is deterministic for a given byte slice and is suitable
    /// for use as an identifier or content hash, but it is **not** a
    /// password hash or KDF.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Hash256(digest.into())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Renders the hash as lowercase hex without a prefix.
    ///
    /// Hex is only used at the interface boundary; internal comparisons
    /// are byte-exact on the fixed-width form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a lowercase (or mixed-case) hex string into a hash.
    ///
    /// Returns `None` if the input is not exactly 64 hex characters.
    /// Malformed input never panics.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Ed25519 public key identifying an operator.
///
/// `OperatorKey` is the canonical operator identity across the registry,
/// block headers, and wire forms. It carries raw key bytes only; parsing
/// into a verifier happens inside the crypto layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OperatorKey(pub [u8; PUBLIC_KEY_LEN]);

impl OperatorKey {
    /// Returns the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Renders the key as lowercase hex without a prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded public key.
    ///
    /// Returns `None` on any malformed input (wrong length, bad digits).
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().ok()?;
        Some(OperatorKey(arr))
    }
}

impl std::fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Ed25519 detached signature bytes over a canonical block header.
///
/// The encoding is scheme-specific: verifiers expect exactly
/// [`SIGNATURE_LEN`] bytes. Anything else fails verification instead of
/// panicking.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Renders the signature as lowercase hex without a prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parses a hex-encoded signature. Length is checked at verify time,
    /// not here; this only rejects non-hex input.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(Signature)
    }
}

/// Errors raised when decoding wire (hex/JSON) forms into typed values.
#[derive(Debug)]
pub enum WireError {
    /// A hex field failed to decode or had the wrong length.
    BadHex(&'static str),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::BadHex(field) => write!(f, "malformed hex in field `{field}`"),
        }
    }
}

impl std::error::Error for WireError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        // FIPS 180-2 test vector for "abc".
        let h = Hash256::compute(b"abc");
        assert_eq!(
            h.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_roundtrip_is_lossless() {
        let h = Hash256::compute(b"roundtrip");
        let parsed = Hash256::from_hex(&h.to_hex()).expect("valid hex should parse");
        assert_eq!(parsed, h);
    }

    #[test]
    fn malformed_hex_is_rejected_not_panicked() {
        assert!(Hash256::from_hex("zz").is_none());
        assert!(Hash256::from_hex("abcd").is_none());
        assert!(OperatorKey::from_hex("0x1234").is_none());
        assert!(Signature::from_hex("not hex").is_none());
    }
}
