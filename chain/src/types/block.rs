//! Block types, canonical signing payload, and hashing.
//!
//! This module defines the block data structures used by the chain,
//! together with the canonical signing/hashing routine and the hex wire
//! form used when blocks cross process boundaries.
//!
//! Two encodings coexist on purpose:
//!
//! - The **signing payload** is the JSON string
//!   `{"slot":N,"prev_hash":"<hex>","judgments_root":"<hex>","timestamp":N}`
//!   (fixed field order, lowercase hex, no whitespace). Existing chains
//!   were built on this exact form, so it is kept byte-for-byte. The
//!   block hash is SHA-256 over this payload and depends on nothing
//!   else: not the signature, not the operator name, not the judgment
//!   bodies.
//! - The **storage encoding** is bincode 2 via the `serde` integration
//!   (`bincode::serde::encode_to_vec`) with an explicit `standard()`
//!   config. The same canonical encoding is used everywhere we need
//!   block bytes at rest.

use serde::{Deserialize, Serialize};

use super::{Hash256, JudgmentRef, OperatorKey, Signature, WireError};

/// Domain-separation seed hashed into the genesis `prev_hash`.
pub const GENESIS_PREV_SEED: &str = "CYNIC_GENESIS_φ";

/// Seed hashed into the genesis `judgments_root`.
///
/// Deliberately *not* the empty-Merkle sentinel: existing chains commit
/// to `sha256("genesis")` at slot 0, so the anomaly is load-bearing.
pub const GENESIS_ROOT_SEED: &str = "genesis";

/// Returns the constant `prev_hash` every genesis block carries.
pub fn genesis_prev_hash() -> Hash256 {
    Hash256::compute(GENESIS_PREV_SEED.as_bytes())
}

/// Returns the constant `judgments_root` every genesis block carries.
pub fn genesis_judgments_root() -> Hash256 {
    Hash256::compute(GENESIS_ROOT_SEED.as_bytes())
}

/// Strongly-typed block hash.
///
/// This is the content hash of a block header, computed as SHA-256 over
/// the canonical signing payload. Wrapping the underlying [`Hash256`]
/// avoids passing raw byte arrays around in public APIs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    /// Returns the underlying 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; super::HASH_LEN] {
        self.0.as_bytes()
    }

    /// Renders the hash as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Parses a hex-encoded block hash; `None` on malformed input.
    pub fn from_hex(s: &str) -> Option<Self> {
        Hash256::from_hex(s).map(BlockHash)
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

/// Block header: the signable, hashable consensus fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Header {
    /// Dense block index; strictly `prev.slot + 1`. Genesis is slot 0.
    pub slot: u64,

    /// Hash of the previous block. For genesis this is the
    /// domain-separated chain constant.
    pub prev_hash: Hash256,

    /// Binary Merkle root over the judgment-reference leaf hashes.
    pub judgments_root: Hash256,

    /// Wall-clock timestamp in milliseconds. Non-strictly monotonic:
    /// every block satisfies `timestamp >= prev.timestamp`.
    pub timestamp: u64,

    /// Operator identity as lowercase hex. In multi-operator mode this
    /// is a full Ed25519 public key; in legacy single-key mode it is the
    /// 16-character key prefix.
    pub operator: String,
}

/// Serialization order of the signing payload is load-bearing; this
/// private mirror struct pins it.
#[derive(Serialize)]
struct SigningFields<'a> {
    slot: u64,
    prev_hash: &'a str,
    judgments_root: &'a str,
    timestamp: u64,
}

/// Builds the canonical signing payload for a set of header fields.
///
/// This is the single source of truth for both hashing and signing.
pub fn signing_payload(
    slot: u64,
    prev_hash: &Hash256,
    judgments_root: &Hash256,
    timestamp: u64,
) -> String {
    let prev_hex = prev_hash.to_hex();
    let root_hex = judgments_root.to_hex();
    let fields = SigningFields {
        slot,
        prev_hash: &prev_hex,
        judgments_root: &root_hex,
        timestamp,
    };
    serde_json::to_string(&fields).expect("signing payload should always serialize")
}

impl Header {
    /// Returns the canonical signing payload for this header.
    pub fn signing_payload(&self) -> String {
        signing_payload(self.slot, &self.prev_hash, &self.judgments_root, self.timestamp)
    }

    /// Returns the exact bytes an operator signs: the payload with the
    /// operator's public-key hex appended, binding the signature to the
    /// signing identity without affecting the block hash.
    pub fn signing_message(&self, operator: &OperatorKey) -> Vec<u8> {
        let mut msg = self.signing_payload().into_bytes();
        msg.extend_from_slice(operator.to_hex().as_bytes());
        msg
    }

    /// Computes the canonical block hash: SHA-256 over the signing
    /// payload. This must remain stable across nodes for federation to
    /// work.
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash(Hash256::compute(self.signing_payload().as_bytes()))
    }
}

/// Block = header + judgment references + authentication material.
///
/// Blocks are immutable once written; only derived anchor status mutates
/// after the fact, and that lives outside the block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Signable, hashable consensus fields.
    pub header: Header,

    /// Human-readable name of the producing operator, if known. Not
    /// covered by the hash or the signature.
    pub operator_name: Option<String>,

    /// Ordered judgment references committed by `judgments_root`.
    pub judgments: Vec<JudgmentRef>,

    /// Detached Ed25519 signature over the header's signing message.
    /// Absent for legacy single-key blocks.
    pub signature: Option<Signature>,

    /// Canonical hash of the header, stored alongside the block so
    /// readers never need to recompute it.
    pub hash: BlockHash,
}

impl Block {
    /// Returns the canonical byte representation of this block for
    /// storage, using bincode 2 with the `standard()` configuration.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails. This is considered a programming
    /// error, because all fields are required to be serializable.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("Block should always be serializable with bincode 2 + serde")
    }

    /// Decodes a block from its canonical storage bytes.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Option<Block> {
        let cfg = bincode::config::standard();
        let (block, _): (Block, usize) = bincode::serde::decode_from_slice(bytes, cfg).ok()?;
        Some(block)
    }

    /// Number of judgment references in this block.
    pub fn judgment_count(&self) -> usize {
        self.judgments.len()
    }

    /// Converts this block into the hex wire form.
    pub fn to_wire(&self) -> WireBlock {
        WireBlock {
            slot: self.header.slot,
            prev_hash: self.header.prev_hash.to_hex(),
            judgments_root: self.header.judgments_root.to_hex(),
            timestamp: self.header.timestamp,
            operator: self.header.operator.clone(),
            operator_name: self.operator_name.clone(),
            signature: self.signature.as_ref().map(Signature::to_hex),
            judgments: self.judgments.clone(),
            judgment_ids: None,
            hash: self.hash.to_hex(),
        }
    }

    /// Decodes a wire block into the typed form.
    ///
    /// Hex failures surface as typed [`WireError`]s; nothing panics on
    /// untrusted input. The `operator` field is carried through as-is
    /// because legacy operators are truncated key prefixes, not valid
    /// hex keys.
    pub fn from_wire(wire: &WireBlock) -> Result<Block, WireError> {
        let prev_hash =
            Hash256::from_hex(&wire.prev_hash).ok_or(WireError::BadHex("prev_hash"))?;
        let judgments_root =
            Hash256::from_hex(&wire.judgments_root).ok_or(WireError::BadHex("judgments_root"))?;
        let hash = BlockHash::from_hex(&wire.hash).ok_or(WireError::BadHex("hash"))?;
        let signature = match &wire.signature {
            None => None,
            Some(s) => Some(Signature::from_hex(s).ok_or(WireError::BadHex("signature"))?),
        };

        Ok(Block {
            header: Header {
                slot: wire.slot,
                prev_hash,
                judgments_root,
                timestamp: wire.timestamp,
                operator: wire.operator.clone(),
            },
            operator_name: wire.operator_name.clone(),
            judgments: wire.judgments.clone(),
            signature,
            hash,
        })
    }
}

/// Hex/JSON wire form of a block, used for `receive_block` transport and
/// chain export. Hex is lowercase with no prefix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireBlock {
    pub slot: u64,
    pub prev_hash: String,
    pub judgments_root: String,
    pub timestamp: u64,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub judgments: Vec<JudgmentRef>,
    /// Some store read paths ship judgment ids separately; accepted on
    /// ingress, never required, and the full `judgments` list stays
    /// authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgment_ids: Option<Vec<String>>,
    pub hash: String,
}
