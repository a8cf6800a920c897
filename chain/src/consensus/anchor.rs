//! External anchoring seam.
//!
//! Anchoring submits block commitments to an external settlement layer.
//! The transport and queueing machinery live outside the core: the
//! manager only pushes payloads into an [`AnchorQueue`] and later
//! receives an [`AnchorOutcome`] callback. Everything here is
//! fire-and-forget; the manager never blocks on anchoring.

use serde::{Deserialize, Serialize};

use crate::types::{BlockHash, Hash256};

/// Per-block anchoring lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AnchorState {
    /// Block exists but was never handed to a queue (none configured,
    /// or finality still outstanding).
    Pending,
    /// Handed to the anchor queue, waiting for completion.
    Queued,
    /// The settlement layer acknowledged the anchor.
    Anchored,
    /// The settlement layer reported failure.
    Failed,
}

/// Anchor status tracked per block hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub state: AnchorState,
    pub slot: u64,
    /// Enqueue attempts so far.
    pub attempts: u32,
    /// Settlement-layer receipt, once anchored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Last failure message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Commitment payload handed to the anchor queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorPayload {
    pub hash: BlockHash,
    pub slot: u64,
    pub judgments_root: Hash256,
    pub timestamp: u64,
    pub judgment_count: usize,
}

/// Completion callback payload from the anchor queue.
#[derive(Clone, Debug)]
pub struct AnchorOutcome {
    /// Hash of the block the settlement attempt was for.
    pub block_hash: BlockHash,
    pub slot: u64,
    pub success: bool,
    /// Settlement receipt on success.
    pub signature: Option<String>,
    /// Failure message on error.
    pub error: Option<String>,
    /// Settlement-layer completion time, milliseconds.
    pub timestamp: u64,
}

/// Opaque external anchor queue.
///
/// Implementations deliver payloads to a settlement layer however they
/// like (batched, retried, rate-limited) and eventually call
/// [`ChainManager::on_anchor_complete`](crate::consensus::ChainManager::on_anchor_complete)
/// with the result.
pub trait AnchorQueue {
    /// Accepts a commitment for asynchronous anchoring. Must not block.
    fn enqueue(&mut self, id: &str, payload: &AnchorPayload);
}
