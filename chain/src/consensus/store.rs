//! Storage abstraction used by the chain manager.
//!
//! The interface is intentionally small: the manager needs ordered,
//! slot-unique persistence with O(1) head lookup, bounded range reads,
//! and an integrity audit. Implementations can be backed by an embedded
//! database, a rewrite-on-mutation file, or plain memory; the
//! implementation is chosen once at construction, never per call.

use crate::crypto::merkle_root;
use crate::types::{Block, Hash256, genesis_prev_hash};

use super::error::StoreError;

/// Point-in-time snapshot of store contents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreStats {
    /// Number of blocks currently held.
    pub total_blocks: u64,
    /// Highest slot present, if any.
    pub head_slot: Option<u64>,
    /// Lowest slot present, if any. Usually 0; higher after capacity
    /// trimming or a partial import.
    pub genesis_slot: Option<u64>,
    /// Sum of judgment references across all held blocks.
    pub total_judgments: u64,
}

/// One defect found by the integrity audit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum IntegrityIssue {
    /// A slot inside the held range has no block.
    MissingSlot(u64),
    /// `prev_hash` does not match the previous block's hash.
    BrokenParentLink { slot: u64 },
    /// Recomputed Merkle root disagrees with `judgments_root`.
    MerkleRootMismatch { slot: u64 },
    /// Genesis `prev_hash` is not the chain constant.
    BadGenesisPrevHash,
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::MissingSlot(slot) => write!(f, "slot {slot} is missing"),
            IntegrityIssue::BrokenParentLink { slot } => {
                write!(f, "slot {slot} does not link to its parent")
            }
            IntegrityIssue::MerkleRootMismatch { slot } => {
                write!(f, "slot {slot} has a mismatched judgments root")
            }
            IntegrityIssue::BadGenesisPrevHash => {
                write!(f, "genesis prev_hash is not the chain constant")
            }
        }
    }
}

/// Result of a full-chain integrity audit.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    /// True when no issues were found.
    pub valid: bool,
    /// Number of blocks examined.
    pub blocks_checked: u64,
    /// Every defect found; the walk never stops early.
    pub errors: Vec<IntegrityIssue>,
}

/// Abstract storage interface for chain blocks.
///
/// Contract highlights:
///
/// - `put_block` is the only mutation; it enforces slot uniqueness,
///   contiguity against the current head, and parent linkage, and the
///   block is durable before it returns.
/// - Read operations are infallible snapshots; backends translate their
///   own failures into empty results and log them.
pub trait ChainStore {
    /// Appends a block. See [`StoreError`] for the rejection taxonomy.
    fn put_block(&mut self, block: &Block) -> Result<(), StoreError>;

    /// Returns the highest-slot block, if any.
    fn head(&self) -> Option<Block>;

    /// Exact-slot lookup.
    fn by_slot(&self, slot: u64) -> Option<Block>;

    /// Most recent blocks, descending by slot, at most `limit`.
    fn recent(&self, limit: usize) -> Vec<Block>;

    /// Blocks with slot strictly greater than `slot`, ascending, at
    /// most `limit`.
    fn since(&self, slot: u64, limit: usize) -> Vec<Block>;

    /// Point-in-time stats snapshot.
    fn stats(&self) -> StoreStats;

    /// Walks the full held range verifying slot contiguity, parent
    /// links, and Merkle commitments. Defects are accumulated, never
    /// thrown, and the walk always reaches the head.
    fn verify_integrity(&self) -> IntegrityReport {
        let stats = self.stats();
        let (Some(genesis_slot), Some(head_slot)) = (stats.genesis_slot, stats.head_slot) else {
            // An empty store is trivially consistent.
            return IntegrityReport {
                valid: true,
                blocks_checked: 0,
                errors: Vec::new(),
            };
        };

        let mut errors = Vec::new();
        let mut blocks_checked = 0u64;
        let mut prev: Option<Block> = None;

        for slot in genesis_slot..=head_slot {
            let Some(block) = self.by_slot(slot) else {
                errors.push(IntegrityIssue::MissingSlot(slot));
                prev = None;
                continue;
            };
            blocks_checked += 1;

            if slot == 0 && block.header.prev_hash != genesis_prev_hash() {
                errors.push(IntegrityIssue::BadGenesisPrevHash);
            }

            if let Some(parent) = &prev {
                if block.header.prev_hash != parent.hash.0 {
                    errors.push(IntegrityIssue::BrokenParentLink { slot });
                }
            }

            // The genesis root is a constant, not a Merkle value, and
            // self-built blocks are never empty; only committed leaf
            // sets are re-derivable.
            if !block.judgments.is_empty() {
                let leaves: Vec<Hash256> =
                    block.judgments.iter().map(|j| j.leaf_hash()).collect();
                if merkle_root(&leaves) != block.header.judgments_root {
                    errors.push(IntegrityIssue::MerkleRootMismatch { slot });
                }
            }

            prev = Some(block);
        }

        IntegrityReport {
            valid: errors.is_empty(),
            blocks_checked,
            errors,
        }
    }
}

impl<T: ChainStore + ?Sized> ChainStore for Box<T> {
    fn put_block(&mut self, block: &Block) -> Result<(), StoreError> {
        (**self).put_block(block)
    }

    fn head(&self) -> Option<Block> {
        (**self).head()
    }

    fn by_slot(&self, slot: u64) -> Option<Block> {
        (**self).by_slot(slot)
    }

    fn recent(&self, limit: usize) -> Vec<Block> {
        (**self).recent(limit)
    }

    fn since(&self, slot: u64, limit: usize) -> Vec<Block> {
        (**self).since(slot, limit)
    }

    fn stats(&self) -> StoreStats {
        (**self).stats()
    }

    fn verify_integrity(&self) -> IntegrityReport {
        (**self).verify_integrity()
    }
}
