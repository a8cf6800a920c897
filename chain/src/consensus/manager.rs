//! Chain manager: pending queue, batching, genesis, block construction
//! and reception, anchoring and finality hooks.
//!
//! One manager instance owns one chain's mutable state: the pending
//! judgment queue, the head, the anchor-status map, and the finality
//! waiters. All entry points (`add_judgment`, `flush`, `receive_block`,
//! timer and anchor callbacks) take `&mut self` and must be serialized
//! by the host: an actor task, a mutex, or a single-threaded loop all
//! work. The manager itself never spawns tasks and never blocks on
//! external systems.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::crypto::merkle_root;
use crate::metrics::MetricsRegistry;
use crate::now_ms;
use crate::registry::OperatorRegistry;
use crate::types::{
    Block, BlockHash, Hash256, Header, JudgmentDraft, JudgmentRef, Signature, WireBlock,
    genesis_judgments_root, genesis_prev_hash,
};

use super::anchor::{AnchorOutcome, AnchorPayload, AnchorQueue, AnchorRecord, AnchorState};
use super::config::ManagerConfig;
use super::error::{ImportError, ReceiveError, RegistryError, StoreError};
use super::store::ChainStore;
use super::timer::BatchTimer;

/// Version tag carried by chain exports.
pub const CHAIN_EXPORT_VERSION: u32 = 1;

/// Manager activity counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChainStats {
    pub blocks_created: u64,
    pub blocks_received: u64,
    pub blocks_rejected: u64,
    pub blocks_anchored: u64,
    pub anchors_failed: u64,
    pub blocks_finalized: u64,
    pub finality_timeouts: u64,
    pub store_errors: u64,
}

/// Point-in-time view of the manager, for status surfaces.
#[derive(Clone, Debug)]
pub struct ChainStatus {
    pub head_slot: Option<u64>,
    pub head_hash: Option<String>,
    pub pending_judgments: usize,
    pub stats: ChainStats,
    /// Registry quorum, absent in legacy single-key mode.
    pub quorum: Option<bool>,
    /// Registered operator count, absent in legacy single-key mode.
    pub operator_count: Option<usize>,
    pub p2p_enabled: bool,
    pub p2p_node_url: Option<String>,
}

/// Peer-network finality notification.
#[derive(Clone, Debug)]
pub struct FinalityEvent {
    pub block_hash: BlockHash,
    pub slot: u64,
    /// Opaque peer-layer status tag.
    pub status: String,
    pub confirmations: u32,
}

/// Terminal state of a finality waiter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FinalityResult {
    Finalized { slot: u64, confirmations: u32 },
    TimedOut,
    Closed,
}

struct FinalityWaiter {
    block: Block,
    /// Absolute deadline in milliseconds.
    deadline: u64,
    notify: Option<oneshot::Sender<FinalityResult>>,
}

/// Portable chain snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainExport {
    pub version: u32,
    #[serde(rename = "exportedAt")]
    pub exported_at: u64,
    pub blocks: Vec<WireBlock>,
    #[serde(rename = "totalBlocks")]
    pub total_blocks: usize,
}

/// Options for [`ChainManager::import_chain`].
#[derive(Clone, Copy, Debug)]
pub struct ImportOptions {
    /// Verify that consecutive imported blocks link hash-to-hash.
    pub validate_links: bool,
    /// Silently skip slots already present in the store.
    pub skip_existing: bool,
    /// Ignore exported blocks below this slot.
    pub from_block: Option<u64>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            validate_links: true,
            skip_existing: true,
            from_block: None,
        }
    }
}

/// Result of a chain import.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChainImportOutcome {
    pub imported: usize,
    pub skipped: usize,
}

/// The chain manager.
///
/// Generic over the storage backend and the batch-timer capability so
/// hosts choose both at construction; the manager never switches either
/// at runtime.
pub struct ChainManager<S: ChainStore, T: BatchTimer> {
    config: ManagerConfig,
    store: S,
    timer: T,
    registry: Option<OperatorRegistry>,
    legacy_key: String,
    head: Option<Block>,
    pending: VecDeque<JudgmentRef>,
    anchor_queue: Option<Box<dyn AnchorQueue + Send>>,
    anchor_status: HashMap<BlockHash, AnchorRecord>,
    pending_finality: HashMap<BlockHash, FinalityWaiter>,
    on_block_created: Option<Box<dyn Fn(&Block) + Send>>,
    metrics: Option<Arc<MetricsRegistry>>,
    stats: ChainStats,
    initialized: bool,
    closed: bool,
}

impl<S: ChainStore, T: BatchTimer> ChainManager<S, T> {
    /// Creates a manager in legacy single-key mode. Attach a registry
    /// with [`with_registry`](Self::with_registry) for multi-operator
    /// mode.
    pub fn new(config: ManagerConfig, store: S, timer: T) -> Self {
        let legacy_key = config.legacy_operator_key.clone().unwrap_or_else(|| {
            // Generated here, at construction, never at module load.
            let bytes: [u8; 32] = rand::random();
            hex::encode(bytes)
        });
        Self {
            config,
            store,
            timer,
            registry: None,
            legacy_key,
            head: None,
            pending: VecDeque::new(),
            anchor_queue: None,
            anchor_status: HashMap::new(),
            pending_finality: HashMap::new(),
            on_block_created: None,
            metrics: None,
            stats: ChainStats::default(),
            initialized: false,
            closed: false,
        }
    }

    /// Attaches an operator registry, switching the manager into
    /// multi-operator mode.
    pub fn with_registry(mut self, registry: OperatorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attaches the external anchor queue.
    pub fn with_anchor_queue(mut self, queue: Box<dyn AnchorQueue + Send>) -> Self {
        self.anchor_queue = Some(queue);
        self
    }

    /// Attaches the block-created callback. Panics inside the callback
    /// are swallowed and never fail block creation.
    pub fn with_block_callback(mut self, callback: Box<dyn Fn(&Block) + Send>) -> Self {
        self.on_block_created = Some(callback);
        self
    }

    /// Attaches a metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a mutable reference to the underlying store.
    ///
    /// Mainly useful for tests and tooling; chain logic should go
    /// through the manager's own operations.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The attached registry, if any.
    pub fn registry(&self) -> Option<&OperatorRegistry> {
        self.registry.as_ref()
    }

    /// Mutable access to the attached registry.
    pub fn registry_mut(&mut self) -> Option<&mut OperatorRegistry> {
        self.registry.as_mut()
    }

    /// Current head block, if initialized.
    pub fn head(&self) -> Option<&Block> {
        self.head.as_ref()
    }

    /// Number of judgments awaiting batching.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> ChainStats {
        self.stats
    }

    /// Anchor status for a block hash, if tracked.
    pub fn anchor_status(&self, hash: &BlockHash) -> Option<&AnchorRecord> {
        self.anchor_status.get(hash)
    }

    /// Whether the batch timer is currently armed.
    pub fn batch_timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Point-in-time status snapshot.
    pub fn status(&self) -> ChainStatus {
        ChainStatus {
            head_slot: self.head.as_ref().map(|b| b.header.slot),
            head_hash: self.head.as_ref().map(|b| b.hash.to_hex()),
            pending_judgments: self.pending.len(),
            stats: self.stats,
            quorum: self.registry.as_ref().map(OperatorRegistry::has_quorum),
            operator_count: self.registry.as_ref().map(OperatorRegistry::operator_count),
            p2p_enabled: self.config.p2p_enabled,
            p2p_node_url: self.config.p2p_node_url.clone(),
        }
    }

    /// Loads the head from the store, synthesizing genesis when the
    /// chain is empty. Idempotent: a second call is a no-op.
    pub fn initialize(&mut self) -> Result<(), StoreError> {
        if self.initialized {
            return Ok(());
        }

        match self.store.head() {
            Some(head) => {
                self.head = Some(head);
            }
            None => {
                let timestamp = now_ms();
                let (header, operator_name, signature) = match self.signed_header(
                    0,
                    genesis_prev_hash(),
                    genesis_judgments_root(),
                    timestamp,
                ) {
                    Ok(parts) => parts,
                    Err(e) => {
                        // A registry without a signing identity still
                        // gets a chain; the genesis just goes out
                        // unsigned like a legacy block.
                        warn!(error = %e, "genesis signing unavailable; writing unsigned genesis");
                        self.legacy_header(0, genesis_prev_hash(), genesis_judgments_root(), timestamp)
                    }
                };
                let hash = header.compute_hash();
                let genesis = Block {
                    header,
                    operator_name,
                    judgments: Vec::new(),
                    signature,
                    hash,
                };
                self.store.put_block(&genesis)?;
                self.head = Some(genesis);
            }
        }

        self.initialized = true;
        Ok(())
    }

    /// Normalizes a draft into a judgment reference and queues it.
    ///
    /// Returns the block created by this call when the queue reached
    /// `batch_size`; otherwise arms the batch timer and returns `None`.
    pub fn add_judgment(&mut self, draft: JudgmentDraft) -> Option<Block> {
        let judgment = JudgmentRef {
            judgment_id: draft
                .judgment_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(generate_judgment_id),
            q_score: draft.q_score.map(|score| score.min(100)),
            verdict: draft.verdict,
            timestamp: draft.timestamp.unwrap_or_else(now_ms),
        };
        self.pending.push_back(judgment);
        self.update_pending_gauge();

        if self.pending.len() >= self.config.batch_size {
            self.create_block()
        } else {
            if !self.timer.is_armed() {
                self.timer.arm(self.config.batch_timeout);
            }
            None
        }
    }

    /// Forces block creation from whatever is pending.
    pub fn flush(&mut self) -> Option<Block> {
        self.create_block()
    }

    /// Host entry point for batch-timer expiry.
    pub fn on_batch_timer(&mut self) -> Option<Block> {
        if self.pending.is_empty() {
            self.timer.cancel();
            return None;
        }
        self.create_block()
    }

    /// Flushes pending judgments best-effort, cancels the timer, and
    /// rejects outstanding finality waiters. Never fails; persistence
    /// errors during close are logged and absorbed. Anchor callbacks
    /// arriving afterwards are dropped.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if !self.pending.is_empty() && self.create_block().is_none() && !self.pending.is_empty() {
            warn!(
                pending = self.pending.len(),
                "pending judgments were not persisted during close"
            );
        }
        self.timer.cancel();
        for (_, mut waiter) in self.pending_finality.drain() {
            if let Some(tx) = waiter.notify.take() {
                let _ = tx.send(FinalityResult::Closed);
            }
        }
        self.closed = true;
    }

    fn create_block(&mut self) -> Option<Block> {
        if self.pending.is_empty() {
            return None;
        }
        let Some(head) = self.head.clone() else {
            warn!("create_block called before initialize");
            return None;
        };

        self.timer.cancel();
        let started = Instant::now();
        let batch: Vec<JudgmentRef> = self.pending.drain(..).collect();

        let leaves: Vec<Hash256> = batch.iter().map(JudgmentRef::leaf_hash).collect();
        let judgments_root = merkle_root(&leaves);
        let slot = head.header.slot + 1;
        let prev_hash = head.hash.0;
        let timestamp = now_ms().max(head.header.timestamp);

        let (header, operator_name, signature) =
            match self.signed_header(slot, prev_hash, judgments_root, timestamp) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(slot, error = %e, "block signing failed; batch restored");
                    self.restore_pending(batch);
                    return None;
                }
            };
        let hash = header.compute_hash();
        let block = Block {
            header,
            operator_name,
            judgments: batch.clone(),
            signature,
            hash,
        };

        if let Err(e) = self.store.put_block(&block) {
            warn!(slot, error = %e, "block write failed; batch restored");
            self.restore_pending(batch);
            self.stats.store_errors += 1;
            return None;
        }

        self.head = Some(block.clone());
        self.stats.blocks_created += 1;
        self.update_pending_gauge();
        if let Some(metrics) = &self.metrics {
            metrics.chain.blocks_created.inc();
            metrics
                .chain
                .block_build_seconds
                .observe(started.elapsed().as_secs_f64());
        }

        if let Some(callback) = &self.on_block_created {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&block))).is_err() {
                warn!(slot, "block-created callback panicked; ignored");
            }
        }

        self.after_commit(&block);
        Some(block)
    }

    /// Validates and appends a block produced by a peer operator.
    ///
    /// Checks run in a fixed order and the first failure wins; there is
    /// never partial acceptance. Every rejection bumps
    /// `blocks_rejected`.
    pub fn receive_block(&mut self, block: Block) -> Result<(), ReceiveError> {
        match self.validate_and_append(block) {
            Ok(()) => {
                self.stats.blocks_received += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.chain.blocks_received.inc();
                }
                Ok(())
            }
            Err(e) => {
                self.stats.blocks_rejected += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.chain.blocks_rejected.inc();
                }
                Err(e)
            }
        }
    }

    fn validate_and_append(&mut self, block: Block) -> Result<(), ReceiveError> {
        if !self.initialized {
            return Err(ReceiveError::StoreUnavailable);
        }
        let head = self.head.clone().ok_or(ReceiveError::StoreUnavailable)?;

        if block.header.operator.is_empty() {
            return Err(ReceiveError::NoOperator);
        }
        if self.config.require_signatures && block.signature.is_none() {
            return Err(ReceiveError::MissingSignature);
        }
        if self.config.verify_received_blocks {
            if let Some(registry) = self.registry.as_mut() {
                registry.verify_block(&block)?;
            }
        }

        let expected = head.header.slot + 1;
        if block.header.slot != expected {
            return Err(ReceiveError::SlotMismatch {
                expected,
                got: block.header.slot,
            });
        }
        if block.header.prev_hash != head.hash.0 {
            return Err(ReceiveError::ParentMismatch);
        }

        let leaves: Vec<Hash256> = block.judgments.iter().map(JudgmentRef::leaf_hash).collect();
        if merkle_root(&leaves) != block.header.judgments_root {
            return Err(ReceiveError::MerkleMismatch);
        }
        if block.header.compute_hash() != block.hash {
            return Err(ReceiveError::HashMismatch);
        }

        self.store.put_block(&block)?;
        self.head = Some(block);
        Ok(())
    }

    /// Anchor-queue completion callback. Unknown hashes and callbacks
    /// after close are dropped with a diagnostic.
    pub fn on_anchor_complete(&mut self, outcome: AnchorOutcome) {
        if self.closed {
            debug!(slot = outcome.slot, "anchor callback after close dropped");
            return;
        }
        let Some(record) = self.anchor_status.get_mut(&outcome.block_hash) else {
            debug!(slot = outcome.slot, "anchor callback for unknown block dropped");
            return;
        };

        if outcome.success {
            record.state = AnchorState::Anchored;
            record.signature = outcome.signature;
            record.error = None;
            self.stats.blocks_anchored += 1;
            if let Some(metrics) = &self.metrics {
                metrics.chain.blocks_anchored.inc();
            }
        } else {
            record.state = AnchorState::Failed;
            record.error = outcome
                .error
                .or_else(|| Some("anchoring failed".to_string()));
            self.stats.anchors_failed += 1;
            if let Some(metrics) = &self.metrics {
                metrics.chain.anchors_failed.inc();
            }
        }
    }

    /// Peer-network finality callback. Resolves the waiter and, with
    /// `auto_anchor`, hands the block to the anchor queue at this point
    /// instead of at creation.
    pub fn on_block_finalized(&mut self, event: FinalityEvent) {
        if self.closed {
            return;
        }
        let Some(mut waiter) = self.pending_finality.remove(&event.block_hash) else {
            debug!(slot = event.slot, status = %event.status, "finality event for unknown block dropped");
            return;
        };

        self.stats.blocks_finalized += 1;
        if let Some(tx) = waiter.notify.take() {
            let _ = tx.send(FinalityResult::Finalized {
                slot: event.slot,
                confirmations: event.confirmations,
            });
        }
        if self.config.auto_anchor && self.anchor_queue.is_some() {
            self.enqueue_anchor(&waiter.block);
        }
    }

    /// Expires finality waiters whose deadline has passed. Host-driven;
    /// call it from the same loop that serializes the other entry
    /// points. Returns the number of expired waiters.
    pub fn check_finality_timeouts(&mut self) -> usize {
        let now = now_ms();
        let expired: Vec<BlockHash> = self
            .pending_finality
            .iter()
            .filter(|(_, waiter)| waiter.deadline <= now)
            .map(|(hash, _)| *hash)
            .collect();

        for hash in &expired {
            if let Some(mut waiter) = self.pending_finality.remove(hash) {
                self.stats.finality_timeouts += 1;
                if let Some(tx) = waiter.notify.take() {
                    let _ = tx.send(FinalityResult::TimedOut);
                }
            }
        }
        expired.len()
    }

    /// Subscribes to the finality resolution of a waiting block.
    pub fn subscribe_finality(
        &mut self,
        hash: &BlockHash,
    ) -> Option<oneshot::Receiver<FinalityResult>> {
        let waiter = self.pending_finality.get_mut(hash)?;
        let (tx, rx) = oneshot::channel();
        waiter.notify = Some(tx);
        Some(rx)
    }

    /// Exports the full held chain segment.
    pub fn export_chain(&self) -> ChainExport {
        let stats = self.store.stats();
        let mut blocks = Vec::new();
        if let (Some(genesis), Some(head)) = (stats.genesis_slot, stats.head_slot) {
            for slot in genesis..=head {
                if let Some(block) = self.store.by_slot(slot) {
                    blocks.push(block.to_wire());
                }
            }
        }
        ChainExport {
            version: CHAIN_EXPORT_VERSION,
            exported_at: now_ms(),
            total_blocks: blocks.len(),
            blocks,
        }
    }

    /// Imports an exported chain, ascending by slot.
    ///
    /// With `validate_links` every non-first block must link to the hash
    /// of the block before it in the import; the import fails reporting
    /// *all* offending slots.
    pub fn import_chain(
        &mut self,
        export: &ChainExport,
        options: ImportOptions,
    ) -> Result<ChainImportOutcome, ImportError> {
        let mut decoded = Vec::with_capacity(export.blocks.len());
        for wire in &export.blocks {
            let block = Block::from_wire(wire).map_err(|_| ImportError::Decode(wire.slot))?;
            decoded.push(block);
        }
        decoded.sort_by_key(|b| b.header.slot);
        if let Some(from) = options.from_block {
            decoded.retain(|b| b.header.slot >= from);
        }

        if options.validate_links {
            let offending: Vec<u64> = decoded
                .windows(2)
                .filter(|pair| pair[1].header.prev_hash != pair[0].hash.0)
                .map(|pair| pair[1].header.slot)
                .collect();
            if !offending.is_empty() {
                return Err(ImportError::BrokenLinks(offending));
            }
        }

        let mut outcome = ChainImportOutcome::default();
        for block in decoded {
            if options.skip_existing && self.store.by_slot(block.header.slot).is_some() {
                outcome.skipped += 1;
                continue;
            }
            self.store.put_block(&block)?;
            outcome.imported += 1;
        }

        self.head = self.store.head();
        if self.head.is_some() {
            self.initialized = true;
        }
        Ok(outcome)
    }

    fn signed_header(
        &mut self,
        slot: u64,
        prev_hash: Hash256,
        judgments_root: Hash256,
        timestamp: u64,
    ) -> Result<(Header, Option<String>, Option<Signature>), RegistryError> {
        match self.registry.as_mut() {
            Some(registry) => {
                let signed = registry.sign_block(slot, prev_hash, judgments_root, timestamp)?;
                Ok((signed.header, signed.operator_name, Some(signed.signature)))
            }
            None => Ok(self.legacy_header(slot, prev_hash, judgments_root, timestamp)),
        }
    }

    fn legacy_header(
        &self,
        slot: u64,
        prev_hash: Hash256,
        judgments_root: Hash256,
        timestamp: u64,
    ) -> (Header, Option<String>, Option<Signature>) {
        let prefix = self.legacy_key.len().min(16);
        let header = Header {
            slot,
            prev_hash,
            judgments_root,
            timestamp,
            operator: self.legacy_key[..prefix].to_string(),
        };
        (header, None, None)
    }

    fn restore_pending(&mut self, batch: Vec<JudgmentRef>) {
        for judgment in batch.into_iter().rev() {
            self.pending.push_front(judgment);
        }
        self.update_pending_gauge();
    }

    fn after_commit(&mut self, block: &Block) {
        let record = AnchorRecord {
            state: AnchorState::Pending,
            slot: block.header.slot,
            attempts: 0,
            signature: None,
            error: None,
        };
        self.anchor_status.insert(block.hash, record);

        if self.config.p2p_enabled {
            // Anchoring waits for peer finality; install the waiter.
            let deadline = now_ms() + self.config.finality_timeout.as_millis() as u64;
            self.pending_finality.insert(
                block.hash,
                FinalityWaiter {
                    block: block.clone(),
                    deadline,
                    notify: None,
                },
            );
        } else if self.config.auto_anchor && self.anchor_queue.is_some() {
            self.enqueue_anchor(block);
        }
        // Otherwise the status stays Pending and nothing is enqueued.
    }

    fn enqueue_anchor(&mut self, block: &Block) {
        let Some(queue) = self.anchor_queue.as_mut() else {
            return;
        };
        let payload = AnchorPayload {
            hash: block.hash,
            slot: block.header.slot,
            judgments_root: block.header.judgments_root,
            timestamp: block.header.timestamp,
            judgment_count: block.judgment_count(),
        };
        let id = format!("poj_block_{}", block.header.slot);
        queue.enqueue(&id, &payload);

        let record = self
            .anchor_status
            .entry(block.hash)
            .or_insert_with(|| AnchorRecord {
                state: AnchorState::Pending,
                slot: block.header.slot,
                attempts: 0,
                signature: None,
                error: None,
            });
        record.state = AnchorState::Queued;
        record.attempts += 1;
    }

    fn update_pending_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.chain.pending_judgments.set(self.pending.len() as i64);
        }
    }
}

fn generate_judgment_id() -> String {
    let suffix: [u8; 4] = rand::random();
    format!("judgment_{}_{}", now_ms(), hex::encode(suffix))
}
