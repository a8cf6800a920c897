//! Proof-of-Judgment chain library crate.
//!
//! This crate provides the core building blocks for a hash-linked,
//! operator-signed, batched append-only log of judgment records:
//!
//! - strongly-typed domain types and canonical codecs (`types`),
//! - Ed25519/SHA-256 primitives and the Merkle rule (`crypto`),
//! - the operator registry (`registry`),
//! - the batching chain manager with federation, anchoring, and
//!   finality seams (`consensus`),
//! - storage backends (`storage`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries can compose these pieces to build operator
//! nodes, replicas, and experiment harnesses.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{MemStoreConfig, MetricsConfig, PojConfig, StoreBackend};

// Re-export "core" chain types and traits.
pub use consensus::{
    AnchorOutcome, AnchorPayload, AnchorQueue, AnchorRecord, AnchorState, BatchTimer,
    BlockVerifyError, CHAIN_EXPORT_VERSION, ChainExport, ChainImportOutcome, ChainManager,
    ChainStats, ChainStatus, ChainStore, FinalityEvent, FinalityResult, ImportError,
    ImportOptions, IntegrityIssue, IntegrityReport, ManagerConfig, ManualTimer, ReceiveError,
    RegistryError, StoreError, StoreStats, TokioBatchTimer,
};

// Re-export registry types.
pub use registry::{
    OperatorExport, OperatorImportOutcome, OperatorRecord, OperatorRegistry, OperatorSpec,
    RegisterOutcome, RegistryConfig, RegistryObserver, RegistryStats, SelfOperatorSpec,
    SignedHeader,
};

// Re-export storage backends.
pub use storage::{
    FileChainStore, FileStoreConfig, InMemoryChainStore, RocksDbChainStore, RocksDbConfig,
};

// Re-export metrics registry and chain metrics.
pub use metrics::{ChainMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default block store backend.
pub type DefaultChainStore = RocksDbChainStore;

/// Type alias for the default chain manager stack.
///
/// This uses:
///
/// - [`DefaultChainStore`] (RocksDB),
/// - [`TokioBatchTimer`] for batch timeouts.
pub type DefaultChainManager = ChainManager<DefaultChainStore, TokioBatchTimer>;

/// Chain manager over a backend chosen at runtime via
/// [`StoreBackend::open`].
pub type BoxedChainManager = ChainManager<Box<dyn ChainStore + Send>, TokioBatchTimer>;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
