//! Chain manager and related abstractions.
//!
//! This module provides the consensus-facing core of the node:
//!
//! - configuration parameters ([`config::ManagerConfig`]),
//! - the typed error taxonomy ([`error`]),
//! - the storage seam ([`store::ChainStore`]) with the integrity
//!   auditor,
//! - the batch-timer capability ([`timer::BatchTimer`]),
//! - the external anchoring seam ([`anchor::AnchorQueue`]),
//! - and the [`manager::ChainManager`] that ties them together.

pub mod anchor;
pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod timer;

pub use anchor::{AnchorOutcome, AnchorPayload, AnchorQueue, AnchorRecord, AnchorState};
pub use config::ManagerConfig;
pub use error::{
    BlockVerifyError, ImportError, ReceiveError, RegistryError, StoreError,
};
pub use manager::{
    CHAIN_EXPORT_VERSION, ChainExport, ChainImportOutcome, ChainManager, ChainStats, ChainStatus,
    FinalityEvent, FinalityResult, ImportOptions,
};
pub use store::{ChainStore, IntegrityIssue, IntegrityReport, StoreStats};
pub use timer::{BatchTimer, ManualTimer, TokioBatchTimer};
