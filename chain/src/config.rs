//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - the chain manager (`ManagerConfig`),
//! - the operator registry (`RegistryConfig`),
//! - storage backend selection (`StoreBackend`),
//! - the metrics exporter (enable flag + listen address).
//!
//! The goal is to have a single `PojConfig` struct that higher-level
//! binaries can construct from defaults, config files, or environment
//! variables as needed.

use std::net::SocketAddr;

use crate::consensus::error::StoreError;
use crate::consensus::store::ChainStore;
use crate::consensus::ManagerConfig;
use crate::registry::RegistryConfig;
use crate::storage::mem::{DEFAULT_CAPACITY, DEFAULT_TRIM_TO};
use crate::storage::{
    FileChainStore, FileStoreConfig, InMemoryChainStore, RocksDbChainStore, RocksDbConfig,
};

/// Bounds for the degraded in-memory store.
#[derive(Clone, Copy, Debug)]
pub struct MemStoreConfig {
    pub capacity: usize,
    pub trim_to: usize,
}

impl Default for MemStoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            trim_to: DEFAULT_TRIM_TO,
        }
    }
}

/// Which store backend to run on. Selected once at construction; the
/// manager never switches backends per call.
#[derive(Clone, Debug)]
pub enum StoreBackend {
    /// Durable embedded database (RocksDB).
    Database(RocksDbConfig),
    /// Single rewrite-on-mutation JSON document.
    File(FileStoreConfig),
    /// Degraded in-memory fallback.
    Memory(MemStoreConfig),
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Database(RocksDbConfig::default())
    }
}

impl StoreBackend {
    /// Opens the configured backend.
    pub fn open(&self) -> Result<Box<dyn ChainStore + Send>, StoreError> {
        match self {
            StoreBackend::Database(cfg) => Ok(Box::new(RocksDbChainStore::open(cfg)?)),
            StoreBackend::File(cfg) => Ok(Box::new(FileChainStore::open(cfg)?)),
            StoreBackend::Memory(cfg) => Ok(Box::new(InMemoryChainStore::with_capacity(
                cfg.capacity,
                cfg.trim_to,
            ))),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a chain node.
///
/// This aggregates all the sub-configs needed to wire up a typical
/// node:
///
/// - batching and federation tuning (`manager`),
/// - operator identity limits (`registry`),
/// - storage backend (`store`),
/// - Prometheus metrics exporter (`metrics`).
#[derive(Clone, Debug, Default)]
pub struct PojConfig {
    pub manager: ManagerConfig,
    pub registry: RegistryConfig,
    pub store: StoreBackend,
    pub metrics: MetricsConfig,
}
