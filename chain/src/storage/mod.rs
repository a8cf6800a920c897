//! Storage backends for the chain.
//!
//! This module provides concrete implementations of the
//! [`crate::consensus::store::ChainStore`] trait, including:
//!
//! - an in-memory store ([`mem::InMemoryChainStore`]) with bounded
//!   capacity, used as the degraded fallback and in tests,
//! - a file-backed overlay ([`file::FileChainStore`]) that rewrites a
//!   single JSON state document on every mutation,
//! - a RocksDB-backed store ([`rocksdb::RocksDbChainStore`]) for
//!   durable operator nodes.

pub mod file;
pub mod mem;
pub mod rocksdb;

pub use file::{FileChainStore, FileStoreConfig};
pub use mem::InMemoryChainStore;
pub use self::rocksdb::{RocksDbChainStore, RocksDbConfig};
