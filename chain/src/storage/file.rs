//! File-backed chain store.
//!
//! Overlay on top of [`InMemoryChainStore`] that rewrites a single JSON
//! document after every mutation. Chain writes must be durable before
//! `put_block` returns, so the flush is synchronous: serialize the
//! current state to a sibling temp file, then rename over the live one.
//!
//! The on-disk form is internal and may change between versions; the
//! `version` field exists so future readers can migrate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consensus::error::StoreError;
use crate::consensus::store::{ChainStore, StoreStats};
use crate::types::{Block, WireBlock};

use super::mem::{DEFAULT_CAPACITY, DEFAULT_TRIM_TO, InMemoryChainStore};

/// Name of the state document inside the configured directory.
const STATE_FILE: &str = "poj_chain.json";

/// Configuration for [`FileChainStore`].
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    /// Directory the state document lives in. Created if missing.
    pub dir: PathBuf,
    /// In-memory bound before trimming (see [`InMemoryChainStore`]).
    pub capacity: usize,
    /// Retained block count after a trim.
    pub trim_to: usize,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/poj-chain"),
            capacity: DEFAULT_CAPACITY,
            trim_to: DEFAULT_TRIM_TO,
        }
    }
}

/// Serialized shape of the state document.
#[derive(Serialize, Deserialize)]
struct ChainDocument {
    version: u32,
    blocks: Vec<WireBlock>,
}

/// File-backed implementation of [`ChainStore`].
pub struct FileChainStore {
    inner: InMemoryChainStore,
    path: PathBuf,
}

impl FileChainStore {
    /// Opens (or creates) a file-backed store under `cfg.dir`, loading
    /// any previously persisted chain segment.
    pub fn open(cfg: &FileStoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&cfg.dir)
            .map_err(|e| StoreError::Backend(format!("create {}: {e}", cfg.dir.display())))?;

        let path = cfg.dir.join(STATE_FILE);
        let mut inner = InMemoryChainStore::with_capacity(cfg.capacity, cfg.trim_to);

        if path.exists() {
            let raw = fs::read(&path)
                .map_err(|e| StoreError::Backend(format!("read {}: {e}", path.display())))?;
            let doc: ChainDocument = serde_json::from_slice(&raw)
                .map_err(|e| StoreError::Corrupted(format!("state document: {e}")))?;
            for wire in &doc.blocks {
                let block = Block::from_wire(wire)
                    .map_err(|e| StoreError::Corrupted(format!("block {}: {e}", wire.slot)))?;
                // Replaying through put_block re-checks the chain
                // invariants on every load.
                inner.put_block(&block)?;
            }
        }

        Ok(Self { inner, path })
    }

    /// Returns the path of the live state document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        let blocks: Vec<WireBlock> = {
            let mut ascending = self.inner.recent(usize::MAX);
            ascending.reverse();
            ascending.iter().map(Block::to_wire).collect()
        };
        let doc = ChainDocument { version: 1, blocks };
        let bytes = serde_json::to_vec(&doc)
            .map_err(|e| StoreError::Backend(format!("serialize state: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .map_err(|e| StoreError::Backend(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Backend(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl ChainStore for FileChainStore {
    fn put_block(&mut self, block: &Block) -> Result<(), StoreError> {
        self.inner.put_block(block)?;
        if let Err(e) = self.persist() {
            warn!(slot = block.header.slot, error = %e, "chain state flush failed");
            return Err(e);
        }
        Ok(())
    }

    fn head(&self) -> Option<Block> {
        self.inner.head()
    }

    fn by_slot(&self, slot: u64) -> Option<Block> {
        self.inner.by_slot(slot)
    }

    fn recent(&self, limit: usize) -> Vec<Block> {
        self.inner.recent(limit)
    }

    fn since(&self, slot: u64, limit: usize) -> Vec<Block> {
        self.inner.since(slot, limit)
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::merkle_root;
    use crate::types::{
        Hash256, Header, JudgmentRef, genesis_judgments_root, genesis_prev_hash,
    };
    use tempfile::TempDir;

    fn judgment(id: &str) -> JudgmentRef {
        JudgmentRef {
            judgment_id: id.to_string(),
            q_score: None,
            verdict: Some("pass".to_string()),
            timestamp: 1_700_000_000_000,
        }
    }

    fn block_on(prev: Option<&Block>, judgments: Vec<JudgmentRef>) -> Block {
        let (slot, prev_hash, timestamp) = match prev {
            Some(p) => (p.header.slot + 1, p.hash.0, p.header.timestamp + 1),
            None => (0, genesis_prev_hash(), 1_700_000_000_000),
        };
        let judgments_root = if judgments.is_empty() {
            genesis_judgments_root()
        } else {
            let leaves: Vec<Hash256> = judgments.iter().map(|j| j.leaf_hash()).collect();
            merkle_root(&leaves)
        };
        let header = Header {
            slot,
            prev_hash,
            judgments_root,
            timestamp,
            operator: "file-store-test".to_string(),
        };
        let hash = header.compute_hash();
        Block {
            header,
            operator_name: None,
            judgments,
            signature: None,
            hash,
        }
    }

    fn config_for(tmp: &TempDir) -> FileStoreConfig {
        FileStoreConfig {
            dir: tmp.path().to_path_buf(),
            ..FileStoreConfig::default()
        }
    }

    #[test]
    fn state_survives_reopen() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = config_for(&tmp);

        let genesis = block_on(None, Vec::new());
        let next = block_on(Some(&genesis), vec![judgment("j-1")]);
        {
            let mut store = FileChainStore::open(&cfg).expect("open fresh store");
            store.put_block(&genesis).expect("persist genesis");
            store.put_block(&next).expect("persist block 1");
        }

        let reopened = FileChainStore::open(&cfg).expect("reopen store");
        assert_eq!(reopened.stats().total_blocks, 2);
        let head = reopened.head().expect("head after reload");
        assert_eq!(head.header.slot, 1);
        assert_eq!(head.hash, next.hash);
        assert_eq!(head.judgments, next.judgments);
        assert!(reopened.verify_integrity().valid);
    }

    #[test]
    fn every_mutation_rewrites_the_document() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = config_for(&tmp);
        let mut store = FileChainStore::open(&cfg).expect("open store");

        let genesis = block_on(None, Vec::new());
        store.put_block(&genesis).expect("persist genesis");

        let raw = std::fs::read_to_string(store.path()).expect("document exists");
        let doc: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(doc["blocks"].as_array().expect("blocks array").len(), 1);

        let next = block_on(Some(&genesis), vec![judgment("j-1")]);
        store.put_block(&next).expect("persist block 1");

        let raw = std::fs::read_to_string(store.path()).expect("document exists");
        let doc: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(doc["blocks"].as_array().expect("blocks array").len(), 2);
        assert_eq!(doc["blocks"][1]["slot"], 1);
    }

    #[test]
    fn corrupted_document_is_a_typed_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = config_for(&tmp);
        std::fs::write(tmp.path().join(STATE_FILE), b"{ not json").expect("write garbage");

        match FileChainStore::open(&cfg) {
            Err(StoreError::Corrupted(_)) => {}
            other => panic!("expected Corrupted, got {other:?}"),
        }
    }

    #[test]
    fn invariants_still_enforced_through_overlay() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = config_for(&tmp);
        let mut store = FileChainStore::open(&cfg).expect("open store");

        let genesis = block_on(None, Vec::new());
        store.put_block(&genesis).expect("persist genesis");

        let err = store.put_block(&genesis).unwrap_err();
        assert_eq!(err, StoreError::SlotExists(0));
    }
}
