//! RocksDB-backed chain store.
//!
//! This implementation persists blocks and chain metadata in a RocksDB
//! instance with dedicated column families:
//!
//! - `"blocks"`: maps big-endian slot (8 bytes) -> canonical block bytes,
//! - `"meta"`:   head/genesis slots and running counters.
//!
//! Block values use the canonical bincode-2 encoding from
//! [`Block::canonical_bytes`]. Every `put_block` writes the block and
//! all metadata in a single atomic `WriteBatch`, so the store never
//! observes a half-applied append.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use tracing::warn;

use crate::consensus::error::StoreError;
use crate::consensus::store::{ChainStore, StoreStats};
use crate::types::Block;

/// Configuration for [`RocksDbChainStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if
    /// they do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/poj-db".to_string(),
            create_if_missing: true,
        }
    }
}

const META_HEAD_SLOT: &[u8] = b"head_slot";
const META_GENESIS_SLOT: &[u8] = b"genesis_slot";
const META_TOTAL_BLOCKS: &[u8] = b"total_blocks";
const META_TOTAL_JUDGMENTS: &[u8] = b"total_judgments";

/// RocksDB-backed implementation of [`ChainStore`].
pub struct RocksDbChainStore {
    db: DB,
}

impl RocksDbChainStore {
    /// Opens (or creates) a RocksDB-backed chain store at the given
    /// path. Sets up the `"blocks"` and `"meta"` column families; the
    /// `"default"` family is created to keep RocksDB happy but is not
    /// used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StoreError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new("blocks", Options::default()),
            ColumnFamilyDescriptor::new("meta", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { db })
    }

    fn cf_blocks(&self) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle("blocks")
            .ok_or_else(|| StoreError::Corrupted("missing 'blocks' column family".to_string()))
    }

    fn cf_meta(&self) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle("meta")
            .ok_or_else(|| StoreError::Corrupted("missing 'meta' column family".to_string()))
    }

    fn slot_key(slot: u64) -> [u8; 8] {
        slot.to_be_bytes()
    }

    fn decode_u64(bytes: &[u8]) -> Option<u64> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(u64::from_be_bytes(arr))
    }

    fn load_meta_u64(&self, key: &[u8]) -> Result<Option<u64>, StoreError> {
        let cf = self.cf_meta()?;
        match self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            None => Ok(None),
            Some(bytes) => Self::decode_u64(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Corrupted("meta counter width".to_string())),
        }
    }

    fn load_block(&self, slot: u64) -> Result<Option<Block>, StoreError> {
        let cf = self.cf_blocks()?;
        match self
            .db
            .get_cf(&cf, Self::slot_key(slot))
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            None => Ok(None),
            Some(bytes) => Block::from_canonical_bytes(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Corrupted(format!("block bytes at slot {slot}"))),
        }
    }
}

impl ChainStore for RocksDbChainStore {
    fn put_block(&mut self, block: &Block) -> Result<(), StoreError> {
        let slot = block.header.slot;
        let head_slot = self.load_meta_u64(META_HEAD_SLOT)?;

        if let Some(head_slot) = head_slot {
            if slot <= head_slot {
                return Err(StoreError::SlotExists(slot));
            }
            if slot != head_slot + 1 {
                return Err(StoreError::SlotGap {
                    expected: head_slot + 1,
                    got: slot,
                });
            }
            let head = self
                .load_block(head_slot)?
                .ok_or_else(|| StoreError::Corrupted(format!("head block {head_slot} missing")))?;
            if block.header.prev_hash != head.hash.0 {
                return Err(StoreError::ParentMismatch { slot });
            }
        }
        // An empty database accepts any starting slot; see the
        // in-memory store for the segment-seeding rationale.

        let total_blocks = self.load_meta_u64(META_TOTAL_BLOCKS)?.unwrap_or(0);
        let total_judgments = self.load_meta_u64(META_TOTAL_JUDGMENTS)?.unwrap_or(0);
        let genesis_slot = self.load_meta_u64(META_GENESIS_SLOT)?;

        let cf_blocks = self.cf_blocks()?;
        let cf_meta = self.cf_meta()?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_blocks, Self::slot_key(slot), block.canonical_bytes());
        batch.put_cf(&cf_meta, META_HEAD_SLOT, slot.to_be_bytes());
        batch.put_cf(&cf_meta, META_TOTAL_BLOCKS, (total_blocks + 1).to_be_bytes());
        batch.put_cf(
            &cf_meta,
            META_TOTAL_JUDGMENTS,
            (total_judgments + block.judgment_count() as u64).to_be_bytes(),
        );
        if genesis_slot.is_none() {
            batch.put_cf(&cf_meta, META_GENESIS_SLOT, slot.to_be_bytes());
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn head(&self) -> Option<Block> {
        match self.load_meta_u64(META_HEAD_SLOT) {
            Ok(Some(slot)) => self.by_slot(slot),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "head lookup failed");
                None
            }
        }
    }

    fn by_slot(&self, slot: u64) -> Option<Block> {
        match self.load_block(slot) {
            Ok(block) => block,
            Err(e) => {
                warn!(slot, error = %e, "block lookup failed");
                None
            }
        }
    }

    fn recent(&self, limit: usize) -> Vec<Block> {
        let Ok(Some(head_slot)) = self.load_meta_u64(META_HEAD_SLOT) else {
            return Vec::new();
        };
        let genesis = match self.load_meta_u64(META_GENESIS_SLOT) {
            Ok(slot) => slot.unwrap_or(0),
            Err(_) => 0,
        };

        let mut out = Vec::new();
        let mut slot = head_slot;
        while out.len() < limit {
            if let Some(block) = self.by_slot(slot) {
                out.push(block);
            }
            if slot == genesis {
                break;
            }
            slot -= 1;
        }
        out
    }

    fn since(&self, slot: u64, limit: usize) -> Vec<Block> {
        let Ok(Some(head_slot)) = self.load_meta_u64(META_HEAD_SLOT) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut next = slot.saturating_add(1);
        while next <= head_slot && out.len() < limit {
            if let Some(block) = self.by_slot(next) {
                out.push(block);
            }
            next += 1;
        }
        out
    }

    fn stats(&self) -> StoreStats {
        let read = |key: &[u8]| match self.load_meta_u64(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "meta read failed");
                None
            }
        };
        StoreStats {
            total_blocks: read(META_TOTAL_BLOCKS).unwrap_or(0),
            head_slot: read(META_HEAD_SLOT),
            genesis_slot: read(META_GENESIS_SLOT),
            total_judgments: read(META_TOTAL_JUDGMENTS).unwrap_or(0),
        }
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
            q_score: Some(77),
            verdict: None,
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
            operator: "rocksdb-test".to_string(),
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

    fn open_store(tmp: &TempDir) -> RocksDbChainStore {
        let cfg = RocksDbConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        RocksDbChainStore::open(&cfg).expect("open RocksDB")
    }

    #[test]
    fn roundtrip_block_and_head() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut store = open_store(&tmp);

        let genesis = block_on(None, Vec::new());
        let next = block_on(Some(&genesis), vec![judgment("j-1"), judgment("j-2")]);
        store.put_block(&genesis).expect("persist genesis");
        store.put_block(&next).expect("persist block 1");

        let fetched = store.by_slot(1).expect("block 1 should exist");
        assert_eq!(fetched.hash, next.hash);
        assert_eq!(fetched.judgments.len(), 2);

        let head = store.head().expect("head should be set");
        assert_eq!(head.header.slot, 1);
    }

    #[test]
    fn rejects_out_of_order_writes() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut store = open_store(&tmp);

        let genesis = block_on(None, Vec::new());
        store.put_block(&genesis).expect("persist genesis");

        assert_eq!(
            store.put_block(&genesis).unwrap_err(),
            StoreError::SlotExists(0)
        );

        let mut gapped = block_on(Some(&genesis), vec![judgment("j-1")]);
        gapped.header.slot = 3;
        gapped.hash = gapped.header.compute_hash();
        assert_eq!(
            store.put_block(&gapped).unwrap_err(),
            StoreError::SlotGap { expected: 1, got: 3 }
        );

        let mut orphan = block_on(Some(&genesis), vec![judgment("j-1")]);
        orphan.header.prev_hash = Hash256::compute(b"elsewhere");
        orphan.hash = orphan.header.compute_hash();
        assert_eq!(
            store.put_block(&orphan).unwrap_err(),
            StoreError::ParentMismatch { slot: 1 }
        );
    }

    #[test]
    fn chain_survives_reopen() {
        let tmp = TempDir::new().expect("create temp dir");
        let genesis = block_on(None, Vec::new());
        let next = block_on(Some(&genesis), vec![judgment("j-1")]);

        {
            let mut store = open_store(&tmp);
            store.put_block(&genesis).expect("persist genesis");
            store.put_block(&next).expect("persist block 1");
        }

        let store = open_store(&tmp);
        let stats = store.stats();
        assert_eq!(stats.total_blocks, 2);
        assert_eq!(stats.head_slot, Some(1));
        assert_eq!(stats.genesis_slot, Some(0));
        assert_eq!(stats.total_judgments, 1);
        assert!(store.verify_integrity().valid);
    }

    #[test]
    fn range_reads_are_ordered_and_bounded() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut store = open_store(&tmp);

        let mut prev: Option<Block> = None;
        for i in 0..5 {
            let judgments = if i == 0 {
                Vec::new()
            } else {
                vec![judgment(&format!("j-{i}"))]
            };
            let block = block_on(prev.as_ref(), judgments);
            store.put_block(&block).expect("append");
            prev = Some(block);
        }

        let recent: Vec<u64> = store.recent(2).iter().map(|b| b.header.slot).collect();
        assert_eq!(recent, vec![4, 3]);

        let since: Vec<u64> = store.since(1, 2).iter().map(|b| b.header.slot).collect();
        assert_eq!(since, vec![2, 3]);
    }
}
