//! Binary Merkle root over judgment leaf hashes.
//!
//! The construction is fixed by the wire format and must stay bit-exact:
//!
//! - no leaves: `sha256("empty")`
//! - one leaf: the leaf itself
//! - otherwise: pair adjacent leaves left-to-right, duplicating the last
//!   leaf when the count is odd; each inner node is the SHA-256 of the
//!   64-byte concatenation of its children; recurse until one remains.
//!
//! The duplicate-last rule permits the well-known second-preimage trick
//! (a level whose last leaf is duplicated hashes identically to one
//! where it appears twice). Peers on existing chains expect exactly this
//! construction, so it is kept verbatim.

use crate::types::{HASH_LEN, Hash256};

/// Sentinel preimage for the empty-leaf-set root.
const EMPTY_SENTINEL: &[u8] = b"empty";

/// Computes the Merkle root of an ordered list of leaf hashes.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::compute(EMPTY_SENTINEL);
    }

    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Odd count: duplicate the last leaf.
            let last = *level.last().expect("level is non-empty");
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; HASH_LEN * 2];
                buf[..HASH_LEN].copy_from_slice(pair[0].as_bytes());
                buf[HASH_LEN..].copy_from_slice(pair[1].as_bytes());
                Hash256::compute(&buf)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> Hash256 {
        Hash256([byte; HASH_LEN])
    }

    fn inner(left: &Hash256, right: &Hash256) -> Hash256 {
        let mut buf = [0u8; HASH_LEN * 2];
        buf[..HASH_LEN].copy_from_slice(left.as_bytes());
        buf[HASH_LEN..].copy_from_slice(right.as_bytes());
        Hash256::compute(&buf)
    }

    #[test]
    fn empty_leaves_hash_the_sentinel() {
        assert_eq!(merkle_root(&[]), Hash256::compute(b"empty"));
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaf(7);
        assert_eq!(merkle_root(&[l]), l);
    }

    #[test]
    fn two_leaves_hash_their_concatenation() {
        let a = leaf(1);
        let b = leaf(2);
        assert_eq!(merkle_root(&[a, b]), inner(&a, &b));
    }

    #[test]
    fn odd_count_duplicates_the_last_leaf() {
        let a = leaf(1);
        let b = leaf(2);
        let c = leaf(3);

        // Manual tree: ((a,b), (c,c)).
        let expected = inner(&inner(&a, &b), &inner(&c, &c));
        assert_eq!(merkle_root(&[a, b, c]), expected);

        // The documented weakness: [a, b, c] and [a, b, c, c] collide.
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
    }

    #[test]
    fn root_is_order_sensitive() {
        let a = leaf(1);
        let b = leaf(2);
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn root_is_deterministic() {
        let leaves: Vec<Hash256> = (0..9u8).map(leaf).collect();
        assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
    }
}
