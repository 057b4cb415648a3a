//! Binary merkle tree over the state column.
//!
//! Leaves are the state entries in flat-key order. A leaf hashes as
//! `H(0x00 || u32 BE key length || flat key || value)` and an inner node as
//! `H(0x01 || left || right)`. When a level has an odd number of nodes the
//! last one is promoted unchanged. The root of an empty tree is all zeros.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::path::decode_key;

/// 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

pub const EMPTY_ROOT: Hash = [0u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub fn leaf_hash(flat_key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update((flat_key.len() as u32).to_be_bytes());
    hasher.update(flat_key);
    hasher.update(value);
    hasher.finalize().into()
}

pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Root over already hashed leaves.
pub fn root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Root over key-sorted `(flat key, value)` entries.
pub fn root_of_entries(entries: &[(Vec<u8>, Vec<u8>)]) -> Hash {
    let leaves: Vec<Hash> = entries.iter().map(|(k, v)| leaf_hash(k, v)).collect();
    root(&leaves)
}

/// One sibling on the way from a leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: Hash,
    /// True when the sibling sits on the left of the running hash.
    pub left: bool,
}

/// Audit path for the leaf at `index`. Levels where the node is promoted
/// contribute no step.
pub fn audit_path(leaves: &[Hash], mut index: usize) -> Vec<ProofStep> {
    let mut steps = Vec::new();
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        if index % 2 == 1 {
            steps.push(ProofStep {
                hash: level[index - 1],
                left: true,
            });
        } else if index + 1 < level.len() {
            steps.push(ProofStep {
                hash: level[index + 1],
                left: false,
            });
        }
        level = next_level(&level);
        index /= 2;
    }
    steps
}

pub fn fold_path(leaf: Hash, steps: &[ProofStep]) -> Hash {
    steps.iter().fold(leaf, |acc, step| {
        if step.left {
            node_hash(&step.hash, &acc)
        } else {
            node_hash(&acc, &step.hash)
        }
    })
}

/// An entry returned by a proved query together with its audit path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvedEntry {
    pub flat_key: Vec<u8>,
    pub value: Vec<u8>,
    pub steps: Vec<ProofStep>,
}

impl ProvedEntry {
    /// The key relative to the queried path.
    pub fn key(&self) -> Option<Vec<u8>> {
        decode_key(&self.flat_key).ok().map(|(_, key)| key)
    }
}

/// Inclusion proof for the results of a path query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub root_hash: Hash,
    pub entries: Vec<ProvedEntry>,
}

impl Proof {
    /// Recomputes the root from every entry and checks it against the
    /// root recorded in the proof.
    pub fn verify(&self) -> bool {
        self.entries.iter().all(|entry| {
            fold_path(leaf_hash(&entry.flat_key, &entry.value), &entry.steps) == self.root_hash
        })
    }

    /// Verifies the proof against a root obtained independently.
    pub fn verify_against(&self, expected_root: &Hash) -> bool {
        &self.root_hash == expected_root && self.verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(|i| leaf_hash(&[i], &[i, i])).collect()
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(root(&[]), EMPTY_ROOT);
        assert_eq!(root_of_entries(&[]), EMPTY_ROOT);
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaves(1);
        assert_eq!(root(&l), l[0]);
        assert!(audit_path(&l, 0).is_empty());
    }

    #[test]
    fn odd_node_is_promoted() {
        let l = leaves(3);
        let expected = node_hash(&node_hash(&l[0], &l[1]), &l[2]);
        assert_eq!(root(&l), expected);
        assert_eq!(audit_path(&l, 2).len(), 1);
    }

    #[test]
    fn every_audit_path_folds_to_root() {
        for n in 1..=9u8 {
            let l = leaves(n);
            let r = root(&l);
            for i in 0..l.len() {
                assert_eq!(fold_path(l[i], &audit_path(&l, i)), r, "n={n} i={i}");
            }
        }
    }

    #[test]
    fn leaf_and_node_domains_are_separated() {
        let l = leaves(2);
        let mut concatenated = l[0].to_vec();
        concatenated.extend_from_slice(&l[1]);
        assert_ne!(leaf_hash(&[], &concatenated), node_hash(&l[0], &l[1]));
    }
}
