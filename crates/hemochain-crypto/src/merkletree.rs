//! Merkle commitment over ordered transaction hashes.
//!
//! Leaves are lowercase hex SHA-256 digests. A parent is
//! `SHA-256(left_hex ‖ right_hex)` over the ASCII hex text. A level with an
//! odd number of nodes pairs its last node with itself. A single leaf is its
//! own root, and the empty list commits to [`EMPTY_ROOT`].
//!
//! SAFETY GUARANTEES:
//! - The root is a pure function of the ordered leaf list
//! - Proofs are verifiable without the tree
//! - The tree is immutable once built

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::{sha256_hex, EMPTY_ROOT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("Leaf not found: {0}")]
    LeafNotFound(String),
}

pub type MerkleResult<T> = Result<T, MerkleError>;

/// Position of a sibling relative to the running hash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Sibling path from a leaf up to the root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root from `leaf` along this path and compare to `root`.
    pub fn verify(&self, leaf: &str, root: &str) -> bool {
        MerkleTree::verify(leaf, self, root)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<String>>,
}

pub(crate) fn combine(left: &str, right: &str) -> String {
    let mut joined = String::with_capacity(left.len() + right.len());
    joined.push_str(left);
    joined.push_str(right);
    sha256_hex(joined.as_bytes())
}

impl MerkleTree {
    /// Build the full tree bottom-up.
    pub fn from_leaves<S: AsRef<str>>(leaves: &[S]) -> Self {
        if leaves.is_empty() {
            return Self { levels: vec![] };
        }

        let mut levels = vec![leaves.iter().map(|l| l.as_ref().to_string()).collect::<Vec<_>>()];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<String> = current
                .chunks(2)
                .map(|pair| combine(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// Root without keeping the intermediate levels around.
    pub fn compute_root<S: AsRef<str>>(leaves: &[S]) -> String {
        Self::from_leaves(leaves).root()
    }

    pub fn root(&self) -> String {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_else(|| EMPTY_ROOT.to_string())
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn contains_leaf(&self, leaf: &str) -> bool {
        self.levels
            .first()
            .map(|leaves| leaves.iter().any(|l| l == leaf))
            .unwrap_or(false)
    }

    /// Inclusion proof for the first occurrence of `leaf`.
    pub fn proof(&self, leaf: &str) -> MerkleResult<MerkleProof> {
        let leaf_index = self
            .levels
            .first()
            .and_then(|leaves| leaves.iter().position(|l| l == leaf))
            .ok_or_else(|| MerkleError::LeafNotFound(leaf.to_string()))?;

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if index % 2 == 0 {
                // Odd tail pairs with itself.
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                ProofStep { sibling: sibling.clone(), side: Side::Right }
            } else {
                ProofStep { sibling: level[index - 1].clone(), side: Side::Left }
            };
            path.push(step);
            index /= 2;
        }

        Ok(MerkleProof { leaf_index, path })
    }

    pub fn verify(leaf: &str, proof: &MerkleProof, root: &str) -> bool {
        let computed = proof.path.iter().fold(leaf.to_string(), |current, step| match step.side {
            Side::Right => combine(&current, &step.sibling),
            Side::Left => combine(&step.sibling, &current),
        });
        computed == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("tx-{}", i).as_bytes())).collect()
    }

    #[test]
    fn test_empty_tree_uses_sentinel() {
        let tree = MerkleTree::from_leaves::<String>(&[]);
        assert_eq!(tree.root(), EMPTY_ROOT);
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.proof("anything").is_err());
    }

    #[test]
    fn test_single_leaf_is_root() {
        let l = leaves(1);
        let tree = MerkleTree::from_leaves(&l);
        assert_eq!(tree.root(), l[0]);
        let proof = tree.proof(&l[0]).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.verify(&l[0], &tree.root()));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let l = leaves(3);
        let left = combine(&l[0], &l[1]);
        let right = combine(&l[2], &l[2]);
        assert_eq!(MerkleTree::compute_root(&l), combine(&left, &right));
    }

    #[test]
    fn test_order_matters() {
        let mut l = leaves(4);
        let root = MerkleTree::compute_root(&l);
        l.swap(0, 1);
        assert_ne!(MerkleTree::compute_root(&l), root);
    }

    #[test]
    fn test_proof_rejects_wrong_root() {
        let l = leaves(5);
        let tree = MerkleTree::from_leaves(&l);
        let proof = tree.proof(&l[4]).unwrap();
        assert!(!MerkleTree::verify(&l[4], &proof, EMPTY_ROOT));
        assert!(!MerkleTree::verify(&l[3], &proof, &tree.root()));
    }

    #[test]
    fn test_missing_leaf() {
        let tree = MerkleTree::from_leaves(&leaves(2));
        assert_eq!(
            tree.proof("deadbeef"),
            Err(MerkleError::LeafNotFound("deadbeef".to_string()))
        );
    }

    proptest! {
        #[test]
        fn prop_every_leaf_proves_inclusion(n in 1usize..40) {
            let l = leaves(n);
            let tree = MerkleTree::from_leaves(&l);
            let root = tree.root();
            for leaf in &l {
                let proof = tree.proof(leaf).unwrap();
                prop_assert!(proof.verify(leaf, &root));
            }
        }
    }
}
