use chrono::Utc;
use hemochain_crypto::{MerkleProof, MerkleTree, EMPTY_ROOT};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::transaction::{Transaction, TransactionView};

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_MINER: &str = "SYSTEM";

/// Every block field that feeds the block hash, minus the nonce.
///
/// SAFETY: The encoding is length-prefixed and follows field declaration
/// order. Reordering fields here changes every block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: u64,
    pub previous_hash: String,
    pub merkle_root: String,
    pub difficulty: u32,
    pub miner_id: String,
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

impl BlockHeader {
    /// Hasher pre-loaded with the header; clone it per nonce attempt.
    pub fn seeded_hasher(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        update_str(&mut hasher, &self.previous_hash);
        update_str(&mut hasher, &self.merkle_root);
        hasher.update(self.difficulty.to_be_bytes());
        update_str(&mut hasher, &self.miner_id);
        hasher
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        hash_with_nonce(&self.seeded_hasher(), nonce)
    }
}

#[inline]
pub fn hash_with_nonce(seed: &Sha256, nonce: u64) -> String {
    let mut hasher = seed.clone();
    hasher.update(nonce.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// A committed block.
///
/// SAFETY INVARIANTS:
/// 1. `hash` equals `header().hash_with_nonce(nonce)`
/// 2. `merkle_root` commits to the recomputed hashes of `transactions`
/// 3. `hash` satisfies `difficulty`
/// 4. `previous_hash` equals the hash of the block at `index - 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height in the chain
    pub index: u64,

    /// Block creation timestamp (seconds since epoch)
    pub timestamp: u64,

    /// Confirmed transfers, in submission order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block (immutable link)
    pub previous_hash: String,

    /// Merkle root of transactions
    pub merkle_root: String,

    pub nonce: u64,

    /// Leading zero hex digits this block was mined at
    pub difficulty: u32,

    /// Hospital that produced the block
    pub miner_id: String,

    pub hash: String,
}

/// Serialized block as handed to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<TransactionView>,
    pub previous_hash: String,
    pub merkle_root: String,
    pub nonce: u64,
    pub hash: String,
    pub miner_id: String,
    pub difficulty: u32,
}

impl Block {
    /// The fixed first block. Identical on every ledger instance.
    pub fn genesis() -> Self {
        let header = BlockHeader {
            index: 0,
            timestamp: GENESIS_TIMESTAMP,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            merkle_root: EMPTY_ROOT.to_string(),
            difficulty: 0,
            miner_id: GENESIS_MINER.to_string(),
        };
        let hash = header.hash_with_nonce(0);
        Block::seal(header, Vec::new(), 0, hash)
    }

    /// Header for the block following `previous`, stamped now.
    pub fn next_header(previous: &Block, transactions: &[Transaction], difficulty: u32, miner_id: &str) -> BlockHeader {
        BlockHeader {
            index: previous.index + 1,
            timestamp: Utc::now().timestamp() as u64,
            previous_hash: previous.hash.clone(),
            merkle_root: Block::calculate_merkle_root(transactions),
            difficulty,
            miner_id: miner_id.to_string(),
        }
    }

    pub(crate) fn seal(header: BlockHeader, transactions: Vec<Transaction>, nonce: u64, hash: String) -> Self {
        Block {
            index: header.index,
            timestamp: header.timestamp,
            transactions,
            previous_hash: header.previous_hash,
            merkle_root: header.merkle_root,
            nonce,
            difficulty: header.difficulty,
            miner_id: header.miner_id,
            hash,
        }
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash.clone(),
            merkle_root: self.merkle_root.clone(),
            difficulty: self.difficulty,
            miner_id: self.miner_id.clone(),
        }
    }

    /// Recompute the block hash from the stored fields.
    pub fn compute_hash(&self) -> String {
        self.header().hash_with_nonce(self.nonce)
    }

    /// Merkle root over the recomputed content hash of each transaction.
    ///
    /// SAFETY: Stored `Transaction::hash` values are ignored so that an
    /// edited transaction cannot hide behind its old hash.
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        MerkleTree::compute_root(&Self::leaves(transactions))
    }

    fn leaves(transactions: &[Transaction]) -> Vec<String> {
        transactions.iter().map(Transaction::compute_hash).collect()
    }

    /// Inclusion proof for the transaction with `tx_id`, against this
    /// block's merkle root.
    pub fn inclusion_proof(&self, tx_id: &str) -> Option<(String, MerkleProof)> {
        let tx = self.transactions.iter().find(|tx| tx.id == tx_id)?;
        let leaf = tx.compute_hash();
        let proof = MerkleTree::from_leaves(&Self::leaves(&self.transactions)).proof(&leaf).ok()?;
        Some((leaf, proof))
    }

    pub fn to_view(&self) -> BlockView {
        BlockView {
            index: self.index,
            timestamp: self.timestamp,
            transactions: self.transactions.iter().map(Transaction::to_view).collect(),
            previous_hash: self.previous_hash.clone(),
            merkle_root: self.merkle_root.clone(),
            nonce: self.nonce,
            hash: self.hash.clone(),
            miner_id: self.miner_id.clone(),
            difficulty: self.difficulty,
        }
    }
}
