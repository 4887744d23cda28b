// CHAIN STORAGE & INTEGRITY VERIFICATION
// Append-only block sequence and its read-only verifier
//
// SAFETY INVARIANTS:
// 1. The chain always starts with the canonical genesis block
// 2. Blocks are only ever appended, never edited or removed
// 3. Verification never mutates the chain; faults are reported, not repaired
// 4. Verification reports the FIRST failing block and stops

use hemochain_crypto::meets_difficulty;

use crate::block::Block;
use crate::error::ChainIntegrityError;

#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new() -> Self {
        Chain {
            blocks: vec![Block::genesis()],
        }
    }

    /// The most recent block. The chain is never empty.
    pub fn tip(&self) -> &Block {
        // SAFETY: `new` seeds genesis and nothing removes blocks.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Index of the block holding `tx_id`, if any.
    pub fn find_transaction(&self, tx_id: &str) -> Option<u64> {
        self.blocks
            .iter()
            .find(|block| block.transactions.iter().any(|tx| tx.id == tx_id))
            .map(|block| block.index)
    }

    /// Number of committed transfers in which `hospital_id` took part.
    pub fn transactions_involving(&self, hospital_id: &str) -> usize {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| tx.involves(hospital_id))
            .count()
    }

    pub fn verify(&self) -> Result<(), ChainIntegrityError> {
        verify_blocks(&self.blocks)
    }

    /// SAFETY: The caller has checked that `block` links to the tip and
    /// satisfies its recorded difficulty.
    pub(crate) fn append(&mut self, block: Block) {
        debug_assert_eq!(block.previous_hash, self.tip().hash);
        self.blocks.push(block);
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// **Full chain verification pipeline**
///
/// SAFETY: Executes all checks per block in strict order:
/// 1. Genesis equality (block 0 only)
/// 2. Recorded index equals the block's position
/// 3. Merkle root against recomputed transaction hashes
/// 4. Stored hash against recomputed header hash
/// 5. Proof-of-work at the block's recorded difficulty
/// 6. Link to the previous block's stored hash
pub fn verify_blocks(blocks: &[Block]) -> Result<(), ChainIntegrityError> {
    let genesis = Block::genesis();
    let mut previous: Option<&Block> = None;

    for (position, block) in blocks.iter().enumerate() {
        let index = position as u64;

        if position == 0 {
            if *block != genesis {
                log::error!("Block 0 does not match the canonical genesis block");
                return Err(ChainIntegrityError::GenesisMismatch { index });
            }
            previous = Some(block);
            continue;
        }

        if block.index != index {
            log::error!("Block at position {} records index {}", index, block.index);
            return Err(ChainIntegrityError::IndexMismatch {
                index,
                found: block.index,
            });
        }

        let merkle_root = Block::calculate_merkle_root(&block.transactions);
        if block.merkle_root != merkle_root {
            log::error!("Block {} merkle root mismatch", index);
            return Err(ChainIntegrityError::MerkleMismatch {
                index,
                stored: block.merkle_root.clone(),
                computed: merkle_root,
            });
        }

        let hash = block.compute_hash();
        if block.hash != hash {
            log::error!("Block {} hash mismatch! Stored {}, computed {}", index, block.hash, hash);
            return Err(ChainIntegrityError::HashMismatch {
                index,
                stored: block.hash.clone(),
                computed: hash,
            });
        }

        if !meets_difficulty(&block.hash, block.difficulty) {
            log::error!("Block {} does not satisfy difficulty {}", index, block.difficulty);
            return Err(ChainIntegrityError::ProofOfWorkNotSatisfied {
                index,
                difficulty: block.difficulty,
            });
        }

        if let Some(prev) = previous {
            if block.previous_hash != prev.hash {
                log::error!(
                    "Block {} link broken! Expected {}, got {}",
                    index,
                    prev.hash,
                    block.previous_hash
                );
                return Err(ChainIntegrityError::BrokenLink {
                    index,
                    expected: prev.hash.clone(),
                    found: block.previous_hash.clone(),
                });
            }
        }

        previous = Some(block);
    }

    log::debug!("Chain of {} blocks passed verification", blocks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::{MiningControl, ProofOfWork};
    use crate::transaction::{Transaction, Urgency};

    fn mine_onto(chain: &mut Chain, transactions: Vec<Transaction>, difficulty: u32) {
        let header = Block::next_header(chain.tip(), &transactions, difficulty, "H1");
        let (nonce, hash) = ProofOfWork::new(difficulty, 64)
            .search(&header, &MiningControl::new())
            .unwrap();
        chain.append(Block::seal(header, transactions, nonce, hash));
    }

    fn sample_chain() -> Chain {
        let mut chain = Chain::new();
        for q in 1..=3 {
            let txs = vec![
                Transaction::create("H1", "H2", "O+", q, Urgency::Normal).unwrap(),
                Transaction::create("H2", "H1", "A-", q, Urgency::Critical).unwrap(),
            ];
            mine_onto(&mut chain, txs, 1);
        }
        chain
    }

    #[test]
    fn test_fresh_chain_is_valid() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.tip(), &Block::genesis());
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_mined_chain_is_valid() {
        let chain = sample_chain();
        assert_eq!(chain.len(), 4);
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_tampered_transaction_detected() {
        let mut chain = sample_chain();
        chain.blocks_mut()[2].transactions[0].quantity = 999;
        let err = chain.verify().unwrap_err();
        assert_eq!(err.index(), 2);
        assert_eq!(err.kind(), "MERKLE_MISMATCH");
    }

    #[test]
    fn test_tampered_merkle_root_detected() {
        let mut chain = sample_chain();
        chain.blocks_mut()[1].merkle_root = "f".repeat(64);
        assert!(matches!(
            chain.verify(),
            Err(ChainIntegrityError::MerkleMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_tampered_nonce_detected() {
        let mut chain = sample_chain();
        chain.blocks_mut()[3].nonce += 1;
        assert!(matches!(
            chain.verify(),
            Err(ChainIntegrityError::HashMismatch { index: 3, .. })
        ));
    }

    #[test]
    fn test_tampered_previous_hash_detected() {
        let mut chain = sample_chain();
        chain.blocks_mut()[2].previous_hash = "0".repeat(64);
        assert_eq!(chain.verify().unwrap_err().index(), 2);
    }

    #[test]
    fn test_rehashed_block_still_breaks_link() {
        let mut chain = sample_chain();
        {
            let block = &mut chain.blocks_mut()[1];
            block.transactions.pop();
            block.merkle_root = Block::calculate_merkle_root(&block.transactions);
            block.difficulty = 0;
            block.hash = block.compute_hash();
        }
        assert!(matches!(
            chain.verify(),
            Err(ChainIntegrityError::BrokenLink { index: 2, .. })
        ));
    }

    #[test]
    fn test_out_of_order_index_detected() {
        let mut chain = sample_chain();
        chain.blocks_mut()[2].index = 5;
        assert_eq!(
            chain.verify(),
            Err(ChainIntegrityError::IndexMismatch { index: 2, found: 5 })
        );
    }

    #[test]
    fn test_unmet_difficulty_detected() {
        let mut chain = Chain::new();
        let header = Block::next_header(chain.tip(), &[], 64, "H1");
        let hash = header.hash_with_nonce(0);
        chain.blocks_mut().push(Block::seal(header, Vec::new(), 0, hash));
        assert!(matches!(
            chain.verify(),
            Err(ChainIntegrityError::ProofOfWorkNotSatisfied { index: 1, difficulty: 64 })
        ));
    }

    #[test]
    fn test_genesis_tampering_detected() {
        let mut chain = sample_chain();
        chain.blocks_mut()[0].miner_id = "H1".to_string();
        assert_eq!(chain.verify(), Err(ChainIntegrityError::GenesisMismatch { index: 0 }));
    }

    #[test]
    fn test_verification_does_not_mutate() {
        let chain = sample_chain();
        let before = chain.blocks().to_vec();
        let _ = chain.verify();
        assert_eq!(chain.blocks(), before.as_slice());
    }

    #[test]
    fn test_transaction_lookup() {
        let chain = sample_chain();
        let id = chain.blocks()[2].transactions[1].id.clone();
        assert_eq!(chain.find_transaction(&id), Some(2));
        assert_eq!(chain.find_transaction("nope"), None);
        assert_eq!(chain.transactions_involving("H1"), 6);
        assert_eq!(chain.transactions_involving("H3"), 0);
    }
}
