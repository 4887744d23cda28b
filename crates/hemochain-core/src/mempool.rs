use std::collections::{HashSet, VecDeque};

use crate::error::LedgerError;
use crate::transaction::Transaction;

/// Submitted transfers awaiting a block, in submission order.
///
/// SAFETY: Enforces max_size to prevent unbounded memory growth, and a
/// transaction id appears at most once.
#[derive(Debug, Clone)]
pub struct PendingPool {
    queue: VecDeque<Transaction>, // FIFO structure for transactions
    ids: HashSet<String>,
    max_size: usize,
}

impl PendingPool {
    pub fn new(max_size: usize) -> Self {
        PendingPool {
            queue: VecDeque::new(),
            ids: HashSet::new(),
            max_size,
        }
    }

    /// Append a transaction to the back of the queue.
    pub fn push(&mut self, tx: Transaction) -> Result<(), LedgerError> {
        if self.ids.contains(&tx.id) {
            log::warn!("Duplicate transaction rejected: {}", tx.id);
            return Err(LedgerError::DuplicateTransaction(tx.id));
        }
        if self.queue.len() >= self.max_size {
            log::warn!("Pending pool at capacity ({}), rejecting transaction", self.max_size);
            return Err(LedgerError::PoolFull(self.max_size));
        }

        self.ids.insert(tx.id.clone());
        self.queue.push_back(tx);
        log::debug!("Transaction added to pool. Pool size: {}/{}", self.queue.len(), self.max_size);
        Ok(())
    }

    /// Clone up to `limit` transactions from the front, oldest first.
    pub fn snapshot(&self, limit: usize) -> Vec<Transaction> {
        self.queue.iter().take(limit).cloned().collect()
    }

    /// Drop every transaction whose id is in `ids`, keeping the order of
    /// the rest.
    pub fn remove<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        let before = self.queue.len();
        for id in ids {
            self.ids.remove(id);
        }
        let remaining = &self.ids;
        self.queue.retain(|tx| remaining.contains(&tx.id));
        before - self.queue.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Urgency;

    fn tx(quantity: i64) -> Transaction {
        Transaction::create("H1", "H2", "O+", quantity, Urgency::Normal).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut pool = PendingPool::new(10);
        let txs: Vec<_> = (1..=4).map(tx).collect();
        for t in &txs {
            pool.push(t.clone()).unwrap();
        }

        let snapshot = pool.snapshot(3);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].id, txs[0].id);
        assert_eq!(snapshot[2].id, txs[2].id);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut pool = PendingPool::new(10);
        let t = tx(1);
        pool.push(t.clone()).unwrap();
        assert!(matches!(pool.push(t), Err(LedgerError::DuplicateTransaction(_))));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut pool = PendingPool::new(2);
        pool.push(tx(1)).unwrap();
        pool.push(tx(2)).unwrap();
        assert!(matches!(pool.push(tx(3)), Err(LedgerError::PoolFull(2))));
    }

    #[test]
    fn test_remove_keeps_order_of_rest() {
        let mut pool = PendingPool::new(10);
        let txs: Vec<_> = (1..=4).map(tx).collect();
        for t in &txs {
            pool.push(t.clone()).unwrap();
        }

        let removed = pool.remove([txs[0].id.as_str(), txs[2].id.as_str(), "unknown"]);
        assert_eq!(removed, 2);
        let left: Vec<_> = pool.iter().map(|t| t.id.clone()).collect();
        assert_eq!(left, vec![txs[1].id.clone(), txs[3].id.clone()]);
        assert!(!pool.contains(&txs[0].id));

        // A removed id may be queued again.
        pool.push(txs[0].clone()).unwrap();
        assert_eq!(pool.len(), 3);
    }
}
