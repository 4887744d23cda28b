// LEDGER
// Single owner of registry, chain, pending pool and penalty history
//
// SAFETY INVARIANTS:
// 1. All state lives behind one RwLock; every mutation takes the write lock
// 2. Only one mining attempt runs at a time (dedicated mining mutex)
// 3. The nonce search runs with NO ledger lock held
// 4. A block is committed only if its batch still validates against the
//    state at commit time; otherwise the attempt restarts
// 5. An aborted mine leaves chain, pool, registry and statuses untouched
// 6. Transfer effects reach the registry only through a mining commit

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::block::Block;
use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::error::{ChainIntegrityError, ConfigError, LedgerError, LedgerResult, ValidationError};
use crate::geo::{within_range, GeoPoint};
use crate::hospital::{Hospital, HospitalRegistry};
use crate::mempool::PendingPool;
use crate::pow::{MiningControl, ProofOfWork};
use crate::reputation::{inventory_discrepancies, TamperDetector, TamperingDetected, ViolationReason};
use crate::transaction::{Transaction, TxStatus, Urgency};
use crate::validation::TransferValidator;

struct LedgerState {
    registry: HospitalRegistry,
    chain: Chain,
    pool: PendingPool,
    statuses: HashMap<String, TxStatus>,
    detector: TamperDetector,

    /// Bumped by every mutation that can change a validation outcome
    version: u64,
}

/// A transfer dropped from a mined batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedTransfer {
    pub tx_id: String,
    pub reason: ValidationError,
}

/// Result of a successful mining call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningOutcome {
    pub block: Block,
    pub rejected: Vec<RejectedTransfer>,
}

/// Result of a chain verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub fault: Option<ChainIntegrityError>,
    /// Penalty applied to the miner of the failing block, if any
    pub tampering: Option<TamperingDetected>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalStats {
    pub hospital: Hospital,
    /// Committed transfers in which the hospital took part
    pub total_transactions: usize,
    pub chain_length: usize,
    pub pending_transactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_hospitals: usize,
    pub active_hospitals: usize,
    pub blacklisted_hospitals: usize,
    pub total_blood_units: u64,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub chain_valid: bool,
}

/// Candidate block contents, validated against a working registry.
struct Batch {
    accepted: Vec<Transaction>,
    rejected: Vec<RejectedTransfer>,
    working: HospitalRegistry,
}

impl Batch {
    fn same_outcome(&self, other: &Batch) -> bool {
        self.rejected == other.rejected
            && self.accepted.len() == other.accepted.len()
            && self.accepted.iter().zip(&other.accepted).all(|(a, b)| a.id == b.id)
    }
}

/// Cloneable handle to a blood-transfer ledger.
#[derive(Clone)]
pub struct Ledger {
    config: Arc<LedgerConfig>,
    state: Arc<RwLock<LedgerState>>,
    mining: Arc<Mutex<()>>,
}

impl Ledger {
    /// Create a ledger holding only the genesis block.
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = LedgerState {
            registry: HospitalRegistry::new(),
            chain: Chain::new(),
            pool: PendingPool::new(config.max_pending_transactions),
            statuses: HashMap::new(),
            detector: TamperDetector::new(),
            version: 0,
        };
        log::info!("Ledger initialised at difficulty {}", config.mining_difficulty);
        Ok(Ledger {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(state)),
            mining: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn register(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<GeoPoint>,
        credit: i64,
    ) -> LedgerResult<()> {
        let hospital = Hospital::new(id, name, location.into(), credit, self.config.initial_reputation);
        let mut state = self.state.write();
        state.registry.register(hospital)?;
        state.version += 1;
        Ok(())
    }

    /// Add units to a hospital's inventory. Returns the new count.
    pub fn stock(&self, hospital_id: &str, blood_type: &str, quantity: i64) -> LedgerResult<u64> {
        let mut state = self.state.write();
        let units = state.registry.stock(hospital_id, blood_type, quantity)?;
        state.version += 1;
        Ok(units)
    }

    /// Build a transfer request. Nothing is queued or tracked until
    /// [`Ledger::submit`].
    pub fn create_transfer(
        &self,
        sender: &str,
        receiver: &str,
        blood_type: &str,
        quantity: i64,
        urgency: Urgency,
    ) -> LedgerResult<Transaction> {
        Ok(Transaction::create(sender, receiver, blood_type, quantity, urgency)?)
    }

    /// Validate against current state and queue for mining.
    ///
    /// A transfer that fails validation is recorded as Rejected and the
    /// reason is returned. Nothing else changes.
    pub fn submit(&self, tx: Transaction) -> LedgerResult<()> {
        let mut state = self.state.write();

        if state.statuses.contains_key(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id));
        }

        if let Err(reason) = TransferValidator::validate(&tx, &state.registry, &self.config) {
            log::warn!("Transfer {} rejected: {}", tx.id, reason);
            state.statuses.insert(tx.id.clone(), TxStatus::Rejected(reason.clone()));
            return Err(reason.into());
        }

        let id = tx.id.clone();
        state.pool.push(tx)?;
        state.statuses.insert(id.clone(), TxStatus::Pending);
        log::info!("Transfer {} queued ({} pending)", id, state.pool.len());
        Ok(())
    }

    pub fn mine(&self, miner_id: &str) -> LedgerResult<MiningOutcome> {
        self.mine_with(miner_id, &MiningControl::new())
    }

    /// **Produce the next block**
    ///
    /// SAFETY: Runs in three phases:
    /// 1. Snapshot and validate the batch under the read lock
    /// 2. Search for a nonce with no ledger lock held
    /// 3. Re-check and commit under the write lock
    ///
    /// If another mutation landed during phase 2 and changed the batch
    /// outcome, the attempt is discarded and mining restarts from phase 1.
    pub fn mine_with(&self, miner_id: &str, control: &MiningControl) -> LedgerResult<MiningOutcome> {
        let _mining = self.mining.lock();
        let pow = ProofOfWork::new(self.config.mining_difficulty, self.config.pow_checkpoint_interval);

        loop {
            let (candidates, batch, header, version) = {
                let state = self.state.read();
                Self::check_miner(&state.registry, miner_id)?;
                let candidates = state.pool.snapshot(self.config.max_transactions_per_block);
                let batch = self.assemble(&state.registry, &candidates);
                let header = Block::next_header(state.chain.tip(), &batch.accepted, pow.difficulty(), miner_id);
                (candidates, batch, header, state.version)
            };

            log::debug!(
                "Mining block {} with {} transfers ({} rejected)",
                header.index,
                batch.accepted.len(),
                batch.rejected.len()
            );
            let (nonce, hash) = pow.search(&header, control)?;

            let mut state = self.state.write();
            let batch = if state.version == version {
                batch
            } else {
                Self::check_miner(&state.registry, miner_id)?;
                let fresh = self.assemble(&state.registry, &candidates);
                if !fresh.same_outcome(&batch) {
                    log::info!("State changed while mining block {}; restarting", header.index);
                    continue;
                }
                fresh
            };

            let Batch {
                accepted,
                rejected,
                mut working,
            } = batch;
            working.credit(miner_id, self.config.mining_reward);
            let block = Block::seal(header, accepted, nonce, hash);

            state.registry = working;
            for tx in &block.transactions {
                state.statuses.insert(
                    tx.id.clone(),
                    TxStatus::Confirmed {
                        block_index: block.index,
                    },
                );
            }
            for reject in &rejected {
                log::warn!("Transfer {} dropped at mining: {}", reject.tx_id, reject.reason);
                state
                    .statuses
                    .insert(reject.tx_id.clone(), TxStatus::Rejected(reject.reason.clone()));
            }
            let done = block
                .transactions
                .iter()
                .map(|tx| tx.id.as_str())
                .chain(rejected.iter().map(|r| r.tx_id.as_str()));
            state.pool.remove(done);
            state.chain.append(block.clone());
            state.version += 1;

            log::info!(
                "Block {} mined by {}: {} transfers, hash={}",
                block.index,
                miner_id,
                block.transactions.len(),
                block.hash
            );
            return Ok(MiningOutcome { block, rejected });
        }
    }

    fn check_miner(registry: &HospitalRegistry, miner_id: &str) -> Result<(), ValidationError> {
        let miner = registry
            .get(miner_id)
            .ok_or_else(|| ValidationError::UnknownHospital(miner_id.to_string()))?;
        if miner.blacklisted {
            return Err(ValidationError::Blacklisted(miner_id.to_string()));
        }
        Ok(())
    }

    /// Validate `candidates` in order, applying each accepted transfer to a
    /// working copy so later entries see earlier effects.
    fn assemble(&self, registry: &HospitalRegistry, candidates: &[Transaction]) -> Batch {
        let mut working = registry.clone();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for tx in candidates {
            let outcome = TransferValidator::validate(tx, &working, &self.config)
                .and_then(|_| working.apply_transfer(tx, &self.config));
            match outcome {
                Ok(()) => accepted.push(tx.clone()),
                Err(reason) => rejected.push(RejectedTransfer {
                    tx_id: tx.id.clone(),
                    reason,
                }),
            }
        }

        Batch {
            accepted,
            rejected,
            working,
        }
    }

    /// Verify the whole chain and penalise the miner of the first bad block.
    pub fn verify_chain(&self) -> ChainReport {
        let mut guard = self.state.write();
        let state = &mut *guard;

        match state.chain.verify() {
            Ok(()) => ChainReport {
                valid: true,
                fault: None,
                tampering: None,
            },
            Err(fault) => {
                log::error!("Chain verification failed: {}", fault);
                let tampering =
                    state
                        .detector
                        .report_chain_fault(&mut state.registry, &self.config, state.chain.blocks(), &fault);
                if tampering.is_some() {
                    state.version += 1;
                }
                ChainReport {
                    valid: false,
                    fault: Some(fault),
                    tampering,
                }
            }
        }
    }

    pub fn hospital_status(&self, hospital_id: &str) -> Option<Hospital> {
        self.state.read().registry.get(hospital_id).cloned()
    }

    pub fn hospitals(&self) -> Vec<Hospital> {
        let state = self.state.read();
        let mut hospitals: Vec<_> = state.registry.iter().cloned().collect();
        hospitals.sort_by(|a, b| a.id.cmp(&b.id));
        hospitals
    }

    pub fn chain_snapshot(&self) -> Vec<Block> {
        self.state.read().chain.blocks().to_vec()
    }

    pub fn chain_length(&self) -> usize {
        self.state.read().chain.len()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().pool.iter().cloned().collect()
    }

    /// `None` for ids never submitted to this ledger.
    pub fn transaction_status(&self, tx_id: &str) -> Option<TxStatus> {
        self.state.read().statuses.get(tx_id).cloned()
    }

    pub fn report_violation(&self, hospital_id: &str, reason: ViolationReason) -> Option<TamperingDetected> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let event = state
            .detector
            .report_violation(&mut state.registry, &self.config, hospital_id, reason);
        if event.is_some() {
            state.version += 1;
        }
        event
    }

    /// Compare an externally reported inventory against the registry and
    /// record a violation on any disagreement.
    pub fn reconcile_inventory(
        &self,
        hospital_id: &str,
        reported: &BTreeMap<String, u64>,
    ) -> LedgerResult<Option<TamperingDetected>> {
        let discrepancies = {
            let state = self.state.read();
            let hospital = state
                .registry
                .get(hospital_id)
                .ok_or_else(|| ValidationError::UnknownHospital(hospital_id.to_string()))?;
            inventory_discrepancies(hospital, reported)
        };
        if discrepancies.is_empty() {
            return Ok(None);
        }
        Ok(self.report_violation(hospital_id, ViolationReason::InventoryMismatch { discrepancies }))
    }

    /// Whether two registered hospitals are close enough to transfer.
    pub fn within_transfer_range(&self, a: &str, b: &str) -> LedgerResult<bool> {
        let state = self.state.read();
        let first = state
            .registry
            .get(a)
            .ok_or_else(|| ValidationError::UnknownHospital(a.to_string()))?;
        let second = state
            .registry
            .get(b)
            .ok_or_else(|| ValidationError::UnknownHospital(b.to_string()))?;
        Ok(within_range(first.location, second.location, self.config.max_transfer_distance_km))
    }

    pub fn hospital_stats(&self, hospital_id: &str) -> Option<HospitalStats> {
        let state = self.state.read();
        let hospital = state.registry.get(hospital_id)?.clone();
        Some(HospitalStats {
            total_transactions: state.chain.transactions_involving(hospital_id),
            chain_length: state.chain.len(),
            pending_transactions: state.pool.len(),
            hospital,
        })
    }

    /// Aggregate counters. Checks chain validity without penalising anyone.
    pub fn system_stats(&self) -> SystemStats {
        let state = self.state.read();
        let total_hospitals = state.registry.len();
        let blacklisted_hospitals = state.registry.iter().filter(|h| h.blacklisted).count();
        SystemStats {
            total_hospitals,
            active_hospitals: total_hospitals - blacklisted_hospitals,
            blacklisted_hospitals,
            total_blood_units: state.registry.iter().map(Hospital::total_units).sum(),
            chain_length: state.chain.len(),
            pending_transactions: state.pool.len(),
            chain_valid: state.chain.verify().is_ok(),
        }
    }

    pub fn violation_history(&self) -> Vec<TamperingDetected> {
        self.state.read().detector.history().to_vec()
    }

    #[cfg(test)]
    fn tamper<F: FnOnce(&mut Vec<Block>)>(&self, edit: F) {
        edit(self.state.write().chain.blocks_mut());
    }
}
