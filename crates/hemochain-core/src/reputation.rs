// REPUTATION & TAMPER DETECTION
// Deterministic, evidence-based penalties for hospitals caught misbehaving
//
// SAFETY INVARIANTS:
// 1. Reputation changes ONLY through `report_violation`
// 2. Each violation applies exactly one penalty (same evidence → same penalty)
// 3. Reputation never drops below the configured floor
// 4. Blacklisting is irreversible
// 5. A stored chain fault is penalised once, however often it is re-verified
// 6. Reporting never panics; an unknown hospital is logged and ignored

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::block::Block;
use crate::config::LedgerConfig;
use crate::error::ChainIntegrityError;
use crate::hospital::{Hospital, HospitalRegistry};

/// One blood type whose reported count disagrees with the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDiscrepancy {
    pub blood_type: String,
    pub recorded: u64,
    pub reported: u64,
}

/// Evidence behind a penalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationReason {
    /// A block produced by the hospital failed verification
    ChainTampering { block_index: u64, kind: String },

    /// Externally reported stock disagrees with the ledger
    InventoryMismatch { discrepancies: Vec<InventoryDiscrepancy> },

    /// Raised by an operator or collaborator
    Reported(String),
}

impl ViolationReason {
    pub fn code(&self) -> &'static str {
        match self {
            ViolationReason::ChainTampering { .. } => "CHAIN_TAMPERING",
            ViolationReason::InventoryMismatch { .. } => "INVENTORY_MISMATCH",
            ViolationReason::Reported(_) => "REPORTED",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::ChainTampering { block_index, kind } => {
                write!(f, "block {} failed verification ({})", block_index, kind)
            }
            ViolationReason::InventoryMismatch { discrepancies } => {
                write!(f, "inventory mismatch on {} blood type(s)", discrepancies.len())
            }
            ViolationReason::Reported(detail) => f.write_str(detail),
        }
    }
}

/// Record of an applied penalty (immutable audit trail entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperingDetected {
    pub hospital_id: String,
    pub reason: ViolationReason,
    pub penalty: i64,
    /// Reputation after the penalty
    pub reputation: i64,
    /// Violation count after this one
    pub violations: u32,
    pub blacklisted: bool,
    /// True only for the violation that crossed the threshold
    pub newly_blacklisted: bool,
    pub timestamp: u64,
}

/// Applies penalties and keeps the audit trail.
///
/// SAFETY: This is the ONLY component that lowers reputation or sets the
/// blacklist flag.
#[derive(Debug, Clone, Default)]
pub struct TamperDetector {
    /// Record of all penalties, oldest first
    history: Vec<TamperingDetected>,

    /// (block index, stored hash, fault kind) already penalised
    penalised_faults: HashSet<(u64, String, &'static str)>,
}

impl TamperDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation against `hospital_id` and apply the penalty.
    ///
    /// SAFETY: Steps run in order and all of them apply:
    /// 1. violations += 1
    /// 2. reputation -= penalty, floored at `min_reputation`
    /// 3. cumulative_penalty += penalty
    /// 4. blacklist once violations reach the threshold
    pub fn report_violation(
        &mut self,
        registry: &mut HospitalRegistry,
        config: &LedgerConfig,
        hospital_id: &str,
        reason: ViolationReason,
    ) -> Option<TamperingDetected> {
        let hospital = match registry.get_mut(hospital_id) {
            Some(hospital) => hospital,
            None => {
                log::warn!("Violation reported for unknown hospital {}: {}", hospital_id, reason);
                return None;
            }
        };

        let penalty = config.reputation_penalty;
        hospital.violations = hospital.violations.saturating_add(1);
        hospital.reputation = hospital.reputation.saturating_sub(penalty).max(config.min_reputation);
        hospital.cumulative_penalty = hospital.cumulative_penalty.saturating_add(penalty);

        let was_blacklisted = hospital.blacklisted;
        if hospital.violations >= config.tamper_violation_threshold {
            hospital.blacklisted = true;
        }
        let newly_blacklisted = hospital.blacklisted && !was_blacklisted;

        log::warn!(
            "Tampering detected: hospital={}, reason={}, reputation={}, violations={}",
            hospital.id,
            reason,
            hospital.reputation,
            hospital.violations
        );
        if newly_blacklisted {
            log::warn!("Hospital {} BLACKLISTED after {} violations", hospital.id, hospital.violations);
        }

        let event = TamperingDetected {
            hospital_id: hospital.id.clone(),
            reason,
            penalty,
            reputation: hospital.reputation,
            violations: hospital.violations,
            blacklisted: hospital.blacklisted,
            newly_blacklisted,
            timestamp: Utc::now().timestamp() as u64,
        };
        self.history.push(event.clone());
        Some(event)
    }

    /// Attribute a chain fault to the miner of the failing block.
    ///
    /// Returns `None` for genesis faults (no miner to blame) and for a fault
    /// already penalised.
    pub fn report_chain_fault(
        &mut self,
        registry: &mut HospitalRegistry,
        config: &LedgerConfig,
        blocks: &[Block],
        fault: &ChainIntegrityError,
    ) -> Option<TamperingDetected> {
        let index = fault.index();
        if index == 0 {
            log::error!("Genesis block failed verification; no miner to attribute");
            return None;
        }
        let block = usize::try_from(index).ok().and_then(|i| blocks.get(i))?;

        let key = (index, block.hash.clone(), fault.kind());
        if self.penalised_faults.contains(&key) {
            log::debug!("Fault at block {} already penalised", index);
            return None;
        }

        let reason = ViolationReason::ChainTampering {
            block_index: index,
            kind: fault.kind().to_string(),
        };
        let event = self.report_violation(registry, config, &block.miner_id, reason);
        self.penalised_faults.insert(key);
        event
    }

    /// Get the penalty history (immutable audit trail).
    pub fn history(&self) -> &[TamperingDetected] {
        &self.history
    }

    pub fn history_for<'a>(&'a self, hospital_id: &'a str) -> impl Iterator<Item = &'a TamperingDetected> + 'a {
        self.history.iter().filter(move |event| event.hospital_id == hospital_id)
    }
}

/// Blood types where `reported` disagrees with the hospital's recorded
/// stock. A type missing on either side counts as zero units.
pub fn inventory_discrepancies(hospital: &Hospital, reported: &BTreeMap<String, u64>) -> Vec<InventoryDiscrepancy> {
    let types: BTreeSet<&String> = hospital.inventory.keys().chain(reported.keys()).collect();
    types
        .into_iter()
        .filter_map(|blood_type| {
            let recorded = hospital.units_of(blood_type);
            let reported = reported.get(blood_type).copied().unwrap_or(0);
            (recorded != reported).then(|| InventoryDiscrepancy {
                blood_type: blood_type.clone(),
                recorded,
                reported,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    fn setup() -> (HospitalRegistry, LedgerConfig) {
        let mut registry = HospitalRegistry::new();
        registry
            .register(Hospital::new("H1", "One", GeoPoint::new(40.7128, -74.0060), 150, 100))
            .unwrap();
        (registry, LedgerConfig::default())
    }

    fn reported(detail: &str) -> ViolationReason {
        ViolationReason::Reported(detail.to_string())
    }

    #[test]
    fn test_single_violation() {
        let (mut registry, config) = setup();
        let mut detector = TamperDetector::new();

        let event = detector
            .report_violation(&mut registry, &config, "H1", reported("bad record"))
            .unwrap();

        assert_eq!(event.reputation, 85);
        assert_eq!(event.violations, 1);
        assert!(!event.blacklisted);
        let hospital = registry.get("H1").unwrap();
        assert_eq!(hospital.reputation, 85);
        assert_eq!(hospital.cumulative_penalty, 15);
        assert_eq!(detector.history().len(), 1);
    }

    #[test]
    fn test_blacklisted_at_threshold_and_stays_blacklisted() {
        let (mut registry, config) = setup();
        let mut detector = TamperDetector::new();

        detector.report_violation(&mut registry, &config, "H1", reported("one"));
        let second = detector
            .report_violation(&mut registry, &config, "H1", reported("two"))
            .unwrap();
        assert!(second.blacklisted);
        assert!(second.newly_blacklisted);
        assert_eq!(second.reputation, 70);

        let third = detector
            .report_violation(&mut registry, &config, "H1", reported("three"))
            .unwrap();
        assert!(third.blacklisted);
        assert!(!third.newly_blacklisted);
        assert_eq!(registry.get("H1").unwrap().violations, 3);
    }

    #[test]
    fn test_reputation_floor() {
        let (mut registry, config) = setup();
        let config = LedgerConfig {
            reputation_penalty: 60,
            tamper_violation_threshold: 10,
            ..config
        };
        let mut detector = TamperDetector::new();

        detector.report_violation(&mut registry, &config, "H1", reported("a"));
        detector.report_violation(&mut registry, &config, "H1", reported("b"));
        let hospital = registry.get("H1").unwrap();
        assert_eq!(hospital.reputation, config.min_reputation);
        assert_eq!(hospital.cumulative_penalty, 120);
    }

    #[test]
    fn test_unknown_hospital_is_ignored() {
        let (mut registry, config) = setup();
        let mut detector = TamperDetector::new();
        assert!(detector
            .report_violation(&mut registry, &config, "NOPE", reported("x"))
            .is_none());
        assert!(detector.history().is_empty());
    }

    #[test]
    fn test_chain_fault_penalised_once() {
        let (mut registry, config) = setup();
        let mut detector = TamperDetector::new();
        let genesis = Block::genesis();
        let header = Block::next_header(&genesis, &[], 0, "H1");
        let hash = header.hash_with_nonce(0);
        let blocks = vec![genesis, Block::seal(header, Vec::new(), 0, hash.clone())];
        let fault = ChainIntegrityError::HashMismatch {
            index: 1,
            stored: hash.clone(),
            computed: hash,
        };

        assert!(detector
            .report_chain_fault(&mut registry, &config, &blocks, &fault)
            .is_some());
        assert!(detector
            .report_chain_fault(&mut registry, &config, &blocks, &fault)
            .is_none());
        assert_eq!(registry.get("H1").unwrap().violations, 1);
    }

    #[test]
    fn test_genesis_fault_not_attributed() {
        let (mut registry, config) = setup();
        let mut detector = TamperDetector::new();
        let blocks = vec![Block::genesis()];
        let fault = ChainIntegrityError::GenesisMismatch { index: 0 };
        assert!(detector
            .report_chain_fault(&mut registry, &config, &blocks, &fault)
            .is_none());
    }

    #[test]
    fn test_inventory_discrepancies() {
        let (mut registry, _) = setup();
        registry.stock("H1", "O+", 10).unwrap();
        registry.stock("H1", "A-", 3).unwrap();
        let hospital = registry.get("H1").unwrap();

        let mut report = BTreeMap::new();
        report.insert("O+".to_string(), 10);
        report.insert("A-".to_string(), 3);
        assert!(inventory_discrepancies(hospital, &report).is_empty());

        report.insert("O+".to_string(), 7);
        report.insert("B+".to_string(), 1);
        report.remove("A-");
        let found = inventory_discrepancies(hospital, &report);
        assert_eq!(
            found,
            vec![
                InventoryDiscrepancy { blood_type: "A-".to_string(), recorded: 3, reported: 0 },
                InventoryDiscrepancy { blood_type: "B+".to_string(), recorded: 0, reported: 1 },
                InventoryDiscrepancy { blood_type: "O+".to_string(), recorded: 10, reported: 7 },
            ]
        );
    }
}
