// HOSPITAL REGISTRY & INVENTORY
// Authoritative record of every participating hospital
//
// SAFETY INVARIANTS:
// 1. Each hospital has a unique identifier
// 2. Inventory counts never go negative
// 3. The blacklist flag is monotonic: once set it is never cleared
// 4. Violation counters and cumulative penalties never decrease
// 5. Records are mutated only through registry operations; readers get
//    shared references or clones

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, ValidationError};
use crate::geo::GeoPoint;
use crate::transaction::Transaction;

/// A hospital participating in the transfer network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,

    /// Blood credits; a signed counter
    pub credit: i64,

    /// Trust signal, lowered only by recorded violations
    pub reputation: i64,

    /// PERMANENT once set
    pub blacklisted: bool,

    /// Units on hand per blood-type label
    pub inventory: BTreeMap<String, u64>,

    /// Number of recorded violations (PERMANENT RECORD)
    pub violations: u32,

    /// Total reputation penalty applied across all violations
    pub cumulative_penalty: i64,

    pub transfers_sent: u64,
    pub transfers_received: u64,
}

impl Hospital {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: GeoPoint,
        credit: i64,
        reputation: i64,
    ) -> Self {
        Hospital {
            id: id.into(),
            name: name.into(),
            location,
            credit,
            reputation,
            blacklisted: false,
            inventory: BTreeMap::new(),
            violations: 0,
            cumulative_penalty: 0,
            transfers_sent: 0,
            transfers_received: 0,
        }
    }

    pub fn units_of(&self, blood_type: &str) -> u64 {
        self.inventory.get(blood_type).copied().unwrap_or(0)
    }

    pub fn total_units(&self) -> u64 {
        self.inventory.values().sum()
    }
}

impl fmt::Display for Hospital {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hospital {} ({}) credit={} reputation={} units={}{}",
            self.id,
            self.name,
            self.credit,
            self.reputation,
            self.total_units(),
            if self.blacklisted { " BLACKLISTED" } else { "" }
        )
    }
}

/// Registry of all hospitals known to a ledger.
#[derive(Debug, Clone, Default)]
pub struct HospitalRegistry {
    hospitals: HashMap<String, Hospital>,
}

impl HospitalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new hospital with empty inventory.
    ///
    /// SAFETY: Hospital ID must be unique; an existing record is never
    /// overwritten.
    pub fn register(&mut self, hospital: Hospital) -> Result<(), LedgerError> {
        if self.hospitals.contains_key(&hospital.id) {
            return Err(LedgerError::DuplicateHospitalId(hospital.id));
        }
        log::info!("Hospital {} registered", hospital.id);
        self.hospitals.insert(hospital.id.clone(), hospital);
        Ok(())
    }

    /// Add units to a hospital's inventory. Returns the new count.
    pub fn stock(&mut self, hospital_id: &str, blood_type: &str, quantity: i64) -> Result<u64, ValidationError> {
        let hospital = self
            .hospitals
            .get_mut(hospital_id)
            .ok_or_else(|| ValidationError::UnknownHospital(hospital_id.to_string()))?;
        if hospital.blacklisted {
            return Err(ValidationError::Blacklisted(hospital_id.to_string()));
        }
        if quantity <= 0 {
            return Err(ValidationError::InvalidQuantity(quantity));
        }

        let units = hospital.inventory.entry(blood_type.to_string()).or_insert(0);
        *units = units.saturating_add(quantity as u64);
        log::debug!("Hospital {} now holds {} units of {}", hospital_id, units, blood_type);
        Ok(*units)
    }

    pub fn get(&self, id: &str) -> Option<&Hospital> {
        self.hospitals.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Hospital> {
        self.hospitals.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hospitals.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.hospitals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hospitals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hospital> {
        self.hospitals.values()
    }

    /// Move units and credits for a validated transfer. Counters saturate.
    ///
    /// SAFETY: Callers must have validated `tx` against this registry. The
    /// sender's stock is checked again here, and nothing is mutated if it
    /// would go negative.
    pub(crate) fn apply_transfer(&mut self, tx: &Transaction, config: &LedgerConfig) -> Result<(), ValidationError> {
        let quantity = u64::from(tx.quantity);
        let sender = self
            .hospitals
            .get(&tx.sender)
            .ok_or_else(|| ValidationError::UnknownHospital(tx.sender.clone()))?;

        let available = sender.units_of(&tx.blood_type);
        let remaining = available.checked_sub(quantity).ok_or_else(|| ValidationError::InsufficientInventory {
            hospital_id: tx.sender.clone(),
            blood_type: tx.blood_type.clone(),
            available,
            requested: quantity,
        })?;
        if !self.hospitals.contains_key(&tx.receiver) {
            return Err(ValidationError::UnknownHospital(tx.receiver.clone()));
        }

        if let Some(sender) = self.hospitals.get_mut(&tx.sender) {
            sender.inventory.insert(tx.blood_type.clone(), remaining);
            sender.credit = sender.credit.saturating_sub(config.transfer_credit_cost);
            sender.transfers_sent = sender.transfers_sent.saturating_add(1);
        }
        if let Some(receiver) = self.hospitals.get_mut(&tx.receiver) {
            let units = receiver.inventory.entry(tx.blood_type.clone()).or_insert(0);
            *units = units.saturating_add(quantity);
            receiver.credit = receiver.credit.saturating_add(config.reception_credit_reward);
            receiver.transfers_received = receiver.transfers_received.saturating_add(1);
        }
        Ok(())
    }

    pub(crate) fn credit(&mut self, id: &str, amount: i64) -> bool {
        match self.hospitals.get_mut(id) {
            Some(hospital) => {
                hospital.credit = hospital.credit.saturating_add(amount);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Urgency;

    fn registry() -> HospitalRegistry {
        let mut registry = HospitalRegistry::new();
        registry
            .register(Hospital::new("H1", "One", GeoPoint::new(40.7128, -74.0060), 150, 100))
            .unwrap();
        registry
            .register(Hospital::new("H2", "Two", GeoPoint::new(40.7589, -73.9851), 120, 100))
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry();
        let err = registry
            .register(Hospital::new("H1", "Again", GeoPoint::new(0.0, 0.0), 1, 100))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateHospitalId(id) if id == "H1"));
        assert_eq!(registry.get("H1").unwrap().name, "One");
    }

    #[test]
    fn test_stock_accumulates() {
        let mut registry = registry();
        assert_eq!(registry.stock("H1", "O+", 10).unwrap(), 10);
        assert_eq!(registry.stock("H1", "O+", 5).unwrap(), 15);
        assert_eq!(registry.get("H1").unwrap().units_of("O+"), 15);
        assert_eq!(registry.get("H1").unwrap().units_of("A+"), 0);
    }

    #[test]
    fn test_stock_rejections() {
        let mut registry = registry();
        assert_eq!(
            registry.stock("NOPE", "O+", 1),
            Err(ValidationError::UnknownHospital("NOPE".to_string()))
        );
        assert_eq!(registry.stock("H1", "O+", 0), Err(ValidationError::InvalidQuantity(0)));
        assert_eq!(registry.stock("H1", "O+", -3), Err(ValidationError::InvalidQuantity(-3)));

        registry.get_mut("H2").unwrap().blacklisted = true;
        assert_eq!(
            registry.stock("H2", "O+", 1),
            Err(ValidationError::Blacklisted("H2".to_string()))
        );
    }

    #[test]
    fn test_apply_transfer_moves_units_and_credit() {
        let mut registry = registry();
        registry.stock("H1", "O+", 10).unwrap();
        let config = LedgerConfig::default();
        let tx = Transaction::create("H1", "H2", "O+", 4, Urgency::Normal).unwrap();

        registry.apply_transfer(&tx, &config).unwrap();

        let sender = registry.get("H1").unwrap();
        let receiver = registry.get("H2").unwrap();
        assert_eq!(sender.units_of("O+"), 6);
        assert_eq!(sender.credit, 150 - config.transfer_credit_cost);
        assert_eq!(sender.transfers_sent, 1);
        assert_eq!(receiver.units_of("O+"), 4);
        assert_eq!(receiver.credit, 120 + config.reception_credit_reward);
        assert_eq!(receiver.transfers_received, 1);
    }

    #[test]
    fn test_counters_saturate_at_bounds() {
        let mut registry = registry();
        registry.stock("H1", "O+", 5).unwrap();
        registry.get_mut("H1").unwrap().credit = i64::MIN;
        let receiver = registry.get_mut("H2").unwrap();
        receiver.credit = i64::MAX;
        receiver.inventory.insert("O+".to_string(), u64::MAX - 1);

        let tx = Transaction::create("H1", "H2", "O+", 3, Urgency::Normal).unwrap();
        registry.apply_transfer(&tx, &LedgerConfig::default()).unwrap();
        assert!(registry.credit("H2", 100));

        assert_eq!(registry.get("H1").unwrap().credit, i64::MIN);
        assert_eq!(registry.get("H1").unwrap().units_of("O+"), 2);
        assert_eq!(registry.get("H2").unwrap().credit, i64::MAX);
        assert_eq!(registry.get("H2").unwrap().units_of("O+"), u64::MAX);
    }

    #[test]
    fn test_apply_transfer_never_goes_negative() {
        let mut registry = registry();
        registry.stock("H1", "O+", 2).unwrap();
        let tx = Transaction::create("H1", "H2", "O+", 3, Urgency::Urgent).unwrap();

        let before = registry.clone();
        assert!(matches!(
            registry.apply_transfer(&tx, &LedgerConfig::default()),
            Err(ValidationError::InsufficientInventory { available: 2, requested: 3, .. })
        ));
        assert_eq!(registry.get("H1"), before.get("H1"));
        assert_eq!(registry.get("H2"), before.get("H2"));
    }
}
