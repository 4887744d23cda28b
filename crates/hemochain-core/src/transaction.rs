use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    Urgent,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Urgent => "urgent",
            Urgency::Critical => "critical",
        }
    }
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Normal
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Urgency::Normal),
            "urgent" => Ok(Urgency::Urgent),
            "critical" => Ok(Urgency::Critical),
            other => Err(format!("Unknown urgency level: {}", other)),
        }
    }
}

/// Lifecycle of a transfer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Built but not yet submitted; ledgers keep no record of these
    Created,
    Pending,
    Confirmed { block_index: u64 },
    Rejected(ValidationError),
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed { .. } | TxStatus::Rejected(_))
    }
}

/// A request to move `quantity` units of `blood_type` from `sender` to
/// `receiver`.
///
/// SAFETY: `hash` is a function of every other field. Any edit to a field
/// after construction is detectable through [`Transaction::verify_hash`]
/// and, once committed, through the block's merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub blood_type: String,
    pub quantity: u32,
    pub urgency: Urgency,
    /// Seconds since epoch
    pub timestamp: u64,
    pub hash: String,
}

/// Wire view of a transaction inside a serialized block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub blood_type: String,
    pub quantity: u32,
    pub urgency: Urgency,
    pub timestamp: u64,
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

impl Transaction {
    /// Build a transfer request with a fresh id.
    ///
    /// Touches no ledger state; registry checks happen at submission and
    /// again at mining.
    pub fn create(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        blood_type: impl Into<String>,
        quantity: i64,
        urgency: Urgency,
    ) -> Result<Self, ValidationError> {
        if quantity <= 0 || quantity > i64::from(u32::MAX) {
            return Err(ValidationError::InvalidQuantity(quantity));
        }

        let mut tx = Transaction {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            blood_type: blood_type.into(),
            quantity: quantity as u32,
            urgency,
            timestamp: Utc::now().timestamp() as u64,
            hash: String::new(),
        };
        tx.hash = tx.compute_hash();
        Ok(tx)
    }

    /// SHA-256 over the length-prefixed fields in declaration order.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        update_str(&mut hasher, &self.id);
        update_str(&mut hasher, &self.sender);
        update_str(&mut hasher, &self.receiver);
        update_str(&mut hasher, &self.blood_type);
        hasher.update(self.quantity.to_be_bytes());
        update_str(&mut hasher, self.urgency.as_str());
        hasher.update(self.timestamp.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn involves(&self, hospital_id: &str) -> bool {
        self.sender == hospital_id || self.receiver == hospital_id
    }

    pub fn to_view(&self) -> TransactionView {
        TransactionView {
            id: self.id.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            blood_type: self.blood_type.clone(),
            quantity: self.quantity,
            urgency: self.urgency,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_unique_ids() {
        let a = Transaction::create("H1", "H2", "O+", 2, Urgency::Urgent).unwrap();
        let b = Transaction::create("H1", "H2", "O+", 2, Urgency::Urgent).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.hash, b.hash);
        assert!(a.verify_hash());
    }

    #[test]
    fn test_invalid_quantity() {
        assert_eq!(
            Transaction::create("H1", "H2", "O+", 0, Urgency::Normal),
            Err(ValidationError::InvalidQuantity(0))
        );
        assert_eq!(
            Transaction::create("H1", "H2", "O+", -5, Urgency::Normal),
            Err(ValidationError::InvalidQuantity(-5))
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_field_sensitive() {
        let tx = Transaction::create("H1", "H2", "O+", 2, Urgency::Urgent).unwrap();
        assert_eq!(tx.compute_hash(), tx.compute_hash());

        let mut edited = tx.clone();
        edited.quantity = 3;
        assert!(!edited.verify_hash());

        let mut shifted = tx.clone();
        // Moving a character between adjacent fields must change the hash.
        shifted.sender = "H1H".to_string();
        shifted.receiver = "2".to_string();
        assert_ne!(shifted.compute_hash(), tx.hash);
    }

    #[test]
    fn test_hash_encoding_layout() {
        let tx = Transaction {
            id: "id-1".to_string(),
            sender: "H1".to_string(),
            receiver: "H2".to_string(),
            blood_type: "O+".to_string(),
            quantity: 3,
            urgency: Urgency::Critical,
            timestamp: 1_700_000_123,
            hash: String::new(),
        };

        let mut bytes = Vec::new();
        for field in ["id-1", "H1", "H2", "O+"] {
            bytes.extend_from_slice(&(field.len() as u64).to_be_bytes());
            bytes.extend_from_slice(field.as_bytes());
        }
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&8u64.to_be_bytes());
        bytes.extend_from_slice(b"critical");
        bytes.extend_from_slice(&1_700_000_123u64.to_be_bytes());

        assert_eq!(tx.compute_hash(), hex::encode(Sha256::digest(&bytes)));
    }

    #[test]
    fn test_urgency_parsing() {
        assert_eq!("urgent".parse::<Urgency>().unwrap(), Urgency::Urgent);
        assert_eq!(" CRITICAL ".parse::<Urgency>().unwrap(), Urgency::Critical);
        assert!("whenever".parse::<Urgency>().is_err());
        assert_eq!(serde_json::to_string(&Urgency::Normal).unwrap(), "\"normal\"");
    }

    #[test]
    fn test_view_drops_hash() {
        let tx = Transaction::create("H1", "H2", "AB-", 1, Urgency::Critical).unwrap();
        let json = serde_json::to_value(tx.to_view()).unwrap();
        assert_eq!(json["blood_type"], "AB-");
        assert_eq!(json["urgency"], "critical");
        assert!(json.get("hash").is_none());
    }
}
