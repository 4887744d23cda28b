use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single transfer was refused.
///
/// Doubles as the reason code carried by a `Rejected` transaction, so it is
/// cloneable and serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ValidationError {
    #[error("Unknown hospital: {0}")]
    UnknownHospital(String),

    #[error("Hospital {0} is blacklisted")]
    Blacklisted(String),

    #[error("Insufficient {blood_type} inventory at {hospital_id}: {available} available, {requested} requested")]
    InsufficientInventory {
        hospital_id: String,
        blood_type: String,
        available: u64,
        requested: u64,
    },

    #[error("Hospital {hospital_id} has insufficient credit ({credit} < {required})")]
    InsufficientCredit {
        hospital_id: String,
        credit: i64,
        required: i64,
    },

    #[error("Transfer distance ({distance_km:.2}km) exceeds maximum allowed ({max_km}km)")]
    DistanceExceeded { distance_km: f64, max_km: f64 },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Transaction {0} does not match its content hash")]
    HashMismatch(String),
}

/// Why a proof-of-work search stopped without a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Attempt limit reached after {attempts} attempts")]
    AttemptLimitReached { attempts: u64 },

    #[error("Mining deadline passed after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },

    #[error("Nonce space exhausted")]
    NonceSpaceExhausted,
}

/// Errors surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Hospital {0} already registered")]
    DuplicateHospitalId(String),

    #[error("Transaction {0} already submitted")]
    DuplicateTransaction(String),

    #[error("Pending pool at capacity ({0})")]
    PoolFull(usize),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Mining aborted: {0}")]
    MiningAborted(#[from] MiningError),
}

impl LedgerError {
    /// The per-transaction reason, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            LedgerError::Validation(reason) => Some(reason),
            _ => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// A failed integrity check on a stored block.
///
/// SAFETY: These are reported, never repaired. The chain is left exactly as
/// it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ChainIntegrityError {
    #[error("Block {index} hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        index: u64,
        stored: String,
        computed: String,
    },

    #[error("Block {index} merkle root mismatch: stored {stored}, computed {computed}")]
    MerkleMismatch {
        index: u64,
        stored: String,
        computed: String,
    },

    #[error("Block {index} does not link to its predecessor: expected {expected}, got {found}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("Block {index} does not satisfy difficulty {difficulty}")]
    ProofOfWorkNotSatisfied { index: u64, difficulty: u32 },

    #[error("Block {index} does not match the canonical genesis block")]
    GenesisMismatch { index: u64 },

    #[error("Block at position {index} records index {found}")]
    IndexMismatch { index: u64, found: u64 },
}

impl ChainIntegrityError {
    pub fn index(&self) -> u64 {
        match self {
            ChainIntegrityError::HashMismatch { index, .. }
            | ChainIntegrityError::MerkleMismatch { index, .. }
            | ChainIntegrityError::BrokenLink { index, .. }
            | ChainIntegrityError::ProofOfWorkNotSatisfied { index, .. }
            | ChainIntegrityError::GenesisMismatch { index }
            | ChainIntegrityError::IndexMismatch { index, .. } => *index,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChainIntegrityError::HashMismatch { .. } => "HASH_MISMATCH",
            ChainIntegrityError::MerkleMismatch { .. } => "MERKLE_MISMATCH",
            ChainIntegrityError::BrokenLink { .. } => "BROKEN_LINK",
            ChainIntegrityError::ProofOfWorkNotSatisfied { .. } => "POW_NOT_SATISFIED",
            ChainIntegrityError::GenesisMismatch { .. } => "GENESIS_MISMATCH",
            ChainIntegrityError::IndexMismatch { .. } => "INDEX_MISMATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
