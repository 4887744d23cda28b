use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ledger parameters supplied by the embedding application.
///
/// SAFETY: The ledger copies this at construction; changing a config value
/// afterwards has no effect on a running ledger. Blocks record the
/// difficulty they were mined at, so verification never depends on the
/// current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Required leading zero hex digits in a block hash
    pub mining_difficulty: u32,

    pub max_transfer_distance_km: f64,

    /// Sender credit floor for any outgoing transfer
    pub min_transfer_credit: i64,

    /// Violations at which a hospital is blacklisted
    pub tamper_violation_threshold: u32,

    /// Reputation lost per violation
    pub reputation_penalty: i64,

    pub transfer_credit_cost: i64,
    pub reception_credit_reward: i64,

    /// Credit paid to the producer of each block
    pub mining_reward: i64,

    pub initial_reputation: i64,
    pub min_reputation: i64,

    pub max_transactions_per_block: usize,
    pub max_pending_transactions: usize,

    /// Nonce attempts between cancellation checks
    pub pow_checkpoint_interval: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            mining_difficulty: 4,
            max_transfer_distance_km: 100.0,
            min_transfer_credit: 10,
            tamper_violation_threshold: 2,
            reputation_penalty: 15,
            transfer_credit_cost: 5,
            reception_credit_reward: 2,
            mining_reward: 100,
            initial_reputation: 100,
            min_reputation: 0,
            max_transactions_per_block: 10,
            max_pending_transactions: 10_000,
            pow_checkpoint_interval: 4096,
        }
    }
}

impl LedgerConfig {
    pub fn development() -> Self {
        LedgerConfig { mining_difficulty: 2, ..Self::default() }
    }

    pub fn production() -> Self {
        LedgerConfig { mining_difficulty: 6, ..Self::default() }
    }

    pub fn testing() -> Self {
        LedgerConfig { mining_difficulty: 1, ..Self::default() }
    }

    /// Look up a named profile (`development`, `production`, `testing`).
    pub fn profile(name: &str) -> Option<Self> {
        match name {
            "development" | "dev" => Some(Self::development()),
            "production" | "prod" => Some(Self::production()),
            "testing" | "test" => Some(Self::testing()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue { field, reason: reason.into() })
        }

        if self.mining_difficulty > 64 {
            return invalid("mining_difficulty", "a SHA-256 hash has only 64 hex digits");
        }
        if !self.max_transfer_distance_km.is_finite() || self.max_transfer_distance_km <= 0.0 {
            return invalid("max_transfer_distance_km", "must be a positive finite number");
        }
        if self.min_transfer_credit < 0 {
            return invalid("min_transfer_credit", "must not be negative");
        }
        if self.tamper_violation_threshold == 0 {
            return invalid("tamper_violation_threshold", "must be at least 1");
        }
        if self.reputation_penalty < 0 {
            return invalid("reputation_penalty", "must not be negative");
        }
        if self.min_reputation > self.initial_reputation {
            return invalid("min_reputation", "must not exceed initial_reputation");
        }
        if self.max_transactions_per_block == 0 {
            return invalid("max_transactions_per_block", "must be at least 1");
        }
        if self.max_pending_transactions == 0 {
            return invalid("max_pending_transactions", "must be at least 1");
        }
        if self.pow_checkpoint_interval == 0 {
            return invalid("pow_checkpoint_interval", "must be at least 1");
        }
        Ok(())
    }
}
