// === Domain Records ===
pub mod blood;
pub mod geo;
pub mod hospital;
pub mod transaction;

// === Blocks, Mining and Verification ===
pub mod block;
pub mod chain;
pub mod pow;

// === Admission and Penalties ===
pub mod mempool;
pub mod reputation;
pub mod validation;

// === Ledger Handle ===
pub mod config;
pub mod error;
pub mod ledger;

// === Re-exports for broader ecosystem access ===
pub use block::{Block, BlockHeader, BlockView};
pub use blood::{BloodType, ParseBloodTypeError};
pub use chain::{verify_blocks, Chain};
pub use config::LedgerConfig;
pub use error::{ChainIntegrityError, ConfigError, LedgerError, LedgerResult, MiningError, ValidationError};
pub use geo::{distance_km, within_range, GeoPoint};
pub use hospital::{Hospital, HospitalRegistry};
pub use ledger::{ChainReport, HospitalStats, Ledger, MiningOutcome, RejectedTransfer, SystemStats};
pub use mempool::PendingPool;
pub use pow::{CancelToken, MiningControl, ProofOfWork};
pub use reputation::{InventoryDiscrepancy, TamperDetector, TamperingDetected, ViolationReason};
pub use transaction::{Transaction, TransactionView, TxStatus, Urgency};
pub use validation::TransferValidator;
