// PROOF-OF-WORK SEARCH
// Bounded, checkpointed nonce search for block production
//
// SAFETY CONSTRAINTS:
// 1. The search is pure: it reads a header and returns a nonce, nothing else
// 2. Cancellation is observed at least every `checkpoint_interval` attempts
// 3. An attempt ceiling is exact; a wall-clock deadline is checked at checkpoints
// 4. An aborted search leaves no trace; callers commit only on success

use hemochain_crypto::meets_difficulty;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::block::{hash_with_nonce, BlockHeader};
use crate::error::MiningError;

/// Shared cancellation flag for an in-flight search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits a caller imposes on one mining call.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    pub cancel: CancelToken,
    pub max_attempts: Option<u64>,
    pub deadline: Option<Instant>,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

/// Leading-zero-hex-digit proof-of-work.
#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    /// Number of leading zeros required in hash
    difficulty: u32,

    /// Attempts between cancellation/deadline checks
    checkpoint_interval: u64,
}

impl ProofOfWork {
    pub fn new(difficulty: u32, checkpoint_interval: u64) -> Self {
        ProofOfWork {
            difficulty,
            checkpoint_interval: checkpoint_interval.max(1),
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Search nonces from zero until the header hash meets the difficulty.
    ///
    /// # Returns
    /// - `Ok((nonce, hash))` if PoW is found
    /// - `Err(MiningError)` if cancelled, out of attempts, or past deadline
    pub fn search(&self, header: &BlockHeader, control: &MiningControl) -> Result<(u64, String), MiningError> {
        let seed = header.seeded_hasher();
        let mut attempts: u64 = 0;
        let mut nonce: u64 = 0;

        loop {
            if attempts % self.checkpoint_interval == 0 {
                if control.cancel.is_cancelled() {
                    log::info!("PoW search for block {} cancelled after {} attempts", header.index, attempts);
                    return Err(MiningError::Cancelled { attempts });
                }
                if control.deadline.map_or(false, |d| Instant::now() >= d) {
                    log::info!("PoW search for block {} hit its deadline after {} attempts", header.index, attempts);
                    return Err(MiningError::DeadlineExceeded { attempts });
                }
            }
            if control.max_attempts.map_or(false, |max| attempts >= max) {
                return Err(MiningError::AttemptLimitReached { attempts });
            }

            let hash = hash_with_nonce(&seed, nonce);
            attempts += 1;
            if meets_difficulty(&hash, self.difficulty) {
                log::info!(
                    "PoW found: block={}, difficulty={}, nonce={}, hash={}",
                    header.index,
                    self.difficulty,
                    nonce,
                    &hash[..16]
                );
                return Ok((nonce, hash));
            }

            nonce = nonce.checked_add(1).ok_or(MiningError::NonceSpaceExhausted)?;
        }
    }

    pub fn verify(&self, hash: &str) -> bool {
        meets_difficulty(hash, self.difficulty)
    }
}
