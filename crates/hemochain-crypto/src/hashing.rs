use sha2::{Digest, Sha256};

/// Root committed by an empty transaction list: `SHA-256("")`.
pub const EMPTY_ROOT: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Number of leading `'0'` hex digits in `hash`.
pub fn leading_zero_digits(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

/// Difficulty predicate shared by the miner and the chain verifier.
///
/// SAFETY: A hash that is not 64 hex characters never satisfies any
/// difficulty, including zero. Truncated or padded hashes are treated as
/// tampered rather than trivially valid.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    leading_zero_digits(hash) >= difficulty as usize
}
