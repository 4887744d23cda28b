pub mod hashing;
pub mod merkletree;

pub use hashing::{leading_zero_digits, meets_difficulty, sha256_hex, EMPTY_ROOT};
pub use merkletree::{MerkleError, MerkleProof, MerkleTree, ProofStep, Side};
