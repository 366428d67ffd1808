//! Integrity: SHA-256 content digests and optional recomputation on receive.

use sha2::{Digest, Sha256};

use crate::identity::{ContentIdentifier, DEFAULT_HASH_ALG};

/// Hash content bytes. Returns the lowercase hex SHA-256 digest.
pub fn hash_content(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Outcome of recomputing a digest over received bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch,
    /// The identifier uses an algorithm this node cannot recompute.
    Unsupported,
}

/// Verify payload against the identifier it was fetched for.
pub fn verify_content(payload: &[u8], id: &ContentIdentifier) -> Verification {
    if !id.hash_algorithm().eq_ignore_ascii_case(DEFAULT_HASH_ALG) {
        return Verification::Unsupported;
    }
    if hash_content(payload).eq_ignore_ascii_case(id.hash()) {
        Verification::Match
    } else {
        Verification::Mismatch
    }
}
