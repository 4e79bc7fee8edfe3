//! SHA-256 fingerprints of encoded configuration, used to compare stores
//! without exposing their contents.

use sha2::{Digest, Sha256};

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Returns the hexadecimal representation of a SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = sha256_digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
