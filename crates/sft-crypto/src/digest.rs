//! SHA-256 content digest, rendered as lowercase hex

use sha2::{Digest, Sha256};

/// Hex length of a SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash a byte slice and return the 64-char lowercase hex digest.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
