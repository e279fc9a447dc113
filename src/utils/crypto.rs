// src/utils/crypto.rs
//! Cryptographic utilities aligned with substrate-style chains.
//!
//! Uses BLAKE2 (substrate's standard hash family) for all digests.

use blake2::{Blake2s256, Digest};

/// Computes a BLAKE2s-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_input_sensitive() {
        assert_eq!(hash_data(b"abc"), hash_data(b"abc"));
        assert_ne!(hash_data(b"abc"), hash_data(b"abd"));
    }
}
