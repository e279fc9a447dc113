// src/zkp/poseidon.rs
//! Poseidon hashing over BN254, shared by native and in-circuit code paths.
//!
//! The configuration is the rate-2, capacity-1 instance used for Merkle
//! hashing (8 full rounds, 57 partial rounds, alpha 5), generated once per
//! process from the Grain LFSR and cached. Hashing is order-sensitive: the
//! two inputs of [`hash_two`] are never interchangeable.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{
    find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge,
};
use ark_crypto_primitives::sponge::{CryptographicSponge, FieldBasedCryptographicSponge};
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use std::str::FromStr;

use crate::utils::crypto::hash_data;

const FULL_ROUNDS: usize = 8;
const PARTIAL_ROUNDS: usize = 57;
const ALPHA: u64 = 5;
const RATE: usize = 2;
const CAPACITY: usize = 1;

/// Cached Poseidon configuration for BN254.
static POSEIDON_CONFIG: Lazy<PoseidonConfig<Fr>> = Lazy::new(|| {
    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        Fr::MODULUS_BIT_SIZE as u64,
        RATE,
        FULL_ROUNDS as u64,
        PARTIAL_ROUNDS as u64,
        0,
    );
    PoseidonConfig {
        full_rounds: FULL_ROUNDS,
        partial_rounds: PARTIAL_ROUNDS,
        alpha: ALPHA,
        mds,
        ark,
        rate: RATE,
        capacity: CAPACITY,
    }
});

/// Returns a clone of the global Poseidon configuration.
///
/// The same instance parameterizes both the native sponge here and the
/// R1CS sponge inside the membership circuit; they must never diverge.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    POSEIDON_CONFIG.clone()
}

/// Poseidon hash of a single field element.
pub fn hash_one(input: Fr) -> Fr {
    let mut sponge = PoseidonSponge::new(&*POSEIDON_CONFIG);
    sponge.absorb(&vec![input]);
    sponge.squeeze_native_field_elements(1)[0]
}

/// Poseidon hash of an ordered pair of field elements.
pub fn hash_two(left: Fr, right: Fr) -> Fr {
    let mut sponge = PoseidonSponge::new(&*POSEIDON_CONFIG);
    sponge.absorb(&vec![left, right]);
    sponge.squeeze_native_field_elements(1)[0]
}

/// Reduces arbitrary bytes into a field element (little-endian, mod p).
pub fn field_from_bytes(bytes: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Hashes a UTF-8 string into a field element.
pub fn field_from_str_data(data: &str) -> Fr {
    field_from_bytes(&hash_data(data.as_bytes()))
}

/// Decimal string form of a field element, as carried in public signals.
pub fn field_to_decimal(value: Fr) -> String {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le()).to_string()
}

/// Parses a decimal public-signal string back into a field element.
///
/// `None` for anything that is not a non-negative decimal integer.
pub fn field_from_decimal(value: &str) -> Option<Fr> {
    let parsed = BigUint::from_str(value).ok()?;
    Some(Fr::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let a = Fr::from(7u64);
        let b = Fr::from(11u64);
        assert_eq!(hash_two(a, b), hash_two(a, b));
        assert_eq!(hash_one(a), hash_one(a));
    }

    #[test]
    fn hashing_is_order_sensitive() {
        let a = Fr::from(7u64);
        let b = Fr::from(11u64);
        assert_ne!(hash_two(a, b), hash_two(b, a));
        assert_ne!(hash_one(a), hash_two(a, a));
    }

    #[test]
    fn decimal_round_trip() {
        let value = hash_two(Fr::from(1u64), Fr::from(2u64));
        let decimal = field_to_decimal(value);
        assert_eq!(field_from_decimal(&decimal), Some(value));
        assert!(field_from_decimal("not-a-number").is_none());
        assert!(field_from_decimal("-4").is_none());
    }

    #[test]
    fn string_reduction_is_stable() {
        assert_eq!(field_from_str_data("group-a"), field_from_str_data("group-a"));
        assert_ne!(field_from_str_data("group-a"), field_from_str_data("group-b"));
    }
}
