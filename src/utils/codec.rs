// src/utils/codec.rs
//! Account-key codecs: SS58 addresses and multibase/multicodec key strings.
//!
//! Pure functions, no I/O. These are the primitives underneath the `did:key`
//! method: a chain-native SS58 address decodes to a raw 32-byte public key,
//! which re-encodes as a multibase (`z`, base58-btc) string carrying a
//! multicodec tag for the signature scheme.
//!
//! SS58 layout: `base58(prefix-bytes ++ public-key ++ checksum)` where the
//! checksum is the first two bytes of `blake2b-512("SS58PRE" ++ prefix-bytes
//! ++ public-key)`.

use crate::error::{BlockchainError, Result};
use blake2::{Blake2b512, Digest};

/// Multibase prefix character for base58-btc.
pub const MULTIBASE_BASE58_BTC: char = 'z';

const SS58_PREFIX_SALT: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;
const PUBLIC_KEY_LEN: usize = 32;

/// Signature schemes recognized by the key codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// Schnorrkel/Ristretto, the default scheme for substrate accounts.
    Sr25519,
    /// Edwards-curve Ed25519.
    Ed25519,
}

impl KeyAlgorithm {
    /// Registered multicodec value for the public-key type.
    pub fn multicodec(&self) -> u16 {
        match self {
            Self::Sr25519 => 0xef,
            Self::Ed25519 => 0xed,
        }
    }

    /// Looks up an algorithm from its multicodec value.
    pub fn from_multicodec(value: u16) -> Option<Self> {
        match value {
            0xef => Some(Self::Sr25519),
            0xed => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// W3C verification-method type string for this scheme.
    pub fn verification_method_type(&self) -> &'static str {
        match self {
            Self::Sr25519 => "Sr25519VerificationKey2020",
            Self::Ed25519 => "Ed25519VerificationKey2020",
        }
    }

    /// Raw public key length in bytes.
    pub fn public_key_len(&self) -> usize {
        PUBLIC_KEY_LEN
    }
}

/// Encodes a `u16` as an unsigned varint (LEB128, 7 bits per byte).
pub(crate) fn encode_varint(mut value: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes an unsigned varint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Multicodec key tags
/// all fit in a `u16`, so longer encodings are rejected.
pub(crate) fn decode_varint(bytes: &[u8]) -> Result<(u16, usize)> {
    let mut value: u16 = 0;
    let mut shift = 0u32;
    for (i, byte) in bytes.iter().enumerate() {
        if i > 2 {
            return Err(BlockchainError::InvalidPublicKey {
                reason: "multicodec varint exceeds u16 range".to_string(),
            });
        }
        value |= u16::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(BlockchainError::InvalidPublicKey {
        reason: "truncated multicodec varint".to_string(),
    })
}

fn ss58_checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_PREFIX_SALT);
    hasher.update(payload);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

/// Encodes a raw public key as an SS58 address under the given network prefix.
pub fn encode_ss58(public_key: &[u8; PUBLIC_KEY_LEN], prefix: u16) -> String {
    let mut data = Vec::with_capacity(2 + PUBLIC_KEY_LEN + CHECKSUM_LEN);
    if prefix < 64 {
        data.push(prefix as u8);
    } else {
        // Two-byte form for prefixes 64..=16383, per the SS58 registry.
        data.push(((prefix & 0b0000_0000_1111_1100) >> 2) as u8 | 0b0100_0000);
        data.push(((prefix >> 8) as u8) | (((prefix & 0b11) as u8) << 6));
    }
    data.extend_from_slice(public_key);
    let checksum = ss58_checksum(&data);
    data.extend_from_slice(&checksum);
    bs58::encode(data).into_string()
}

/// Decodes an SS58 address into its raw public key and network prefix.
///
/// # Errors
/// `AddressValidation` when the string is not base58, has the wrong length,
/// or fails the checksum.
pub fn decode_ss58(address: &str) -> Result<([u8; PUBLIC_KEY_LEN], u16)> {
    let invalid = |reason: &str| BlockchainError::AddressValidation {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| invalid(&format!("not base58: {e}")))?;

    if data.len() < 1 + PUBLIC_KEY_LEN + CHECKSUM_LEN {
        return Err(invalid("too short for an SS58 address"));
    }

    let (prefix, prefix_len) = if data[0] < 64 {
        (u16::from(data[0]), 1)
    } else if data[0] < 128 {
        if data.len() < 2 + PUBLIC_KEY_LEN + CHECKSUM_LEN {
            return Err(invalid("too short for a two-byte prefix"));
        }
        let lower = (u16::from(data[0] & 0b0011_1111)) << 2 | u16::from(data[1] >> 6);
        let upper = u16::from(data[1] & 0b0011_1111) << 8;
        (lower | upper, 2)
    } else {
        return Err(invalid("reserved SS58 prefix"));
    };

    if data.len() != prefix_len + PUBLIC_KEY_LEN + CHECKSUM_LEN {
        return Err(invalid("unexpected SS58 payload length"));
    }

    let (payload, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
    if ss58_checksum(payload) != checksum {
        return Err(invalid("checksum mismatch"));
    }

    let mut key = [0u8; PUBLIC_KEY_LEN];
    key.copy_from_slice(&payload[prefix_len..]);
    Ok((key, prefix))
}

/// Encodes a public key as a multibase string: `z` + base58-btc of the
/// multicodec tag followed by the key bytes.
///
/// # Errors
/// `EncodingFailed` when the key length does not match the algorithm; this is
/// internal and fatal, never retried.
pub fn encode_multibase_key(algo: KeyAlgorithm, public_key: &[u8]) -> Result<String> {
    if public_key.len() != algo.public_key_len() {
        return Err(BlockchainError::EncodingFailed {
            reason: format!(
                "expected {} key bytes, got {}",
                algo.public_key_len(),
                public_key.len()
            ),
        });
    }
    let mut tagged = encode_varint(algo.multicodec());
    tagged.extend_from_slice(public_key);
    Ok(format!(
        "{MULTIBASE_BASE58_BTC}{}",
        bs58::encode(tagged).into_string()
    ))
}

/// Decodes a multibase key string back into its algorithm and raw key bytes.
///
/// # Errors
/// - `InvalidDidFormat` when the multibase prefix is not base58-btc.
/// - `InvalidPublicKey` when the payload does not base58-decode, the
///   multicodec tag is unrecognized, or the key length is wrong.
pub fn decode_multibase_key(multibase: &str) -> Result<(KeyAlgorithm, Vec<u8>)> {
    let mut chars = multibase.chars();
    if chars.next() != Some(MULTIBASE_BASE58_BTC) {
        return Err(BlockchainError::InvalidDidFormat {
            did: multibase.to_string(),
        });
    }

    let payload = bs58::decode(chars.as_str()).into_vec().map_err(|e| {
        BlockchainError::InvalidPublicKey {
            reason: format!("not base58: {e}"),
        }
    })?;

    let (codec, consumed) = decode_varint(&payload)?;
    let algo = KeyAlgorithm::from_multicodec(codec).ok_or_else(|| {
        BlockchainError::InvalidPublicKey {
            reason: format!("unrecognized multicodec value 0x{codec:x}"),
        }
    })?;

    let key = &payload[consumed..];
    if key.len() != algo.public_key_len() {
        return Err(BlockchainError::InvalidPublicKey {
            reason: format!(
                "expected {} key bytes, got {}",
                algo.public_key_len(),
                key.len()
            ),
        });
    }
    Ok((algo, key.to_vec()))
}
