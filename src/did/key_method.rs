// src/did/key_method.rs
//! The `did:key` method for chain accounts.
//!
//! Fully stateless: a DID and its document are pure functions of the account
//! public key, so this method needs neither chain connectivity nor storage.
//! It is the fast path for "prove you control this key" authentication flows;
//! on-chain presence is the second method's business.
//!
//! Round-trip invariant: for every valid address `a`,
//! `resolve(derive_did(a)) == create_did_document(a)` and
//! `extract_address(derive_did(a)) == a`.

use crate::config::ChainConfig;
use crate::error::{BlockchainError, Result};
use crate::models::did::{DidDocument, VerificationMethod, DID_CONTEXT, SR25519_CONTEXT};
use crate::utils::codec::{
    decode_multibase_key, decode_ss58, encode_multibase_key, encode_ss58, KeyAlgorithm,
};

/// Method prefix for all identifiers produced here.
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Derives the `did:key` identifier for a chain account address.
///
/// Deterministic and idempotent: the same address always yields the same DID.
///
/// # Errors
/// - `AddressValidation` when the address does not parse under SS58.
/// - `EncodingFailed` when multibase encoding fails (internal, fatal).
pub fn derive_did(_config: &ChainConfig, address: &str) -> Result<String> {
    let (public_key, _) = decode_ss58(address)?;
    let multibase = encode_multibase_key(KeyAlgorithm::Sr25519, &public_key)?;
    Ok(format!("{DID_KEY_PREFIX}{multibase}"))
}

/// Builds the DID Document for a chain account address.
///
/// The document carries exactly one verification method, typed after the
/// chain's native signature scheme, referenced by every capability list
/// except `keyAgreement`: the account key signs, it cannot do key agreement.
pub fn create_did_document(config: &ChainConfig, address: &str) -> Result<DidDocument> {
    let did = derive_did(config, address)?;
    let multibase = &did[DID_KEY_PREFIX.len()..];
    Ok(build_document(&did, multibase, KeyAlgorithm::Sr25519))
}

/// Resolves a `did:key` string back to its DID Document.
///
/// # Errors
/// - `InvalidDidFormat` when the prefix or multibase structure is wrong.
/// - `InvalidPublicKey` when the payload does not decode to a known key type.
pub fn resolve(_config: &ChainConfig, did: &str) -> Result<DidDocument> {
    let multibase = parse_did_key(did)?;
    let (algo, _key) = decode_multibase_key(multibase)?;
    Ok(build_document(did, multibase, algo))
}

/// Extracts the chain-native account address from a `did:key` identifier.
///
/// Inverse of [`derive_did`]; shares its failure modes with [`resolve`].
pub fn extract_address(config: &ChainConfig, did: &str) -> Result<String> {
    let multibase = parse_did_key(did)?;
    let (_algo, key) = decode_multibase_key(multibase)?;
    let key: [u8; 32] = key.try_into().map_err(|_| BlockchainError::InvalidPublicKey {
        reason: "unexpected key length".to_string(),
    })?;
    Ok(encode_ss58(&key, config.ss58_prefix))
}

fn parse_did_key(did: &str) -> Result<&str> {
    let multibase = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| BlockchainError::InvalidDidFormat {
            did: did.to_string(),
        })?;
    if multibase.is_empty() {
        return Err(BlockchainError::InvalidDidFormat {
            did: did.to_string(),
        });
    }
    Ok(multibase)
}

/// Short key fingerprint used as the verification-method fragment.
fn short_fingerprint(multibase: &str) -> &str {
    &multibase[..multibase.len().min(9)]
}

fn build_document(did: &str, multibase: &str, algo: KeyAlgorithm) -> DidDocument {
    let vm_id = format!("{did}#{}", short_fingerprint(multibase));
    let verification_method = VerificationMethod {
        id: vm_id.clone(),
        method_type: algo.verification_method_type().to_string(),
        controller: did.to_string(),
        public_key_multibase: multibase.to_string(),
    };
    DidDocument {
        context: vec![DID_CONTEXT.to_string(), SR25519_CONTEXT.to_string()],
        id: did.to_string(),
        controller: None,
        verification_method: vec![verification_method],
        authentication: vec![vm_id.clone()],
        assertion_method: vec![vm_id.clone()],
        capability_invocation: vec![vm_id.clone()],
        capability_delegation: vec![vm_id],
        key_agreement: vec![],
        service: vec![],
        chain_metadata: None,
    }
}
