// src/zkp/identity.rs
//! Deterministic zero-knowledge identities.
//!
//! An identity is a secret field element plus its public Poseidon commitment.
//! The secret is derived from stable credential fields or from a
//! wallet-signed challenge, so the same seed always reproduces the same
//! identity. Secrets never leave the process and never appear in logs or
//! serialized output.

use crate::blockchain::client::WalletSigner;
use crate::error::Result;
use crate::models::credential::VerifiableCredential;
use crate::utils::crypto::hash_data;
use crate::zkp::poseidon::{field_from_bytes, field_to_decimal, hash_one, hash_two};
use ark_bn254::Fr;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

/// Domain separator for wallet-derived identity challenges.
const WALLET_CHALLENGE_DOMAIN: &str = "zkdid-identity:v1";

/// Field separator for credential seed material.
const SEED_SEPARATOR: u8 = 0x1f;

/// A zero-knowledge identity: a secret scalar and its public commitment.
#[derive(Clone, PartialEq, Eq)]
pub struct ZkIdentity {
    secret: Fr,
    commitment: Fr,
}

impl ZkIdentity {
    pub(crate) fn from_secret(secret: Fr) -> Self {
        Self {
            secret,
            commitment: hash_one(secret),
        }
    }

    /// The public commitment, safe to share and to insert into groups.
    pub fn commitment(&self) -> Fr {
        self.commitment
    }

    /// Decimal string form of the commitment.
    pub fn commitment_string(&self) -> String {
        field_to_decimal(self.commitment)
    }

    /// The secret scalar; only the proving backend reads this.
    pub(crate) fn secret(&self) -> Fr {
        self.secret
    }
}

impl std::fmt::Debug for ZkIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret stays out of Debug output.
        f.debug_struct("ZkIdentity")
            .field("commitment", &self.commitment_string())
            .finish_non_exhaustive()
    }
}

/// Derives an identity from a credential's stable fields.
///
/// Seed material is `hash(id ‖ subjectId ‖ issuerId ‖ issuanceDate)` combined
/// with `hash(id)` through the two-input Poseidon hash, in that fixed order.
pub fn derive_from_credential(credential: &VerifiableCredential) -> ZkIdentity {
    let mut seed = Vec::new();
    for part in [
        credential.id.as_str(),
        credential.subject_id().unwrap_or_default(),
        credential.issuer.as_str(),
        credential
            .issuance_date
            .map(|date| date.to_rfc3339())
            .unwrap_or_default()
            .as_str(),
    ] {
        seed.extend_from_slice(part.as_bytes());
        seed.push(SEED_SEPARATOR);
    }

    let combined = field_from_bytes(&hash_data(&seed));
    let id_part = field_from_bytes(&hash_data(credential.id.as_bytes()));
    ZkIdentity::from_secret(hash_two(combined, id_part))
}

/// The deterministic challenge message a wallet signs to derive an identity.
pub fn wallet_challenge(address: &str) -> String {
    format!("{WALLET_CHALLENGE_DOMAIN}:{address}")
}

/// Derives an identity from a wallet signature over the domain-separated
/// challenge for its address.
///
/// Relies on the wallet producing deterministic signatures for the same
/// message, which sr25519 wallets do for a fixed signing context.
pub fn derive_from_wallet(signer: &dyn WalletSigner) -> Result<ZkIdentity> {
    let challenge = wallet_challenge(signer.address());
    let signature = signer.sign_message(challenge.as_bytes())?;
    let signature_part = field_from_bytes(&hash_data(&signature));
    let address_part = field_from_bytes(&hash_data(signer.address().as_bytes()));
    Ok(ZkIdentity::from_secret(hash_two(
        signature_part,
        address_part,
    )))
}

/// Process-wide identity cache keyed by seed identity.
///
/// Injectable state with an explicit lifecycle: created with its owning
/// service, cleared only via [`IdentityCache::clear`]. Repeated derivations
/// for the same seed are cache hits and therefore idempotent and cheap.
pub struct IdentityCache {
    entries: Mutex<HashMap<String, ZkIdentity>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn credential_key(credential: &VerifiableCredential) -> String {
        format!(
            "credential:{}:{}",
            credential.id,
            credential.subject_id().unwrap_or_default()
        )
    }

    fn wallet_key(address: &str) -> String {
        format!("wallet:{address}")
    }

    /// Cached identity for a credential, deriving on first use.
    pub fn identity_for_credential(&self, credential: &VerifiableCredential) -> ZkIdentity {
        let key = Self::credential_key(credential);
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(key.clone())
            .or_insert_with(|| {
                debug!("deriving identity for {key}");
                derive_from_credential(credential)
            })
            .clone()
    }

    /// Cached identity for a wallet account, deriving on first use.
    pub fn identity_for_wallet(&self, signer: &dyn WalletSigner) -> Result<ZkIdentity> {
        let key = Self::wallet_key(signer.address());
        if let Some(identity) = self.entries.lock().unwrap().get(&key) {
            return Ok(identity.clone());
        }
        // Derivation signs a challenge, so it happens outside the lock.
        let identity = derive_from_wallet(signer)?;
        self.entries
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(identity.clone());
        Ok(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Drops every cached identity. Never called implicitly.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}
