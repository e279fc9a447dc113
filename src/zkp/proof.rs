// src/zkp/proof.rs
//! The ZK-proof service: proof objects, generation and verification.
//!
//! Generation validates credentials against the target circuit, derives (or
//! reuses) an identity, ensures group membership, builds the circuit's public
//! signal and hands the heavy lifting to the proving backend on a blocking
//! task. Verification is cheap and local-first: known group roots and the
//! expected signal are checked before the backend is consulted, and malformed
//! input is a `false`, never an error.

use crate::error::{BlockchainError, Result};
use crate::models::credential::VerifiableCredential;
use crate::zkp::backend::ProvingBackend;
use crate::zkp::circuits::{
    self, available_circuits, find_circuit, Circuit, ProofInputs, AGE_VERIFICATION_CIRCUIT_ID,
    DEFAULT_MIN_AGE, MEMBERSHIP_PROOF_CIRCUIT_ID,
};
use crate::zkp::group::{GroupRegistry, GroupStats, DEFAULT_GROUP_DEPTH};
use crate::zkp::identity::IdentityCache;
use crate::zkp::poseidon::{field_from_decimal, field_to_decimal};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Index of the nullifier hash in [`ZkProof::public_signals`].
pub const SIGNAL_INDEX_NULLIFIER: usize = 0;
/// Index of the Merkle root in [`ZkProof::public_signals`].
pub const SIGNAL_INDEX_ROOT: usize = 1;
/// Index of the signal in [`ZkProof::public_signals`].
pub const SIGNAL_INDEX_SIGNAL: usize = 2;

/// A portable, immutable zero-knowledge proof object.
///
/// `public_signals` is `[nullifierHash, merkleTreeRoot, signal]`, each a
/// decimal field-element string. The proof and verification key are base64.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub proof: String,
    pub public_signals: Vec<String>,
    pub verification_key: String,
    pub circuit: String,
}

impl ZkProof {
    pub fn nullifier_hash(&self) -> Option<&str> {
        self.public_signals.get(SIGNAL_INDEX_NULLIFIER).map(String::as_str)
    }

    pub fn merkle_root(&self) -> Option<&str> {
        self.public_signals.get(SIGNAL_INDEX_ROOT).map(String::as_str)
    }

    pub fn signal(&self) -> Option<&str> {
        self.public_signals.get(SIGNAL_INDEX_SIGNAL).map(String::as_str)
    }
}

/// Generates and verifies zero-knowledge credential proofs.
///
/// The identity cache and group registry are owned, injectable state with an
/// explicit lifecycle: built here, cleared only via
/// [`ZkProofService::clear_caches`], never reset implicitly.
pub struct ZkProofService {
    identities: IdentityCache,
    groups: GroupRegistry,
    backend: Arc<dyn ProvingBackend>,
}

impl ZkProofService {
    /// Builds a service over the given backend with the default group depth.
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self::with_group_depth(backend, DEFAULT_GROUP_DEPTH)
    }

    /// Builds a service with an explicit group depth (tests use small trees).
    pub fn with_group_depth(backend: Arc<dyn ProvingBackend>, depth: usize) -> Self {
        Self {
            identities: IdentityCache::new(),
            groups: GroupRegistry::new(depth),
            backend,
        }
    }

    /// The static circuit catalog.
    pub fn get_available_circuits(&self) -> &'static [Circuit] {
        available_circuits()
    }

    /// Structural credential check for a circuit; unknown circuits are
    /// `false`, not an error.
    pub fn validate_credential_for_circuit(
        &self,
        credential: &VerifiableCredential,
        circuit_id: &str,
    ) -> bool {
        circuits::validate_credential_for_circuit(credential, circuit_id)
    }

    /// Derives the identity for a credential and adds it to the circuit's
    /// group. Returns the commitment. Duplicate additions are no-ops.
    ///
    /// # Errors
    /// `CredentialRequirements` when the credential does not fit the circuit.
    pub fn add_group_member(
        &self,
        circuit_id: &str,
        credential: &VerifiableCredential,
    ) -> Result<String> {
        if !self.validate_credential_for_circuit(credential, circuit_id) {
            return Err(BlockchainError::CredentialRequirements {
                circuit_id: circuit_id.to_string(),
            });
        }
        let identity = self.identities.identity_for_credential(credential);
        let group = self.groups.get_or_create(circuit_id);
        group.lock().unwrap().add_member(identity.commitment())?;
        Ok(identity.commitment_string())
    }

    /// Generates a proof for `circuit_id` over the supplied credentials.
    ///
    /// Requires at least one credential; every credential must pass the
    /// circuit's validation. The identity is derived from the first
    /// credential and enrolled in the circuit's group on first use.
    ///
    /// # Errors
    /// - `EmptyCredentials` ("At least one credential is required").
    /// - `CredentialRequirements` when a credential does not fit the circuit.
    /// - `ProofSystem` when the backend is unavailable or fails
    ///   (configuration category, not retryable).
    pub async fn generate_proof(
        &self,
        circuit_id: &str,
        inputs: &ProofInputs,
        credentials: &[VerifiableCredential],
    ) -> Result<ZkProof> {
        let circuit = find_circuit(circuit_id).ok_or_else(|| BlockchainError::ProofSystem {
            reason: format!("unknown circuit: {circuit_id}"),
        })?;
        if credentials.is_empty() {
            return Err(BlockchainError::EmptyCredentials);
        }
        for credential in credentials {
            if !self.validate_credential_for_circuit(credential, circuit_id) {
                return Err(BlockchainError::CredentialRequirements {
                    circuit_id: circuit_id.to_string(),
                });
            }
        }

        let identity = self.identities.identity_for_credential(&credentials[0]);
        let signal = circuits::build_signal(circuit, inputs, &credentials[0])?;

        // Membership and the path are read under the group lock; the lock is
        // released before the blocking proving call.
        let merkle_proof = {
            let group = self.groups.get_or_create(circuit_id);
            let mut group = group.lock().unwrap();
            group.add_member(identity.commitment())?;
            group.merkle_proof(identity.commitment())?
        };

        debug!(
            "generating {} proof for circuit {circuit_id}",
            self.backend.scheme()
        );
        let backend = Arc::clone(&self.backend);
        let identity_for_task = identity.clone();
        let artifacts = tokio::task::spawn_blocking(move || {
            backend.generate(&identity_for_task, &merkle_proof, signal)
        })
        .await
        .map_err(|e| BlockchainError::ProofSystem {
            reason: format!("proving task failed: {e}"),
        })??;

        info!("proof generated for circuit {circuit_id}");
        Ok(ZkProof {
            proof_type: self.backend.scheme().to_string(),
            proof: base64::encode(&artifacts.proof_bytes),
            public_signals: vec![
                field_to_decimal(artifacts.nullifier_hash),
                field_to_decimal(artifacts.merkle_root),
                field_to_decimal(artifacts.signal),
            ],
            verification_key: base64::encode(&artifacts.verification_key),
            circuit: circuit.id.to_string(),
        })
    }

    /// Verifies a proof against an expected signal and, optionally, a known
    /// group.
    ///
    /// When `group_id` names a locally known group, the proof's claimed root
    /// must equal that group's current root, or verification fails without
    /// consulting the backend. The claimed signal must equal
    /// `expected_signal` the same way. Malformed input of any kind returns
    /// `false`; this method never errors.
    pub fn verify_proof(
        &self,
        proof: &ZkProof,
        expected_signal: &str,
        group_id: Option<&str>,
    ) -> bool {
        let (Some(nullifier), Some(root), Some(signal)) =
            (proof.nullifier_hash(), proof.merkle_root(), proof.signal())
        else {
            return false;
        };
        let (Some(nullifier), Some(root), Some(signal)) = (
            field_from_decimal(nullifier),
            field_from_decimal(root),
            field_from_decimal(signal),
        ) else {
            return false;
        };

        let Some(expected_signal) = field_from_decimal(expected_signal) else {
            return false;
        };
        if signal != expected_signal {
            debug!("proof rejected: signal mismatch");
            return false;
        }

        if let Some(group_id) = group_id {
            if let Some(group) = self.groups.get(group_id) {
                let current_root = group.lock().unwrap().root();
                if root != current_root {
                    debug!("proof rejected: stale or foreign merkle root");
                    return false;
                }
            }
        }

        if self.is_nullifier_used(proof.nullifier_hash().unwrap_or_default()) {
            warn!("proof rejected: nullifier already used");
            return false;
        }

        let (Ok(proof_bytes), Ok(verification_key)) = (
            base64::decode(&proof.proof),
            base64::decode(&proof.verification_key),
        ) else {
            return false;
        };
        self.backend
            .verify(&proof_bytes, &verification_key, &[root, nullifier, signal])
            .unwrap_or(false)
    }

    /// Nullifier double-spend check.
    ///
    /// Extension point: a real deployment needs a persistent nullifier
    /// ledger shared across verifiers; this in-process stub reports every
    /// nullifier as unused.
    pub fn is_nullifier_used(&self, _nullifier_hash: &str) -> bool {
        false
    }

    /// Convenience wrapper: age proof with the default 18+ threshold.
    pub async fn generate_age_verification_proof(
        &self,
        credentials: &[VerifiableCredential],
        min_age: Option<u32>,
    ) -> Result<ZkProof> {
        let inputs = ProofInputs {
            min_age: Some(min_age.unwrap_or(DEFAULT_MIN_AGE)),
            group_id: None,
        };
        self.generate_proof(AGE_VERIFICATION_CIRCUIT_ID, &inputs, credentials)
            .await
    }

    /// Convenience wrapper: membership proof for a student group.
    pub async fn generate_student_status_proof(
        &self,
        credentials: &[VerifiableCredential],
        group_id: &str,
    ) -> Result<ZkProof> {
        let inputs = ProofInputs {
            min_age: None,
            group_id: Some(group_id.to_string()),
        };
        self.generate_proof(MEMBERSHIP_PROOF_CIRCUIT_ID, &inputs, credentials)
            .await
    }

    /// The expected-signal value a verifier should demand for given inputs.
    ///
    /// Lets a verifier compute the signal independently instead of trusting
    /// the prover's claim.
    pub fn expected_signal(
        &self,
        circuit_id: &str,
        inputs: &ProofInputs,
        credential: &VerifiableCredential,
    ) -> Result<String> {
        let circuit = find_circuit(circuit_id).ok_or_else(|| BlockchainError::ProofSystem {
            reason: format!("unknown circuit: {circuit_id}"),
        })?;
        Ok(field_to_decimal(circuits::build_signal(
            circuit, inputs, credential,
        )?))
    }

    /// Shape of the circuit's group, when it exists.
    pub fn get_group_stats(&self, circuit_id: &str) -> Option<GroupStats> {
        self.groups.stats(circuit_id)
    }

    /// Clears the identity cache and every group. Explicit only; nothing in
    /// the service resets state implicitly.
    pub fn clear_caches(&self) {
        self.identities.clear();
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::backend::MockProvingBackend;
    use serde_json::json;

    const GROUP_DEPTH: usize = 8;

    fn service() -> ZkProofService {
        ZkProofService::with_group_depth(Arc::new(MockProvingBackend), GROUP_DEPTH)
    }

    fn age_credential(id: &str, age: u64) -> VerifiableCredential {
        VerifiableCredential {
            id: id.to_string(),
            types: vec!["VerifiableCredential".into(), "AgeCredential".into()],
            issuer: "did:key:zIssuer".into(),
            issuance_date: None,
            credential_subject: json!({ "id": "did:key:zHolder", "age": age }),
            proof: None,
            status: None,
            metadata: None,
        }
    }

    fn student_credential(id: &str) -> VerifiableCredential {
        VerifiableCredential {
            id: id.to_string(),
            types: vec!["VerifiableCredential".into(), "StudentCard".into()],
            issuer: "did:key:zUniversity".into(),
            issuance_date: None,
            credential_subject: json!({ "id": "did:key:zHolder", "studentId": "s-1" }),
            proof: None,
            status: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn age_proof_round_trip() {
        let service = service();
        let credentials = vec![age_credential("urn:uuid:age-1", 22)];
        let proof = service
            .generate_age_verification_proof(&credentials, Some(18))
            .await
            .unwrap();

        assert_eq!(proof.circuit, AGE_VERIFICATION_CIRCUIT_ID);
        assert_eq!(proof.public_signals.len(), 3);
        // The literal age never shows up in the public signals.
        assert!(!proof.public_signals.iter().any(|s| s == "22"));

        let expected = service
            .expected_signal(
                AGE_VERIFICATION_CIRCUIT_ID,
                &ProofInputs {
                    min_age: Some(18),
                    group_id: None,
                },
                &credentials[0],
            )
            .unwrap();
        assert!(service.verify_proof(&proof, &expected, None));
        assert!(service.verify_proof(&proof, &expected, Some(AGE_VERIFICATION_CIRCUIT_ID)));
    }

    #[tokio::test]
    async fn verification_rejects_wrong_signal() {
        let service = service();
        let credentials = vec![age_credential("urn:uuid:age-1", 22)];
        let proof = service
            .generate_age_verification_proof(&credentials, Some(18))
            .await
            .unwrap();

        let other = service
            .expected_signal(
                AGE_VERIFICATION_CIRCUIT_ID,
                &ProofInputs {
                    min_age: Some(21),
                    group_id: None,
                },
                &credentials[0],
            )
            .unwrap();
        assert!(!service.verify_proof(&proof, &other, None));
        assert!(!service.verify_proof(&proof, "not-a-number", None));
    }

    #[tokio::test]
    async fn verification_rejects_foreign_group_root() {
        let service = service();
        let credentials = vec![age_credential("urn:uuid:age-1", 22)];
        let proof = service
            .generate_age_verification_proof(&credentials, Some(18))
            .await
            .unwrap();
        let expected = proof.signal().unwrap().to_string();

        // Growing the group moves the root; the old proof no longer matches
        // the group's current state.
        service
            .add_group_member(
                AGE_VERIFICATION_CIRCUIT_ID,
                &age_credential("urn:uuid:age-2", 33),
            )
            .unwrap();
        assert!(!service.verify_proof(&proof, &expected, Some(AGE_VERIFICATION_CIRCUIT_ID)));
        // Without the group pin the proof still verifies cryptographically.
        assert!(service.verify_proof(&proof, &expected, None));
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected() {
        let service = service();
        let err = service
            .generate_proof(AGE_VERIFICATION_CIRCUIT_ID, &ProofInputs::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::EmptyCredentials));
        assert_eq!(err.to_string(), "At least one credential is required");
    }

    #[tokio::test]
    async fn mismatched_credential_is_rejected() {
        let service = service();
        let err = service
            .generate_proof(
                AGE_VERIFICATION_CIRCUIT_ID,
                &ProofInputs::default(),
                &[student_credential("urn:uuid:student-1")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::CredentialRequirements { .. }));
        assert_eq!(
            err.user_message(),
            "Credential does not meet circuit requirements"
        );
    }

    #[tokio::test]
    async fn unknown_circuit_is_a_configuration_error() {
        let service = service();
        let err = service
            .generate_proof(
                "no-such-circuit",
                &ProofInputs::default(),
                &[age_credential("urn:uuid:age-1", 22)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
        assert!(err.to_string().starts_with("ZK-proof generation failed"));
    }

    #[tokio::test]
    async fn student_status_proof_round_trip() {
        let service = service();
        let credentials = vec![student_credential("urn:uuid:student-1")];
        let proof = service
            .generate_student_status_proof(&credentials, "uni-a")
            .await
            .unwrap();
        assert_eq!(proof.circuit, MEMBERSHIP_PROOF_CIRCUIT_ID);

        let expected = service
            .expected_signal(
                MEMBERSHIP_PROOF_CIRCUIT_ID,
                &ProofInputs {
                    min_age: None,
                    group_id: Some("uni-a".into()),
                },
                &credentials[0],
            )
            .unwrap();
        assert!(service.verify_proof(&proof, &expected, Some(MEMBERSHIP_PROOF_CIRCUIT_ID)));
    }

    #[tokio::test]
    async fn repeated_generation_reuses_identity_and_group_slot() {
        let service = service();
        let credentials = vec![age_credential("urn:uuid:age-1", 22)];
        service
            .generate_age_verification_proof(&credentials, None)
            .await
            .unwrap();
        let stats_before = service.get_group_stats(AGE_VERIFICATION_CIRCUIT_ID).unwrap();
        service
            .generate_age_verification_proof(&credentials, None)
            .await
            .unwrap();
        let stats_after = service.get_group_stats(AGE_VERIFICATION_CIRCUIT_ID).unwrap();
        assert_eq!(stats_before.member_count, 1);
        assert_eq!(stats_after.member_count, 1);
        assert_eq!(stats_before.root, stats_after.root);
    }

    #[tokio::test]
    async fn clear_caches_resets_groups() {
        let service = service();
        service
            .generate_age_verification_proof(&[age_credential("urn:uuid:age-1", 22)], None)
            .await
            .unwrap();
        assert!(service.get_group_stats(AGE_VERIFICATION_CIRCUIT_ID).is_some());
        service.clear_caches();
        assert!(service.get_group_stats(AGE_VERIFICATION_CIRCUIT_ID).is_none());
    }
}
