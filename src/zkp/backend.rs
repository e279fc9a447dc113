// src/zkp/backend.rs
//! Proving backends.
//!
//! The backend is an injected capability with `generate`/`verify`; the
//! Groth16 implementation and the deterministic mock both satisfy it, so
//! services and tests pick one at construction time. Proof generation is
//! computationally heavy and is expected to run off the async path (the
//! proof service wraps calls in a blocking task).
//!
//! Public input order is fixed across backends:
//! `[merkle_root, nullifier_hash, signal]`.

use crate::error::{BlockchainError, Result};
use crate::zkp::group::MerkleProof;
use crate::zkp::identity::ZkIdentity;
use crate::zkp::poseidon::{hash_two, poseidon_config};
use ark_bn254::{Bn254, Fr};
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_ff::PrimeField;
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use log::{debug, info};
use rand::rngs::OsRng;

/// Everything a backend returns for one generated proof.
#[derive(Debug, Clone)]
pub struct ProofArtifacts {
    /// Serialized proof, backend-specific encoding.
    pub proof_bytes: Vec<u8>,
    /// Serialized verification key matching this proof.
    pub verification_key: Vec<u8>,
    pub nullifier_hash: Fr,
    pub merkle_root: Fr,
    pub signal: Fr,
}

/// An opaque proving/verifying backend.
pub trait ProvingBackend: Send + Sync {
    /// Short scheme label carried in proof objects (e.g. `"groth16"`).
    fn scheme(&self) -> &'static str;

    /// Proves knowledge of an identity secret whose commitment sits under
    /// `merkle_proof.root`, bound to `signal`.
    fn generate(
        &self,
        identity: &ZkIdentity,
        merkle_proof: &MerkleProof,
        signal: Fr,
    ) -> Result<ProofArtifacts>;

    /// Verifies a proof against `[merkle_root, nullifier_hash, signal]`.
    ///
    /// Malformed proof or key material is a verification failure
    /// (`Ok(false)`), never an error.
    fn verify(
        &self,
        proof_bytes: &[u8],
        verification_key: &[u8],
        public_inputs: &[Fr; 3],
    ) -> Result<bool>;
}

/// Membership circuit: proves that the Poseidon commitment of a private
/// secret sits in a Merkle tree with a public root, and binds a public
/// nullifier and signal to the proof.
#[derive(Clone)]
struct MembershipCircuit<F: PrimeField> {
    /// Identity secret (private witness).
    secret: Option<F>,
    /// Sibling nodes along the Merkle path (private witnesses).
    siblings: Vec<F>,
    /// Path directions (0 = current node is the left child).
    path_indices: Vec<u8>,
    /// Claimed root (public input).
    root: F,
    /// `poseidon(secret, signal)` (public input).
    nullifier_hash: F,
    /// Public signal the proof attests to.
    signal: F,
    poseidon_config: PoseidonConfig<F>,
}

impl<F: PrimeField> MembershipCircuit<F> {
    fn blank(depth: usize, poseidon_config: PoseidonConfig<F>) -> Self {
        Self {
            secret: Some(F::zero()),
            siblings: vec![F::zero(); depth],
            path_indices: vec![0; depth],
            root: F::zero(),
            nullifier_hash: F::zero(),
            signal: F::zero(),
            poseidon_config,
        }
    }
}

impl<F: PrimeField> ConstraintSynthesizer<F> for MembershipCircuit<F> {
    fn generate_constraints(
        self,
        cs: ConstraintSystemRef<F>,
    ) -> std::result::Result<(), SynthesisError> {
        let secret = FpVar::new_witness(cs.clone(), || {
            self.secret.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let root = FpVar::new_input(cs.clone(), || Ok(self.root))?;
        let nullifier = FpVar::new_input(cs.clone(), || Ok(self.nullifier_hash))?;
        let signal = FpVar::new_input(cs.clone(), || Ok(self.signal))?;

        // commitment = poseidon(secret)
        let mut sponge = PoseidonSpongeVar::<F>::new(cs.clone(), &self.poseidon_config);
        sponge.absorb(&vec![secret.clone()])?;
        let mut current = sponge.squeeze_field_elements(1)?.remove(0);

        // Fold the Merkle path up to the claimed root.
        for (sibling, index) in self.siblings.iter().zip(self.path_indices.iter()) {
            let sibling_var = FpVar::new_witness(cs.clone(), || Ok(*sibling))?;
            let (left, right) = if *index == 0 {
                (current.clone(), sibling_var)
            } else {
                (sibling_var, current.clone())
            };
            let mut sponge = PoseidonSpongeVar::<F>::new(cs.clone(), &self.poseidon_config);
            sponge.absorb(&vec![left, right])?;
            current = sponge.squeeze_field_elements(1)?.remove(0);
        }
        current.enforce_equal(&root)?;

        // nullifier = poseidon(secret, signal); ties the proof to one use
        // context per signal.
        let mut sponge = PoseidonSpongeVar::<F>::new(cs.clone(), &self.poseidon_config);
        sponge.absorb(&vec![secret, signal.clone()])?;
        let computed_nullifier = sponge.squeeze_field_elements(1)?.remove(0);
        computed_nullifier.enforce_equal(&nullifier)?;

        // Square the signal so it cannot be stripped from the proof.
        let _ = &signal * &signal;
        Ok(())
    }
}

/// Groth16 backend over BN254 with a circuit-specific key pair.
///
/// Setup runs once per backend instance for a fixed tree depth; the
/// verification key is serialized and shipped with every proof so verifiers
/// need no local artifacts.
pub struct Groth16Backend {
    depth: usize,
    proving_key: ProvingKey<Bn254>,
    verifying_key: VerifyingKey<Bn254>,
    verifying_key_bytes: Vec<u8>,
}

impl Groth16Backend {
    /// Runs the circuit-specific setup for trees of the given depth.
    ///
    /// # Errors
    /// `ProofSystem` when key generation fails.
    pub fn setup(depth: usize) -> Result<Self> {
        info!("running Groth16 setup for membership circuit (depth {depth})");
        let circuit = MembershipCircuit::blank(depth, poseidon_config());
        let mut rng = OsRng;
        let (proving_key, verifying_key) =
            Groth16::<Bn254>::setup(circuit, &mut rng).map_err(|e| {
                BlockchainError::ProofSystem {
                    reason: format!("circuit setup failed: {e}"),
                }
            })?;

        let mut verifying_key_bytes = Vec::new();
        verifying_key
            .serialize_compressed(&mut verifying_key_bytes)
            .map_err(|e| BlockchainError::ProofSystem {
                reason: format!("verification key serialization failed: {e}"),
            })?;

        Ok(Self {
            depth,
            proving_key,
            verifying_key,
            verifying_key_bytes,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl ProvingBackend for Groth16Backend {
    fn scheme(&self) -> &'static str {
        "groth16"
    }

    fn generate(
        &self,
        identity: &ZkIdentity,
        merkle_proof: &MerkleProof,
        signal: Fr,
    ) -> Result<ProofArtifacts> {
        if merkle_proof.siblings.len() != self.depth {
            return Err(BlockchainError::ProofSystem {
                reason: format!(
                    "merkle path depth {} does not match circuit depth {}",
                    merkle_proof.siblings.len(),
                    self.depth
                ),
            });
        }

        let nullifier_hash = hash_two(identity.secret(), signal);
        let circuit = MembershipCircuit {
            secret: Some(identity.secret()),
            siblings: merkle_proof.siblings.clone(),
            path_indices: merkle_proof.path_indices.clone(),
            root: merkle_proof.root,
            nullifier_hash,
            signal,
            poseidon_config: poseidon_config(),
        };

        let mut rng = OsRng;
        let proof = Groth16::<Bn254>::prove(&self.proving_key, circuit, &mut rng).map_err(
            |e| BlockchainError::ProofSystem {
                reason: format!("proving failed: {e}"),
            },
        )?;

        let mut proof_bytes = Vec::new();
        proof
            .serialize_compressed(&mut proof_bytes)
            .map_err(|e| BlockchainError::ProofSystem {
                reason: format!("proof serialization failed: {e}"),
            })?;
        debug!("generated groth16 proof ({} bytes)", proof_bytes.len());

        Ok(ProofArtifacts {
            proof_bytes,
            verification_key: self.verifying_key_bytes.clone(),
            nullifier_hash,
            merkle_root: merkle_proof.root,
            signal,
        })
    }

    fn verify(
        &self,
        proof_bytes: &[u8],
        verification_key: &[u8],
        public_inputs: &[Fr; 3],
    ) -> Result<bool> {
        let Ok(proof) = Proof::<Bn254>::deserialize_compressed(proof_bytes) else {
            return Ok(false);
        };
        // Prefer the proof-carried key; fall back to this instance's key for
        // proofs generated here.
        let verifying_key = match VerifyingKey::<Bn254>::deserialize_compressed(verification_key)
        {
            Ok(vk) => vk,
            Err(_) if verification_key.is_empty() => self.verifying_key.clone(),
            Err(_) => return Ok(false),
        };
        Ok(Groth16::<Bn254>::verify(&verifying_key, public_inputs, &proof).unwrap_or(false))
    }
}

/// Deterministic backend for tests: the "proof" is just the canonical
/// serialization of the public inputs, and verification checks they match.
pub struct MockProvingBackend;

const MOCK_VERIFICATION_KEY: &[u8] = b"mock-verification-key";

impl ProvingBackend for MockProvingBackend {
    fn scheme(&self) -> &'static str {
        "mock"
    }

    fn generate(
        &self,
        identity: &ZkIdentity,
        merkle_proof: &MerkleProof,
        signal: Fr,
    ) -> Result<ProofArtifacts> {
        let nullifier_hash = hash_two(identity.secret(), signal);
        let mut proof_bytes = Vec::new();
        for value in [merkle_proof.root, nullifier_hash, signal] {
            value
                .serialize_compressed(&mut proof_bytes)
                .map_err(|e| BlockchainError::ProofSystem {
                    reason: format!("mock serialization failed: {e}"),
                })?;
        }
        Ok(ProofArtifacts {
            proof_bytes,
            verification_key: MOCK_VERIFICATION_KEY.to_vec(),
            nullifier_hash,
            merkle_root: merkle_proof.root,
            signal,
        })
    }

    fn verify(
        &self,
        proof_bytes: &[u8],
        verification_key: &[u8],
        public_inputs: &[Fr; 3],
    ) -> Result<bool> {
        if verification_key != MOCK_VERIFICATION_KEY {
            return Ok(false);
        }
        let mut reader = proof_bytes;
        for expected in public_inputs {
            let Ok(embedded) = Fr::deserialize_compressed(&mut reader) else {
                return Ok(false);
            };
            if embedded != *expected {
                return Ok(false);
            }
        }
        Ok(reader.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::group::Group;
    use crate::zkp::identity::ZkIdentity;

    fn member_identity(n: u64) -> ZkIdentity {
        ZkIdentity::from_secret(Fr::from(n))
    }

    #[test]
    fn mock_backend_round_trip_and_tamper_rejection() {
        let backend = MockProvingBackend;
        let mut group = Group::new("test", 4);
        let identity = member_identity(5);
        group.add_member(identity.commitment()).unwrap();
        let merkle_proof = group.merkle_proof(identity.commitment()).unwrap();
        let signal = Fr::from(99u64);

        let artifacts = backend.generate(&identity, &merkle_proof, signal).unwrap();
        let publics = [artifacts.merkle_root, artifacts.nullifier_hash, artifacts.signal];
        assert!(backend
            .verify(&artifacts.proof_bytes, &artifacts.verification_key, &publics)
            .unwrap());

        let tampered = [artifacts.merkle_root, artifacts.nullifier_hash, Fr::from(7u64)];
        assert!(!backend
            .verify(&artifacts.proof_bytes, &artifacts.verification_key, &tampered)
            .unwrap());
        assert!(!backend
            .verify(b"garbage", &artifacts.verification_key, &publics)
            .unwrap());
    }

    // Small depth keeps setup and proving fast; the circuit shape is
    // identical at depth 20.
    #[test]
    fn groth16_backend_proves_and_verifies_membership() {
        let backend = Groth16Backend::setup(2).unwrap();
        let mut group = Group::new("test", 2);
        let identity = member_identity(42);
        group.add_member(member_identity(1).commitment()).unwrap();
        group.add_member(identity.commitment()).unwrap();
        let merkle_proof = group.merkle_proof(identity.commitment()).unwrap();
        let signal = Fr::from(1234u64);

        let artifacts = backend.generate(&identity, &merkle_proof, signal).unwrap();
        let publics = [artifacts.merkle_root, artifacts.nullifier_hash, artifacts.signal];
        assert!(backend
            .verify(&artifacts.proof_bytes, &artifacts.verification_key, &publics)
            .unwrap());

        // A different signal must not verify.
        let wrong_signal = hash_two(identity.secret(), Fr::from(4321u64));
        let tampered = [artifacts.merkle_root, wrong_signal, Fr::from(4321u64)];
        assert!(!backend
            .verify(&artifacts.proof_bytes, &artifacts.verification_key, &tampered)
            .unwrap());

        // Malformed bytes are a verification failure, not an error.
        assert!(!backend
            .verify(b"not-a-proof", &artifacts.verification_key, &publics)
            .unwrap());
    }

    #[test]
    fn groth16_rejects_mismatched_path_depth() {
        let backend = Groth16Backend::setup(2).unwrap();
        let mut group = Group::new("test", 4);
        let identity = member_identity(7);
        group.add_member(identity.commitment()).unwrap();
        let merkle_proof = group.merkle_proof(identity.commitment()).unwrap();
        let err = backend
            .generate(&identity, &merkle_proof, Fr::from(1u64))
            .unwrap_err();
        assert!(matches!(err, BlockchainError::ProofSystem { .. }));
    }
}
