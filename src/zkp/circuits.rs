// src/zkp/circuits.rs
//! The circuit catalog and per-circuit credential/signal rules.
//!
//! Circuits are a fixed, enumerable catalog. Each circuit decides which
//! credentials are acceptable and how its public signal is built. Signals
//! only ever carry hashed claims: an age signal commits to the threshold and
//! a met/not-met bit, never the actual age.

use crate::error::{BlockchainError, Result};
use crate::models::credential::VerifiableCredential;
use crate::zkp::poseidon::{field_from_str_data, hash_two};
use ark_bn254::Fr;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Circuit id for age-threshold proofs.
pub const AGE_VERIFICATION_CIRCUIT_ID: &str = "age-verification-circuit";
/// Circuit id for group-membership proofs.
pub const MEMBERSHIP_PROOF_CIRCUIT_ID: &str = "membership-proof-circuit";

/// Default minimum age when the caller does not specify one.
pub const DEFAULT_MIN_AGE: u32 = 18;

/// What a circuit proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitType {
    AgeVerification,
    MembershipProof,
}

/// A catalog entry describing one proving circuit.
///
/// The verification key is not part of the static catalog: it is
/// setup-specific and travels with each generated proof.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub circuit_type: CircuitType,
    /// Approximate R1CS constraint count, for caller-side cost display.
    pub constraints: u32,
    pub public_inputs: &'static [&'static str],
    pub private_inputs: &'static [&'static str],
}

/// Caller-supplied public inputs for proof generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInputs {
    /// Minimum age for age-verification proofs; defaults to 18.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_age: Option<u32>,
    /// Group identifier for membership proofs; defaults to the subject's
    /// membership claim, then to the circuit id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

static CATALOG: &[Circuit] = &[
    Circuit {
        id: AGE_VERIFICATION_CIRCUIT_ID,
        name: "Age verification",
        description: "Proves the subject meets an age threshold without revealing the age",
        circuit_type: CircuitType::AgeVerification,
        constraints: 6_000,
        public_inputs: &["merkleTreeRoot", "nullifierHash", "signal"],
        private_inputs: &["identitySecret", "merklePath"],
    },
    Circuit {
        id: MEMBERSHIP_PROOF_CIRCUIT_ID,
        name: "Membership proof",
        description: "Proves group membership without revealing which member",
        circuit_type: CircuitType::MembershipProof,
        constraints: 6_000,
        public_inputs: &["merkleTreeRoot", "nullifierHash", "signal"],
        private_inputs: &["identitySecret", "merklePath"],
    },
];

/// The full circuit catalog.
pub fn available_circuits() -> &'static [Circuit] {
    CATALOG
}

/// Looks up a circuit by id.
pub fn find_circuit(circuit_id: &str) -> Option<&'static Circuit> {
    CATALOG.iter().find(|circuit| circuit.id == circuit_id)
}

/// Subject claim names that satisfy the age circuit.
const AGE_FIELDS: &[&str] = &["age", "birthDate", "dateOfBirth"];
/// Subject claim names that satisfy the membership circuit.
const MEMBERSHIP_FIELDS: &[&str] = &["membership", "organization", "role", "studentId"];

/// Structural check: can this credential feed this circuit?
///
/// Unknown circuit ids fail validation (`false`), they are not an error.
pub fn validate_credential_for_circuit(
    credential: &VerifiableCredential,
    circuit_id: &str,
) -> bool {
    match find_circuit(circuit_id).map(|circuit| circuit.circuit_type) {
        Some(CircuitType::AgeVerification) => {
            credential.has_any_subject_field(AGE_FIELDS) || credential.has_type_tag("age")
        }
        Some(CircuitType::MembershipProof) => {
            credential.has_any_subject_field(MEMBERSHIP_FIELDS)
                || credential.has_type_tag("membership")
                || credential.has_type_tag("employee")
                || credential.has_type_tag("student")
        }
        None => false,
    }
}

/// Reads the subject's age, either directly or from a birth date.
pub(crate) fn age_from_credential(credential: &VerifiableCredential) -> Option<u32> {
    if let Some(age) = credential
        .subject_field("age")
        .and_then(serde_json::Value::as_u64)
    {
        return u32::try_from(age).ok();
    }
    let birth = AGE_FIELDS[1..]
        .iter()
        .find_map(|field| credential.subject_field(field))
        .and_then(serde_json::Value::as_str)?;
    let birth = NaiveDate::parse_from_str(birth, "%Y-%m-%d").ok()?;
    let today = Utc::now().date_naive();
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

/// The subject's membership identifier for membership proofs.
fn membership_claim(credential: &VerifiableCredential) -> Option<String> {
    MEMBERSHIP_FIELDS
        .iter()
        .find_map(|field| credential.subject_field(field))
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}

/// Builds the public signal for a circuit.
///
/// - Age: `poseidon(threshold, meets-threshold)`; the age itself never
///   enters the signal.
/// - Membership: `poseidon(group-identifier, is-member)`.
pub(crate) fn build_signal(
    circuit: &Circuit,
    inputs: &ProofInputs,
    credential: &VerifiableCredential,
) -> Result<Fr> {
    match circuit.circuit_type {
        CircuitType::AgeVerification => {
            let threshold = inputs.min_age.unwrap_or(DEFAULT_MIN_AGE);
            let age = age_from_credential(credential).ok_or_else(|| {
                BlockchainError::CredentialRequirements {
                    circuit_id: circuit.id.to_string(),
                }
            })?;
            let meets = age >= threshold;
            Ok(hash_two(Fr::from(threshold), Fr::from(meets as u64)))
        }
        CircuitType::MembershipProof => {
            let group_id = inputs
                .group_id
                .clone()
                .or_else(|| membership_claim(credential))
                .unwrap_or_else(|| circuit.id.to_string());
            Ok(hash_two(field_from_str_data(&group_id), Fr::from(1u64)))
        }
    }
}
