// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! W3C-shaped DID Documents per the [DID Core Specification](https://www.w3.org/TR/did-core/),
//! plus the pallet extension metadata carried by the on-chain method.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON-LD context for DID documents.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
/// JSON-LD context for the sr25519 verification suite.
pub const SR25519_CONTEXT: &str = "https://w3id.org/security/suites/sr25519-2020/v1";

/// A DID Document.
///
/// Reference lists (`authentication`, `assertion_method`, ...) hold ids of
/// entries in `verification_method`; [`DidDocument::has_valid_references`]
/// checks that invariant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The DID this document describes.
    pub id: String,

    /// Controller DID, when distinct from `id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    pub verification_method: Vec<VerificationMethod>,

    pub authentication: Vec<String>,
    pub assertion_method: Vec<String>,
    pub capability_invocation: Vec<String>,
    pub capability_delegation: Vec<String>,
    /// Empty for the key method: account keys sign, they do not agree on
    /// encryption keys.
    pub key_agreement: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,

    /// Present only for documents backed by the DID pallet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_metadata: Option<ChainMetadata>,
}

impl DidDocument {
    /// Ids of all verification methods in this document.
    pub fn verification_method_ids(&self) -> Vec<&str> {
        self.verification_method.iter().map(|vm| vm.id.as_str()).collect()
    }

    /// Checks that every capability reference points at a verification method
    /// present in `verification_method`.
    pub fn has_valid_references(&self) -> bool {
        let ids = self.verification_method_ids();
        self.authentication
            .iter()
            .chain(&self.assertion_method)
            .chain(&self.capability_invocation)
            .chain(&self.capability_delegation)
            .chain(&self.key_agreement)
            .all(|reference| ids.contains(&reference.as_str()))
    }
}

/// A single verification method (public key) in a DID Document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// `<DID>#<short-fingerprint>`.
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_multibase: String,
}

/// A service endpoint advertised by a DID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
}

/// Lifecycle of a pallet-backed DID.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DidStatus {
    Creating,
    Active,
    Updating,
    Revoked,
    Expired,
    Error,
}

/// Pallet extension metadata attached to on-chain DID documents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    /// Network the DID lives on.
    pub network: String,
    /// Hash of the extrinsic that created the DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_tx_hash: Option<String>,
    /// Block in which the DID was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub status: DidStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> DidDocument {
        let did = "did:key:zExample".to_string();
        let vm_id = format!("{did}#key-1");
        DidDocument {
            context: vec![DID_CONTEXT.to_string()],
            id: did.clone(),
            controller: None,
            verification_method: vec![VerificationMethod {
                id: vm_id.clone(),
                method_type: "Sr25519VerificationKey2020".to_string(),
                controller: did,
                public_key_multibase: "zExample".to_string(),
            }],
            authentication: vec![vm_id.clone()],
            assertion_method: vec![vm_id.clone()],
            capability_invocation: vec![vm_id.clone()],
            capability_delegation: vec![vm_id],
            key_agreement: vec![],
            service: vec![],
            chain_metadata: None,
        }
    }

    #[test]
    fn reference_integrity_holds_for_well_formed_document() {
        assert!(sample_document().has_valid_references());
    }

    #[test]
    fn reference_integrity_fails_on_dangling_reference() {
        let mut doc = sample_document();
        doc.authentication.push("did:key:zExample#missing".to_string());
        assert!(!doc.has_valid_references());
    }

    #[test]
    fn serializes_with_w3c_field_names() {
        let doc = sample_document();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("@context").is_some());
        assert!(json.get("verificationMethod").is_some());
        assert!(json.get("assertionMethod").is_some());
        assert_eq!(json["verificationMethod"][0]["type"], "Sr25519VerificationKey2020");
    }
}
