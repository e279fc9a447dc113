// src/models/credential.rs
//! Verifiable Credential data model.
//!
//! Credentials are consumed, not owned: the structural fields are trusted and
//! read (subject id, age, membership attributes), while issuer-signature
//! verification belongs to the embedding application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Verifiable Credential following the
/// [W3C data model](https://www.w3.org/TR/vc-data-model/).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    /// Unique URI identifier for the credential.
    pub id: String,

    /// Credential type tags, e.g. `["VerifiableCredential", "AgeCredential"]`.
    #[serde(rename = "type")]
    pub types: Vec<String>,

    /// DID of the credential issuer.
    pub issuer: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<DateTime<Utc>>,

    /// Claims about the subject; `id` names the subject DID when present.
    pub credential_subject: Value,

    /// Issuer proof, opaque to this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Value>,

    /// Revocation/status entry, opaque to this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl VerifiableCredential {
    /// Subject DID, when the subject carries an `id` claim.
    pub fn subject_id(&self) -> Option<&str> {
        self.credential_subject.get("id").and_then(Value::as_str)
    }

    /// Reads a single subject claim by name.
    pub fn subject_field(&self, name: &str) -> Option<&Value> {
        self.credential_subject.get(name)
    }

    /// True when the subject carries any of the named claims.
    pub fn has_any_subject_field(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.subject_field(name).is_some())
    }

    /// True when any type tag contains `needle`, case-insensitively.
    pub fn has_type_tag(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.types
            .iter()
            .any(|tag| tag.to_ascii_lowercase().contains(&needle))
    }
}
