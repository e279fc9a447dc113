// src/error.rs
//! Error taxonomy and retry policy shared by every subsystem.
//!
//! Errors are classified along two axes: a category (what kind of collaborator
//! failed) and a severity (how bad it is for the caller). The category decides
//! retryability: only `network` failures are worth retrying, everything else
//! needs a changed input, a funded account, or an operator fix.
//!
//! Each error renders three ways:
//! - a terse user-facing message (per category, never leaking internals),
//! - a developer message (`"<Name> [<code>]: <message>"`),
//! - a log line (`"<Name> [<code>] [<severity>] [<category>]: <message>"`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Failure classification by collaborator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Connectivity to the chain or a subscription was lost. Retryable.
    Network,
    /// The pallet rejected the call (missing DID, duplicate entry, ...).
    Contract,
    /// Nonce, balance or fee problems around a specific extrinsic.
    Transaction,
    /// Malformed caller input; fix and resend.
    Validation,
    /// Account or key issues attributable to the end user.
    User,
    /// Missing artifacts, keys or addresses; fatal until an operator fixes it.
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Contract => "contract",
            Self::Transaction => "transaction",
            Self::Validation => "validation",
            Self::User => "user",
            Self::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// How bad the failure is for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Crate-wide error type.
///
/// One explicit variant per failure kind; the category is a total function of
/// the variant so the compiler keeps the taxonomy exhaustive when a new kind
/// is added.
#[derive(Debug, Error)]
pub enum BlockchainError {
    // ---- network ----
    /// Connection to the chain endpoint was lost or refused.
    #[error("connection to {network} failed: {reason}")]
    ConnectionFailed { network: String, reason: String },

    /// An RPC request did not answer in time.
    #[error("RPC request timed out after {timeout_ms}ms")]
    RpcTimeout { timeout_ms: u64 },

    /// The status subscription ended before a terminal state was observed.
    #[error("transaction status subscription dropped for {hash}")]
    SubscriptionDropped { hash: String },

    // ---- contract ----
    /// The target DID does not exist on-chain.
    #[error("DID not found: {did}")]
    DidNotFound { did: String },

    /// A DID with this identifier is already registered.
    #[error("DID already exists: {did}")]
    DidAlreadyExists { did: String },

    /// The pallet rejected the call for a reason of its own.
    #[error("pallet rejected {pallet}::{call}: {reason}")]
    PalletRejected {
        pallet: String,
        call: String,
        reason: String,
    },

    // ---- transaction ----
    /// Stale or duplicate nonce; a concurrent submission won the slot.
    #[error("invalid nonce for {address}")]
    InvalidNonce { address: String },

    /// The signer cannot cover the inclusion fee.
    #[error("insufficient balance for {address}")]
    InsufficientBalance { address: String },

    /// Fee estimation query failed.
    #[error("fee estimation failed: {reason}")]
    FeeEstimationFailed { reason: String },

    /// The extrinsic reached a block but the dispatch failed.
    #[error("transaction {hash} failed: {reason}")]
    TransactionFailed { hash: String, reason: String },

    /// The extrinsic was dropped from the pool.
    #[error("transaction {hash} was dropped from the pool")]
    TransactionDropped { hash: String },

    /// The extrinsic was found invalid by the pool.
    #[error("transaction {hash} is invalid: {reason}")]
    TransactionInvalid { hash: String, reason: String },

    /// No terminal status within the caller's deadline. The extrinsic stays
    /// outstanding on-chain; nothing is cancelled.
    #[error("no confirmation for {hash} within {timeout_ms}ms")]
    ConfirmationTimeout { hash: String, timeout_ms: u64 },

    // ---- validation ----
    /// The address does not parse under the chain's SS58 format.
    #[error("invalid address {address}: {reason}")]
    AddressValidation { address: String, reason: String },

    /// The string is not a well-formed DID for the expected method.
    #[error("Invalid DID format: {did}")]
    InvalidDidFormat { did: String },

    /// The multibase payload of a `did:key` does not decode to a known key.
    #[error("Invalid public key in DID: {reason}")]
    InvalidPublicKey { reason: String },

    /// A supplied credential lacks the fields the circuit needs.
    #[error("Credential does not meet circuit requirements: {circuit_id}")]
    CredentialRequirements { circuit_id: String },

    /// Proof generation was requested without any credential.
    #[error("At least one credential is required")]
    EmptyCredentials,

    // ---- user ----
    /// The account is unknown to the connected wallet.
    #[error("account {address} is not available in the wallet")]
    UnknownAccount { address: String },

    /// The wallet refused to sign.
    #[error("signature request rejected: {reason}")]
    SignatureRejected { reason: String },

    // ---- configuration ----
    /// Multibase or storage encoding failed; internal, fatal.
    #[error("encoding failed: {reason}")]
    EncodingFailed { reason: String },

    /// The proving backend is unavailable or misconfigured.
    #[error("ZK-proof generation failed: {reason}")]
    ProofSystem { reason: String },

    /// A required configuration value is absent.
    #[error("missing configuration value: {key}")]
    MissingConfig { key: String },
}

impl BlockchainError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::RpcTimeout { .. } => "RPC_TIMEOUT",
            Self::SubscriptionDropped { .. } => "SUBSCRIPTION_DROPPED",
            Self::DidNotFound { .. } => "DID_NOT_FOUND",
            Self::DidAlreadyExists { .. } => "DID_ALREADY_EXISTS",
            Self::PalletRejected { .. } => "PALLET_REJECTED",
            Self::InvalidNonce { .. } => "INVALID_NONCE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::FeeEstimationFailed { .. } => "FEE_ESTIMATION_FAILED",
            Self::TransactionFailed { .. } => "TRANSACTION_FAILED",
            Self::TransactionDropped { .. } => "TRANSACTION_DROPPED",
            Self::TransactionInvalid { .. } => "TRANSACTION_INVALID",
            Self::ConfirmationTimeout { .. } => "CONFIRMATION_TIMEOUT",
            Self::AddressValidation { .. } => "INVALID_ADDRESS",
            Self::InvalidDidFormat { .. } => "INVALID_DID_FORMAT",
            Self::InvalidPublicKey { .. } => "INVALID_PUBLIC_KEY",
            Self::CredentialRequirements { .. } => "CREDENTIAL_REQUIREMENTS",
            Self::EmptyCredentials => "EMPTY_CREDENTIALS",
            Self::UnknownAccount { .. } => "UNKNOWN_ACCOUNT",
            Self::SignatureRejected { .. } => "SIGNATURE_REJECTED",
            Self::EncodingFailed { .. } => "ENCODING_FAILED",
            Self::ProofSystem { .. } => "PROOF_SYSTEM",
            Self::MissingConfig { .. } => "MISSING_CONFIG",
        }
    }

    /// Short variant name used in developer and log renderings.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "ConnectionFailed",
            Self::RpcTimeout { .. } => "RpcTimeout",
            Self::SubscriptionDropped { .. } => "SubscriptionDropped",
            Self::DidNotFound { .. } => "DidNotFound",
            Self::DidAlreadyExists { .. } => "DidAlreadyExists",
            Self::PalletRejected { .. } => "PalletRejected",
            Self::InvalidNonce { .. } => "InvalidNonce",
            Self::InsufficientBalance { .. } => "InsufficientBalance",
            Self::FeeEstimationFailed { .. } => "FeeEstimationFailed",
            Self::TransactionFailed { .. } => "TransactionFailed",
            Self::TransactionDropped { .. } => "TransactionDropped",
            Self::TransactionInvalid { .. } => "TransactionInvalid",
            Self::ConfirmationTimeout { .. } => "ConfirmationTimeout",
            Self::AddressValidation { .. } => "AddressValidation",
            Self::InvalidDidFormat { .. } => "InvalidDidFormat",
            Self::InvalidPublicKey { .. } => "InvalidPublicKey",
            Self::CredentialRequirements { .. } => "CredentialRequirements",
            Self::EmptyCredentials => "EmptyCredentials",
            Self::UnknownAccount { .. } => "UnknownAccount",
            Self::SignatureRejected { .. } => "SignatureRejected",
            Self::EncodingFailed { .. } => "EncodingFailed",
            Self::ProofSystem { .. } => "ProofSystem",
            Self::MissingConfig { .. } => "MissingConfig",
        }
    }

    /// Category of this error kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed { .. }
            | Self::RpcTimeout { .. }
            | Self::SubscriptionDropped { .. } => ErrorCategory::Network,
            Self::DidNotFound { .. }
            | Self::DidAlreadyExists { .. }
            | Self::PalletRejected { .. } => ErrorCategory::Contract,
            Self::InvalidNonce { .. }
            | Self::InsufficientBalance { .. }
            | Self::FeeEstimationFailed { .. }
            | Self::TransactionFailed { .. }
            | Self::TransactionDropped { .. }
            | Self::TransactionInvalid { .. }
            | Self::ConfirmationTimeout { .. } => ErrorCategory::Transaction,
            Self::AddressValidation { .. }
            | Self::InvalidDidFormat { .. }
            | Self::InvalidPublicKey { .. }
            | Self::CredentialRequirements { .. }
            | Self::EmptyCredentials => ErrorCategory::Validation,
            Self::UnknownAccount { .. } | Self::SignatureRejected { .. } => ErrorCategory::User,
            Self::EncodingFailed { .. }
            | Self::ProofSystem { .. }
            | Self::MissingConfig { .. } => ErrorCategory::Configuration,
        }
    }

    /// Severity of this error kind.
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Critical,
            ErrorCategory::Contract | ErrorCategory::Transaction => ErrorSeverity::High,
            ErrorCategory::Validation | ErrorCategory::Configuration => ErrorSeverity::Medium,
            ErrorCategory::User => ErrorSeverity::Low,
        }
    }

    /// Whether a caller should retry the same operation unchanged.
    ///
    /// Only network failures qualify; everything else needs a different input
    /// or an external fix first.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Network
    }

    /// Terse end-user message; internals are never surfaced here.
    pub fn user_message(&self) -> String {
        match self {
            Self::DidNotFound { .. } => "DID not found".to_string(),
            Self::InvalidDidFormat { .. } => "Invalid DID format".to_string(),
            Self::CredentialRequirements { .. } | Self::EmptyCredentials => {
                "Credential does not meet circuit requirements".to_string()
            }
            other => match other.category() {
                ErrorCategory::Network => {
                    "Network connection problem, please try again".to_string()
                }
                ErrorCategory::Contract => "The chain rejected the request".to_string(),
                ErrorCategory::Transaction => {
                    "The transaction could not be completed".to_string()
                }
                ErrorCategory::Validation => "The request is not valid".to_string(),
                ErrorCategory::User => "Please check your account and try again".to_string(),
                ErrorCategory::Configuration => {
                    "The service is misconfigured, contact the operator".to_string()
                }
            },
        }
    }

    /// Full developer rendering: `"<Name> [<code>]: <message>"`.
    pub fn developer_message(&self) -> String {
        format!("{} [{}]: {}", self.name(), self.code(), self)
    }

    /// Log rendering: `"<Name> [<code>] [<severity>] [<category>]: <message>"`.
    pub fn log_message(&self) -> String {
        format!(
            "{} [{}] [{}] [{}]: {}",
            self.name(),
            self.code(),
            self.severity(),
            self.category(),
            self
        )
    }

    /// Stateless report value carried in telemetry and structured logs.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            category: self.category(),
            severity: self.severity(),
            message: self.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Serializable snapshot of an error at the moment it was observed.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Exponential backoff schedule: `min(1000ms * 2^(attempt-1), 30s)`.
///
/// `attempt` is 1-based; attempt 1 waits one second before the second try.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5);
    let millis = 1000u64.saturating_mul(1u64 << exp);
    Duration::from_millis(millis.min(30_000))
}

/// Runs `op` until it succeeds, a non-retryable error occurs, or
/// `max_attempts` is exhausted.
///
/// Retries only errors whose category is retryable, sleeping per
/// [`backoff_delay`] between attempts. The crate itself never retries
/// internally; callers opt in through this helper.
pub async fn retry_with_backoff<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(attempt);
                log::warn!(
                    "attempt {attempt}/{max_attempts} failed, retrying in {}ms: {}",
                    delay.as_millis(),
                    err.log_message()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable_and_critical() {
        let err = BlockchainError::RpcTimeout { timeout_ms: 5000 };
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.is_retryable());
    }

    #[test]
    fn contract_errors_are_not_retryable() {
        let err = BlockchainError::DidNotFound {
            did: "did:substrate:5Grwva".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Contract);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(!err.is_retryable());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(6), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(60), Duration::from_millis(30_000));
    }

    #[test]
    fn renderings_carry_code_severity_and_category() {
        let err = BlockchainError::InsufficientBalance {
            address: "5Grwva".into(),
        };
        assert_eq!(
            err.developer_message(),
            "InsufficientBalance [INSUFFICIENT_BALANCE]: insufficient balance for 5Grwva"
        );
        assert_eq!(
            err.log_message(),
            "InsufficientBalance [INSUFFICIENT_BALANCE] [high] [transaction]: \
             insufficient balance for 5Grwva"
        );
    }

    #[test]
    fn user_messages_do_not_leak_internals() {
        let err = BlockchainError::CredentialRequirements {
            circuit_id: "age-verification-circuit".into(),
        };
        assert_eq!(err.user_message(), "Credential does not meet circuit requirements");
        assert!(!err.user_message().contains("age-verification"));
    }

    #[tokio::test]
    async fn retry_stops_on_non_retryable() {
        let mut calls = 0u32;
        let result: Result<()> = retry_with_backoff(5, || {
            calls += 1;
            async { Err(BlockchainError::EmptyCredentials) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
