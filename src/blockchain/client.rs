// src/blockchain/client.rs
//! Chain client adapter contract.
//!
//! The embedding application supplies the actual client (a light client, an
//! RPC connection, a test double); this crate only consumes the trait. All
//! orchestrators take the client as an injected `Arc<dyn ChainClient>` so the
//! real and mock implementations are interchangeable at construction time.

use crate::error::Result;
use crate::models::transaction::{ChainEvent, Fee, TransactionStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Static information about the connected chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub name: String,
    pub ss58_prefix: u16,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub genesis_hash: String,
    pub block_time_ms: u64,
}

/// A pallet call ready for signing and submission.
///
/// Arguments are carried as JSON; the adapter owns the conversion to the
/// chain's wire encoding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PalletCall {
    pub pallet: String,
    pub call: String,
    pub args: Value,
    /// Weight ceiling for execution; filled in by the orchestrator from a
    /// buffered estimate when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_limit: Option<u128>,
}

impl PalletCall {
    pub fn new(pallet: impl Into<String>, call: impl Into<String>, args: Value) -> Self {
        Self {
            pallet: pallet.into(),
            call: call.into(),
            args,
            weight_limit: None,
        }
    }
}

/// One status notification from the adapter's subscription, with any chain
/// events observed at that transition.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub events: Vec<ChainEvent>,
}

impl StatusUpdate {
    pub fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            events: Vec::new(),
        }
    }
}

/// Connected chain client, supplied by the embedding application.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Connects (or re-connects) and reports chain metadata.
    async fn connect(&self) -> Result<ChainInfo>;

    /// Tears down the connection.
    async fn disconnect(&self) -> Result<()>;

    /// Reads raw bytes from chain storage; `None` when the key is absent.
    async fn query(&self, storage_key: &str) -> Result<Option<Vec<u8>>>;

    /// Estimates the inclusion fee of an unsigned call. Advisory only.
    async fn estimate_fee(&self, call: &PalletCall, signer_address: &str) -> Result<Fee>;

    /// Signs and broadcasts; returns the extrinsic hash immediately.
    async fn submit(&self, call: &PalletCall, signer: &dyn WalletSigner) -> Result<String>;

    /// Subscribes to status notifications for a broadcast extrinsic. The
    /// channel closes after a terminal status or on connection loss.
    async fn subscribe_status(&self, extrinsic_hash: &str)
        -> Result<mpsc::Receiver<StatusUpdate>>;

    /// Current account nonce.
    async fn get_nonce(&self, address: &str) -> Result<u64>;

    /// Cheap syntactic address check in the chain's native format.
    fn validate_address(&self, address: &str) -> bool;
}

/// Wallet abstraction used for message signing (identity derivation) and
/// transaction signing.
pub trait WalletSigner: Send + Sync {
    /// Chain-native address of the signing account.
    fn address(&self) -> &str;

    /// Signs an arbitrary message; deterministic per (key, message).
    fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>>;
}
