// src/lib.rs
//! # zkdid
//!
//! Decentralized identifiers bound to blockchain accounts, plus
//! zero-knowledge proofs of credential-derived facts.
//!
//! ## Architecture Overview
//! 1. **DID Key Method**: stateless `did:key` derivation and resolution from
//!    chain account keys ([`did::key_method`]).
//! 2. **On-Chain DID Method**: pallet-backed DID lifecycle driven through a
//!    transaction orchestrator ([`blockchain`]).
//! 3. **ZK-Proof Service**: identity commitments, membership groups and
//!    Groth16 proofs of credential facts without revealing them ([`zkp`]).
//! 4. **Error Taxonomy**: category/severity classification with a shared
//!    retry policy ([`error`]).
//!
//! The chain client, wallet signer and proving backend are injected
//! capabilities: production implementations and the bundled mocks satisfy
//! the same traits, so the composition is chosen at construction time.

pub mod blockchain;
pub mod config;
pub mod did;
pub mod error;
pub mod models;
pub mod utils;
pub mod zkp;

pub use blockchain::client::{ChainClient, ChainInfo, PalletCall, StatusUpdate, WalletSigner};
pub use blockchain::did_pallet::{
    DidDocumentUpdate, OnchainDidOrchestrator, RegisterDidRequest, RegisterDidResult,
};
pub use blockchain::transaction::{TransactionHandle, TransactionOrchestrator};
pub use config::ChainConfig;
pub use error::{BlockchainError, ErrorCategory, ErrorSeverity, Result};
pub use models::credential::VerifiableCredential;
pub use models::did::{DidDocument, DidStatus, Service, VerificationMethod};
pub use models::transaction::{ChainEvent, Fee, TransactionRecord, TransactionStatus};
pub use zkp::backend::{Groth16Backend, MockProvingBackend, ProvingBackend};
pub use zkp::circuits::{Circuit, CircuitType, ProofInputs};
pub use zkp::group::{GroupStats, DEFAULT_GROUP_DEPTH};
pub use zkp::proof::{ZkProof, ZkProofService};
