// src/blockchain/did_pallet.rs
//! On-chain DID orchestration against the DID pallet.
//!
//! Every mutating operation is one pallet call submitted through the
//! transaction orchestrator; reads are storage queries and never submit
//! anything. No local state survives beyond the in-flight transaction
//! record: on-chain storage is the single source of truth for this method.

use crate::blockchain::client::{ChainClient, PalletCall, WalletSigner};
use crate::blockchain::transaction::{TransactionHandle, TransactionOrchestrator};
use crate::config::ChainConfig;
use crate::error::{BlockchainError, Result};
use crate::models::did::{
    ChainMetadata, DidDocument, DidStatus, Service, VerificationMethod, DID_CONTEXT,
    SR25519_CONTEXT,
};
use crate::models::transaction::{Fee, TransactionRecord};
use crate::utils::codec::{decode_ss58, encode_multibase_key, KeyAlgorithm};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Reason codes the pallet reports through dispatch failures.
pub(crate) const REASON_ALREADY_EXISTS: &str = "DID_ALREADY_EXISTS";
pub(crate) const REASON_NOT_FOUND: &str = "DID_NOT_FOUND";
pub(crate) const REASON_INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
pub(crate) const REASON_INVALID_NONCE: &str = "INVALID_NONCE";

/// Request payload for [`OnchainDidOrchestrator::register_did_onchain`].
#[derive(Debug, Clone, Default)]
pub struct RegisterDidRequest {
    /// Explicit DID; derived from the signer address when absent.
    pub did: Option<String>,
    /// Initial verification methods; a default one is derived from the
    /// signer's account key when empty.
    pub verification_methods: Vec<VerificationMethod>,
    pub services: Vec<Service>,
    /// Controller DID; defaults to the registered DID itself.
    pub controller: Option<String>,
    pub metadata: Option<Value>,
}

/// Outcome of a successful on-chain registration.
#[derive(Debug, Clone)]
pub struct RegisterDidResult {
    pub did: String,
    pub did_document: DidDocument,
    pub transaction: TransactionRecord,
    pub status: DidStatus,
}

/// Partial update applied by [`OnchainDidOrchestrator::update_did_document`].
#[derive(Debug, Clone, Default)]
pub struct DidDocumentUpdate {
    pub controller: Option<String>,
    pub add_verification_methods: Vec<VerificationMethod>,
    pub add_services: Vec<Service>,
    pub status: Option<DidStatus>,
}

/// Wire arguments of the pallet's `register_did` call.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterArgs {
    pub did: String,
    pub controller: String,
    pub verification_methods: Vec<VerificationMethod>,
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddVerificationMethodArgs {
    pub did: String,
    pub method: VerificationMethod,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddServiceArgs {
    pub did: String,
    pub service: Service,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateArgs {
    pub did: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_verification_methods: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_services: Vec<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DidStatus>,
}

/// Storage value kept by the pallet for one DID, JSON-encoded.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OnchainDidRecord {
    pub did: String,
    pub controller: String,
    pub verification_methods: Vec<VerificationMethod>,
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: DidStatus,
}

/// Storage key of a DID entry under the given pallet.
pub(crate) fn did_storage_key(pallet: &str, did: &str) -> String {
    format!("{pallet}:dids:{did}")
}

/// DID lifecycle operations for the pallet-backed method.
pub struct OnchainDidOrchestrator {
    client: Arc<dyn ChainClient>,
    transactions: TransactionOrchestrator,
    config: ChainConfig,
}

impl OnchainDidOrchestrator {
    pub fn new(client: Arc<dyn ChainClient>, config: ChainConfig) -> Self {
        let transactions = TransactionOrchestrator::new(client.clone(), config.clone());
        Self {
            client,
            transactions,
            config,
        }
    }

    /// The on-chain DID for a chain account address.
    pub fn did_for_address(&self, address: &str) -> String {
        format!("did:{}:{address}", self.config.did_method)
    }

    /// Registers a DID on-chain with all verification methods and services in
    /// a single pallet call, so either the whole DID is created or none of it.
    ///
    /// The prior existence check is advisory only: two concurrent
    /// registrations can both pass it, and the pallet's own uniqueness
    /// constraint stays the source of truth (the loser surfaces as
    /// `DID_ALREADY_EXISTS` from the dispatch failure).
    ///
    /// # Errors
    /// - `AddressValidation` for a malformed signer address.
    /// - `DidAlreadyExists` when the DID is already registered.
    /// - `transaction`-category errors for balance/nonce problems.
    pub async fn register_did_onchain(
        &self,
        request: RegisterDidRequest,
        signer: &dyn WalletSigner,
    ) -> Result<RegisterDidResult> {
        let address = signer.address();
        if !self.client.validate_address(address) {
            return Err(BlockchainError::AddressValidation {
                address: address.to_string(),
                reason: "not a valid account address for this chain".to_string(),
            });
        }

        let did = request
            .did
            .clone()
            .unwrap_or_else(|| self.did_for_address(address));

        if self.did_exists(&did).await? {
            return Err(BlockchainError::DidAlreadyExists { did });
        }

        let controller = request.controller.clone().unwrap_or_else(|| did.clone());
        let verification_methods = if request.verification_methods.is_empty() {
            vec![self.default_verification_method(&did, address)?]
        } else {
            request.verification_methods.clone()
        };

        let args = RegisterArgs {
            did: did.clone(),
            controller,
            verification_methods,
            services: request.services.clone(),
            metadata: request.metadata.clone(),
        };
        let call = PalletCall::new(
            self.config.did_pallet.clone(),
            "register_did",
            serde_json::to_value(&args).map_err(|e| BlockchainError::EncodingFailed {
                reason: e.to_string(),
            })?,
        );

        info!("registering {did} on {}", self.config.network);
        let transaction = self
            .transactions
            .submit_and_wait(&call, signer)
            .await
            .map_err(|err| map_pallet_failure(&did, err))?;

        let record = OnchainDidRecord {
            did: did.clone(),
            controller: args.controller,
            verification_methods: args.verification_methods,
            services: args.services,
            metadata: args.metadata,
            created_tx_hash: Some(transaction.extrinsic_hash.clone()),
            created_block: transaction.block_number,
            updated_at: None,
            status: DidStatus::Active,
        };
        let did_document = self.document_from_record(record);

        Ok(RegisterDidResult {
            did,
            did_document,
            transaction,
            status: DidStatus::Active,
        })
    }

    /// Whether a DID entry exists in pallet storage. Read-only.
    pub async fn did_exists(&self, did: &str) -> Result<bool> {
        let key = did_storage_key(&self.config.did_pallet, did);
        Ok(self.client.query(&key).await?.is_some())
    }

    /// Reads and reconstructs the DID Document, or `None` when absent.
    pub async fn query_did_document(&self, did: &str) -> Result<Option<DidDocument>> {
        let key = did_storage_key(&self.config.did_pallet, did);
        let Some(bytes) = self.client.query(&key).await? else {
            debug!("{did}: no on-chain entry");
            return Ok(None);
        };
        let record: OnchainDidRecord =
            serde_json::from_slice(&bytes).map_err(|e| BlockchainError::EncodingFailed {
                reason: format!("undecodable DID storage entry: {e}"),
            })?;
        Ok(Some(self.document_from_record(record)))
    }

    /// Like [`Self::query_did_document`] but raises `DidNotFound` instead of
    /// returning `None`, mirroring the key method's `resolve` contract.
    pub async fn resolve(&self, did: &str) -> Result<DidDocument> {
        self.query_did_document(did)
            .await?
            .ok_or_else(|| BlockchainError::DidNotFound {
                did: did.to_string(),
            })
    }

    /// Adds one verification method via a single pallet call.
    pub async fn add_verification_method(
        &self,
        did: &str,
        method: VerificationMethod,
        signer: &dyn WalletSigner,
    ) -> Result<TransactionRecord> {
        self.ensure_exists(did).await?;
        let args = AddVerificationMethodArgs {
            did: did.to_string(),
            method,
        };
        self.submit_pallet_call("add_verification_method", &args, did, signer)
            .await
    }

    /// Adds one service endpoint via a single pallet call.
    pub async fn add_service(
        &self,
        did: &str,
        service: Service,
        signer: &dyn WalletSigner,
    ) -> Result<TransactionRecord> {
        self.ensure_exists(did).await?;
        let args = AddServiceArgs {
            did: did.to_string(),
            service,
        };
        self.submit_pallet_call("add_service", &args, did, signer).await
    }

    /// Applies a partial document update via a single pallet call.
    pub async fn update_did_document(
        &self,
        did: &str,
        update: DidDocumentUpdate,
        signer: &dyn WalletSigner,
    ) -> Result<TransactionRecord> {
        self.ensure_exists(did).await?;
        let args = UpdateArgs {
            did: did.to_string(),
            controller: update.controller,
            add_verification_methods: update.add_verification_methods,
            add_services: update.add_services,
            status: update.status,
        };
        self.submit_pallet_call("update_did", &args, did, signer).await
    }

    /// Advisory inclusion fee for an arbitrary pallet call.
    pub async fn calculate_transaction_fee(
        &self,
        call: &PalletCall,
        signer_address: &str,
    ) -> Result<Fee> {
        self.transactions.estimate_fee(call, signer_address).await
    }

    /// Passthrough confirmation waiting, for callers that split submit and
    /// confirm (e.g. a UI showing live status).
    pub async fn wait_for_confirmation(
        &self,
        handle: TransactionHandle,
    ) -> Result<TransactionRecord> {
        self.transactions.wait_for_confirmation(handle).await
    }

    async fn ensure_exists(&self, did: &str) -> Result<()> {
        if !self.did_exists(did).await? {
            return Err(BlockchainError::DidNotFound {
                did: did.to_string(),
            });
        }
        Ok(())
    }

    async fn submit_pallet_call<A: Serialize>(
        &self,
        call_name: &str,
        args: &A,
        did: &str,
        signer: &dyn WalletSigner,
    ) -> Result<TransactionRecord> {
        let call = PalletCall::new(
            self.config.did_pallet.clone(),
            call_name,
            serde_json::to_value(args).map_err(|e| BlockchainError::EncodingFailed {
                reason: e.to_string(),
            })?,
        );
        self.transactions
            .submit_and_wait(&call, signer)
            .await
            .map_err(|err| map_pallet_failure(did, err))
    }

    fn default_verification_method(
        &self,
        did: &str,
        address: &str,
    ) -> Result<VerificationMethod> {
        let (public_key, _) = decode_ss58(address)?;
        let multibase = encode_multibase_key(KeyAlgorithm::Sr25519, &public_key)?;
        Ok(VerificationMethod {
            id: format!("{did}#key-1"),
            method_type: KeyAlgorithm::Sr25519.verification_method_type().to_string(),
            controller: did.to_string(),
            public_key_multibase: multibase,
        })
    }

    fn document_from_record(&self, record: OnchainDidRecord) -> DidDocument {
        let vm_ids: Vec<String> = record
            .verification_methods
            .iter()
            .map(|vm| vm.id.clone())
            .collect();
        DidDocument {
            context: vec![DID_CONTEXT.to_string(), SR25519_CONTEXT.to_string()],
            id: record.did,
            controller: Some(record.controller),
            verification_method: record.verification_methods,
            authentication: vm_ids.clone(),
            assertion_method: vm_ids.clone(),
            capability_invocation: vm_ids.clone(),
            capability_delegation: vm_ids,
            key_agreement: vec![],
            service: record.services,
            chain_metadata: Some(ChainMetadata {
                network: self.config.network.clone(),
                created_tx_hash: record.created_tx_hash,
                created_block: record.created_block,
                updated_at: record.updated_at,
                status: record.status,
            }),
        }
    }
}

/// Maps a dispatch failure onto the specific pallet error it encodes, leaving
/// anything unrecognized as the original transaction error.
fn map_pallet_failure(did: &str, err: BlockchainError) -> BlockchainError {
    let BlockchainError::TransactionFailed { hash, reason } = err else {
        return err;
    };
    match reason.as_str() {
        REASON_ALREADY_EXISTS => BlockchainError::DidAlreadyExists {
            did: did.to_string(),
        },
        REASON_NOT_FOUND => BlockchainError::DidNotFound {
            did: did.to_string(),
        },
        REASON_INSUFFICIENT_BALANCE => BlockchainError::InsufficientBalance {
            address: did.to_string(),
        },
        REASON_INVALID_NONCE => BlockchainError::InvalidNonce {
            address: did.to_string(),
        },
        _ => BlockchainError::TransactionFailed { hash, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::{MockChainClient, MockWalletSigner};
    use serde_json::json;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    fn orchestrator(client: Arc<MockChainClient>) -> OnchainDidOrchestrator {
        OnchainDidOrchestrator::new(client, ChainConfig::default())
    }

    #[tokio::test]
    async fn register_then_query_round_trip() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let result = orchestrator
            .register_did_onchain(RegisterDidRequest::default(), &signer)
            .await
            .unwrap();

        assert_eq!(result.did, format!("did:substrate:{ALICE}"));
        assert_eq!(result.status, DidStatus::Active);
        assert!(result.transaction.status.is_success());
        assert!(result.did_document.has_valid_references());

        let queried = orchestrator
            .query_did_document(&result.did)
            .await
            .unwrap()
            .expect("registered DID should resolve");
        assert_eq!(queried.id, result.did);
        let metadata = queried.chain_metadata.expect("on-chain metadata");
        assert_eq!(metadata.status, DidStatus::Active);
        assert_eq!(
            metadata.created_tx_hash.as_deref(),
            Some(result.transaction.extrinsic_hash.as_str())
        );
        assert!(orchestrator.did_exists(&result.did).await.unwrap());
    }

    #[tokio::test]
    async fn register_twice_fails_with_already_exists() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        orchestrator
            .register_did_onchain(RegisterDidRequest::default(), &signer)
            .await
            .unwrap();
        let err = orchestrator
            .register_did_onchain(RegisterDidRequest::default(), &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::DidAlreadyExists { .. }));
        assert_eq!(err.code(), "DID_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn query_absent_did_returns_none_and_resolve_errors() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client);

        let did = "did:substrate:5Missing";
        assert!(orchestrator.query_did_document(did).await.unwrap().is_none());
        let err = orchestrator.resolve(did).await.unwrap_err();
        assert!(matches!(err, BlockchainError::DidNotFound { .. }));
        assert_eq!(err.user_message(), "DID not found");
    }

    #[tokio::test]
    async fn mutations_on_absent_did_fail_with_not_found() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let did = "did:substrate:5Missing";
        let method = VerificationMethod {
            id: format!("{did}#key-2"),
            method_type: "Sr25519VerificationKey2020".into(),
            controller: did.to_string(),
            public_key_multibase: "zExtra".into(),
        };
        let err = orchestrator
            .add_verification_method(did, method, &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::DidNotFound { .. }));
    }

    #[tokio::test]
    async fn add_service_and_update_extend_the_document() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let did = orchestrator
            .register_did_onchain(RegisterDidRequest::default(), &signer)
            .await
            .unwrap()
            .did;

        let service = Service {
            id: format!("{did}#resolver"),
            service_type: "DIDResolver".into(),
            service_endpoint: "https://resolver.example".into(),
        };
        orchestrator
            .add_service(&did, service, &signer)
            .await
            .unwrap();

        let method = VerificationMethod {
            id: format!("{did}#key-2"),
            method_type: "Sr25519VerificationKey2020".into(),
            controller: did.clone(),
            public_key_multibase: "zSecond".into(),
        };
        orchestrator
            .add_verification_method(&did, method, &signer)
            .await
            .unwrap();

        orchestrator
            .update_did_document(
                &did,
                DidDocumentUpdate {
                    status: Some(DidStatus::Updating),
                    ..Default::default()
                },
                &signer,
            )
            .await
            .unwrap();

        let doc = orchestrator.resolve(&did).await.unwrap();
        assert_eq!(doc.verification_method.len(), 2);
        assert_eq!(doc.service.len(), 1);
        assert!(doc.has_valid_references());
        assert_eq!(
            doc.chain_metadata.unwrap().status,
            DidStatus::Updating
        );
    }

    #[tokio::test]
    async fn fee_estimation_never_mutates_state() {
        let client = Arc::new(MockChainClient::new());
        client.set_fee(42);
        let orchestrator = orchestrator(client.clone());

        let call = PalletCall::new("didRegistry", "register_did", json!({}));
        let fee = orchestrator
            .calculate_transaction_fee(&call, ALICE)
            .await
            .unwrap();
        assert_eq!(fee.amount, 42);
        assert!(client.submitted_calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_signer_address_is_rejected_before_submission() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client.clone());
        let signer = MockWalletSigner::new("not-an-address");

        let err = orchestrator
            .register_did_onchain(RegisterDidRequest::default(), &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::AddressValidation { .. }));
        assert!(client.submitted_calls().is_empty());
    }
}
