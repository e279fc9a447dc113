// src/blockchain/mock.rs
//! In-memory chain client for tests and offline development.
//!
//! Selected at construction time like any other [`ChainClient`], so call
//! sites never branch on a test-mode flag. The mock honors the DID pallet's
//! call semantics against an in-memory storage map, which lets the full
//! register → query → update flow run without a node.

use crate::blockchain::client::{ChainClient, ChainInfo, PalletCall, StatusUpdate, WalletSigner};
use crate::blockchain::did_pallet::{
    did_storage_key, AddServiceArgs, AddVerificationMethodArgs, OnchainDidRecord, RegisterArgs,
    UpdateArgs, REASON_ALREADY_EXISTS, REASON_NOT_FOUND,
};
use crate::error::{BlockchainError, Result};
use crate::models::did::DidStatus;
use crate::models::transaction::{ChainEvent, Fee, TransactionStatus};
use crate::utils::codec::decode_ss58;
use crate::utils::crypto::hash_data;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Deterministic in-memory [`ChainClient`].
pub struct MockChainClient {
    info: ChainInfo,
    storage: Mutex<HashMap<String, Vec<u8>>>,
    fee: Mutex<u128>,
    submit_error: Mutex<Option<BlockchainError>>,
    scripted: Mutex<Option<Vec<StatusUpdate>>>,
    hold_subscriptions: AtomicBool,
    held_senders: Mutex<Vec<mpsc::Sender<StatusUpdate>>>,
    pending: Mutex<HashMap<String, Vec<StatusUpdate>>>,
    submitted: Mutex<Vec<PalletCall>>,
    counter: AtomicU64,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            info: ChainInfo {
                name: "mock-parachain".to_string(),
                ss58_prefix: 42,
                token_symbol: "UNIT".to_string(),
                token_decimals: 12,
                genesis_hash: "0x00".to_string(),
                block_time_ms: 6_000,
            },
            storage: Mutex::new(HashMap::new()),
            fee: Mutex::new(1_000),
            submit_error: Mutex::new(None),
            scripted: Mutex::new(None),
            hold_subscriptions: AtomicBool::new(false),
            held_senders: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Sets the fee returned by `estimate_fee`.
    pub fn set_fee(&self, amount: u128) {
        *self.fee.lock().unwrap() = amount;
    }

    /// Makes the next `submit` fail with `err`.
    pub fn fail_next_submit(&self, err: BlockchainError) {
        *self.submit_error.lock().unwrap() = Some(err);
    }

    /// Overrides the status sequence for the next submission.
    pub fn script_statuses(&self, updates: Vec<StatusUpdate>) {
        *self.scripted.lock().unwrap() = Some(updates);
    }

    /// Like [`Self::script_statuses`], but keeps the subscription open after
    /// the scripted updates drain, so waiters hit their timeout instead of a
    /// closed channel.
    pub fn script_statuses_and_hold(&self, updates: Vec<StatusUpdate>) {
        self.hold_subscriptions.store(true, Ordering::SeqCst);
        self.script_statuses(updates);
    }

    /// Every call submitted so far, in order.
    pub fn submitted_calls(&self) -> Vec<PalletCall> {
        self.submitted.lock().unwrap().clone()
    }

    fn success_updates(&self, block_number: u64, events: Vec<ChainEvent>) -> Vec<StatusUpdate> {
        let block_hash = format!("0xb{block_number:07x}");
        vec![
            StatusUpdate::new(TransactionStatus::InBlock {
                block_hash: block_hash.clone(),
                block_number,
            }),
            StatusUpdate {
                status: TransactionStatus::Finalized {
                    block_hash,
                    block_number,
                },
                events,
            },
        ]
    }

    fn failure_updates(&self, reason: &str) -> Vec<StatusUpdate> {
        vec![StatusUpdate::new(TransactionStatus::Failed {
            reason: reason.to_string(),
        })]
    }

    fn event(&self, call: &PalletCall, method: &str, did: &str) -> ChainEvent {
        ChainEvent {
            pallet: call.pallet.clone(),
            method: method.to_string(),
            data: json!({ "did": did }),
        }
    }

    /// Applies DID pallet semantics to a submitted call against the
    /// in-memory storage map, mirroring the pallet's dispatch outcomes.
    fn apply_did_call(
        &self,
        call: &PalletCall,
        tx_hash: &str,
        block_number: u64,
    ) -> Option<Vec<StatusUpdate>> {
        let mut storage = self.storage.lock().unwrap();
        match call.call.as_str() {
            "register_did" => {
                let args: RegisterArgs = serde_json::from_value(call.args.clone()).ok()?;
                let key = did_storage_key(&call.pallet, &args.did);
                if storage.contains_key(&key) {
                    return Some(self.failure_updates(REASON_ALREADY_EXISTS));
                }
                let record = OnchainDidRecord {
                    did: args.did.clone(),
                    controller: args.controller,
                    verification_methods: args.verification_methods,
                    services: args.services,
                    metadata: args.metadata,
                    created_tx_hash: Some(tx_hash.to_string()),
                    created_block: Some(block_number),
                    updated_at: None,
                    status: DidStatus::Active,
                };
                storage.insert(key, serde_json::to_vec(&record).ok()?);
                Some(self.success_updates(
                    block_number,
                    vec![self.event(call, "DidRegistered", &args.did)],
                ))
            }
            "add_verification_method" => {
                let args: AddVerificationMethodArgs =
                    serde_json::from_value(call.args.clone()).ok()?;
                self.mutate_record(&mut storage, call, &args.did, block_number, |record| {
                    record.verification_methods.push(args.method.clone());
                })
            }
            "add_service" => {
                let args: AddServiceArgs = serde_json::from_value(call.args.clone()).ok()?;
                self.mutate_record(&mut storage, call, &args.did, block_number, |record| {
                    record.services.push(args.service.clone());
                })
            }
            "update_did" => {
                let args: UpdateArgs = serde_json::from_value(call.args.clone()).ok()?;
                self.mutate_record(&mut storage, call, &args.did, block_number, |record| {
                    if let Some(controller) = &args.controller {
                        record.controller = controller.clone();
                    }
                    record
                        .verification_methods
                        .extend(args.add_verification_methods.iter().cloned());
                    record.services.extend(args.add_services.iter().cloned());
                    if let Some(status) = args.status {
                        record.status = status;
                    }
                })
            }
            _ => None,
        }
    }

    fn mutate_record(
        &self,
        storage: &mut HashMap<String, Vec<u8>>,
        call: &PalletCall,
        did: &str,
        block_number: u64,
        mutate: impl FnOnce(&mut OnchainDidRecord),
    ) -> Option<Vec<StatusUpdate>> {
        let key = did_storage_key(&call.pallet, did);
        let Some(bytes) = storage.get(&key) else {
            return Some(self.failure_updates(REASON_NOT_FOUND));
        };
        let mut record: OnchainDidRecord = serde_json::from_slice(bytes).ok()?;
        mutate(&mut record);
        record.updated_at = Some(Utc::now());
        storage.insert(key, serde_json::to_vec(&record).ok()?);
        Some(self.success_updates(
            block_number,
            vec![self.event(call, "DidUpdated", did)],
        ))
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn connect(&self) -> Result<ChainInfo> {
        Ok(self.info.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn query(&self, storage_key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.storage.lock().unwrap().get(storage_key).cloned())
    }

    async fn estimate_fee(&self, _call: &PalletCall, _signer_address: &str) -> Result<Fee> {
        Ok(Fee {
            amount: *self.fee.lock().unwrap(),
            currency: self.info.token_symbol.clone(),
        })
    }

    async fn submit(&self, call: &PalletCall, _signer: &dyn WalletSigner) -> Result<String> {
        if let Some(err) = self.submit_error.lock().unwrap().take() {
            return Err(err);
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut payload = serde_json::to_vec(call).unwrap_or_default();
        payload.extend_from_slice(&n.to_le_bytes());
        let tx_hash = hex_string(&hash_data(&payload));

        self.submitted.lock().unwrap().push(call.clone());

        let updates = self
            .scripted
            .lock()
            .unwrap()
            .take()
            .or_else(|| self.apply_did_call(call, &tx_hash, n))
            .unwrap_or_else(|| self.success_updates(n, Vec::new()));
        self.pending.lock().unwrap().insert(tx_hash.clone(), updates);

        Ok(tx_hash)
    }

    async fn subscribe_status(
        &self,
        extrinsic_hash: &str,
    ) -> Result<mpsc::Receiver<StatusUpdate>> {
        let updates = self
            .pending
            .lock()
            .unwrap()
            .remove(extrinsic_hash)
            .unwrap_or_default();
        let (sender, receiver) = mpsc::channel(updates.len().max(1));
        for update in updates {
            let _ = sender.try_send(update);
        }
        if self.hold_subscriptions.load(Ordering::SeqCst) {
            // Keep the channel open; waiters must rely on their timeout.
            self.held_senders.lock().unwrap().push(sender);
        }
        Ok(receiver)
    }

    async fn get_nonce(&self, _address: &str) -> Result<u64> {
        Ok(self.counter.load(Ordering::SeqCst))
    }

    fn validate_address(&self, address: &str) -> bool {
        decode_ss58(address).is_ok()
    }
}

/// Deterministic [`WalletSigner`] backed by nothing but a BLAKE2 hash; good
/// enough for identity derivation and mock submissions in tests.
pub struct MockWalletSigner {
    address: String,
}

impl MockWalletSigner {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl WalletSigner for MockWalletSigner {
    fn address(&self) -> &str {
        &self.address
    }

    fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        let mut seed = self.address.as_bytes().to_vec();
        seed.extend_from_slice(message);
        let first = hash_data(&seed);
        let second = hash_data(&first);
        let mut signature = first.to_vec();
        signature.extend_from_slice(&second);
        Ok(signature)
    }
}
