// src/blockchain/transaction.rs
//! Transaction orchestration: fee estimation, submission, and event-driven
//! confirmation tracking.
//!
//! One orchestrator instance serves many concurrent submissions; each
//! submit/confirm cycle owns its own [`TransactionRecord`] and the record is
//! discarded once terminal. The orchestrator classifies failures but never
//! retries on its own; callers opt into retry via
//! [`crate::error::retry_with_backoff`].

use crate::blockchain::client::{ChainClient, PalletCall, StatusUpdate, WalletSigner};
use crate::config::ChainConfig;
use crate::error::{BlockchainError, Result};
use crate::models::transaction::{Fee, TransactionRecord, TransactionStatus};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Handle for one broadcast extrinsic, returned by [`TransactionOrchestrator::submit`].
///
/// Carries the extrinsic hash and the live status subscription. Consumed by
/// `wait_for_confirmation`.
#[derive(Debug)]
pub struct TransactionHandle {
    pub extrinsic_hash: String,
    pub(crate) fee: Option<Fee>,
    pub(crate) receiver: mpsc::Receiver<StatusUpdate>,
}

/// Builds, submits, and confirms pallet calls through the injected chain
/// client.
pub struct TransactionOrchestrator {
    client: Arc<dyn ChainClient>,
    config: ChainConfig,
}

impl TransactionOrchestrator {
    pub fn new(client: Arc<dyn ChainClient>, config: ChainConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Estimates the inclusion fee for `call` signed by `signer_address`.
    ///
    /// Read-only and advisory: the charged fee may differ slightly at
    /// submission time as the fee market moves.
    pub async fn estimate_fee(&self, call: &PalletCall, signer_address: &str) -> Result<Fee> {
        let fee = self.client.estimate_fee(call, signer_address).await?;
        debug!(
            "estimated fee for {}::{}: {} {}",
            call.pallet, call.call, fee.amount, fee.currency
        );
        Ok(fee)
    }

    /// Signs and broadcasts `call`, returning immediately with a handle.
    ///
    /// When the call carries no explicit weight limit, the estimate is
    /// inflated by the configured buffer (default 20%) to absorb estimation
    /// drift between estimate time and execution time.
    pub async fn submit(
        &self,
        call: &PalletCall,
        signer: &dyn WalletSigner,
    ) -> Result<TransactionHandle> {
        let mut call = call.clone();
        let fee = self.client.estimate_fee(&call, signer.address()).await?;
        if call.weight_limit.is_none() {
            call.weight_limit = Some(self.config.buffered_weight(fee.amount));
        }

        let extrinsic_hash = self.client.submit(&call, signer).await?;
        info!(
            "submitted {}::{} as {} (signer {})",
            call.pallet,
            call.call,
            extrinsic_hash,
            signer.address()
        );

        let receiver = self.client.subscribe_status(&extrinsic_hash).await?;
        Ok(TransactionHandle {
            extrinsic_hash,
            fee: Some(fee),
            receiver,
        })
    }

    /// Waits for a terminal status with the configured default timeout and no
    /// status callback.
    pub async fn wait_for_confirmation(
        &self,
        handle: TransactionHandle,
    ) -> Result<TransactionRecord> {
        self.wait_for_confirmation_with(handle, None, |_| {}).await
    }

    /// Waits for a terminal status, invoking `on_status` for every observed
    /// transition.
    ///
    /// Resolves with the finalized record, or errors when the transaction
    /// fails, the subscription drops, or `timeout` (default: configured
    /// confirmation timeout) expires. A timeout does NOT cancel the
    /// extrinsic: it stays outstanding on-chain and the caller decides
    /// whether to resubmit or query later.
    pub async fn wait_for_confirmation_with(
        &self,
        mut handle: TransactionHandle,
        timeout: Option<Duration>,
        mut on_status: impl FnMut(&TransactionStatus),
    ) -> Result<TransactionRecord> {
        let timeout = timeout.unwrap_or_else(|| self.config.confirmation_timeout());
        let hash = handle.extrinsic_hash.clone();
        let mut record = TransactionRecord::submitted(hash.clone(), handle.fee.take());

        let outcome = tokio::time::timeout(timeout, async {
            while let Some(update) = handle.receiver.recv().await {
                on_status(&update.status);
                debug!("{hash}: status {}", update.status.label());

                // Adapters may repeat the submitted notification; only real
                // transitions go through the state machine.
                if update.status == record.status {
                    continue;
                }
                record.events.extend(update.events);
                record.apply_status(update.status)?;
                if record.status.is_terminal() {
                    return Ok(());
                }
            }
            Err(BlockchainError::SubscriptionDropped { hash: hash.clone() })
        })
        .await;

        match outcome {
            Err(_elapsed) => {
                warn!(
                    "{hash}: no terminal status within {}ms, extrinsic left outstanding",
                    timeout.as_millis()
                );
                Err(BlockchainError::ConfirmationTimeout {
                    hash,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => match &record.status {
                TransactionStatus::Finalized { block_number, .. } => {
                    info!("{hash}: finalized in block {block_number}");
                    Ok(record)
                }
                TransactionStatus::Dropped => {
                    Err(BlockchainError::TransactionDropped { hash })
                }
                TransactionStatus::Invalid { reason } => Err(BlockchainError::TransactionInvalid {
                    hash,
                    reason: reason.clone(),
                }),
                TransactionStatus::Failed { reason } => Err(BlockchainError::TransactionFailed {
                    hash,
                    reason: reason.clone(),
                }),
                // Terminal check above makes this unreachable.
                other => Err(BlockchainError::TransactionFailed {
                    hash,
                    reason: format!("non-terminal status {}", other.label()),
                }),
            },
        }
    }

    /// Submits and waits with defaults; the common path for pallet calls.
    pub async fn submit_and_wait(
        &self,
        call: &PalletCall,
        signer: &dyn WalletSigner,
    ) -> Result<TransactionRecord> {
        let handle = self.submit(call, signer).await?;
        self.wait_for_confirmation(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::{MockChainClient, MockWalletSigner};
    use crate::models::transaction::TransactionStatus;
    use serde_json::json;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    fn orchestrator(client: Arc<MockChainClient>) -> TransactionOrchestrator {
        TransactionOrchestrator::new(client, ChainConfig::default())
    }

    fn noop_call() -> PalletCall {
        PalletCall::new("system", "remark", json!({"remark": "0x00"}))
    }

    #[tokio::test]
    async fn submit_and_confirm_success_path() {
        let client = Arc::new(MockChainClient::new());
        let orchestrator = orchestrator(client.clone());
        let signer = MockWalletSigner::new(ALICE);

        let mut seen = Vec::new();
        let handle = orchestrator.submit(&noop_call(), &signer).await.unwrap();
        let hash = handle.extrinsic_hash.clone();
        let record = orchestrator
            .wait_for_confirmation_with(handle, None, |status| seen.push(status.label()))
            .await
            .unwrap();

        assert!(record.status.is_success());
        assert_eq!(record.extrinsic_hash, hash);
        assert!(record.block_number.is_some());
        assert!(seen.contains(&"finalized"));
    }

    #[tokio::test]
    async fn weight_buffer_is_applied_on_submit() {
        let client = Arc::new(MockChainClient::new());
        client.set_fee(1_000);
        let orchestrator = orchestrator(client.clone());
        let signer = MockWalletSigner::new(ALICE);

        let handle = orchestrator.submit(&noop_call(), &signer).await.unwrap();
        orchestrator.wait_for_confirmation(handle).await.unwrap();

        let submitted = client.submitted_calls();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].weight_limit, Some(1_200));
    }

    #[tokio::test]
    async fn dropped_transaction_surfaces_as_transaction_error() {
        let client = Arc::new(MockChainClient::new());
        client.script_statuses(vec![StatusUpdate::new(TransactionStatus::Dropped)]);
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let handle = orchestrator.submit(&noop_call(), &signer).await.unwrap();
        let err = orchestrator.wait_for_confirmation(handle).await.unwrap_err();
        assert!(matches!(err, BlockchainError::TransactionDropped { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn submit_timeout_is_a_retryable_network_error() {
        let client = Arc::new(MockChainClient::new());
        client.fail_next_submit(BlockchainError::RpcTimeout { timeout_ms: 5000 });
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let err = orchestrator.submit(&noop_call(), &signer).await.unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Network);
        assert_eq!(err.severity(), crate::error::ErrorSeverity::Critical);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn confirmation_timeout_leaves_extrinsic_outstanding() {
        let client = Arc::new(MockChainClient::new());
        // Only a non-terminal update; the subscription then stays silent.
        client.script_statuses_and_hold(vec![StatusUpdate::new(TransactionStatus::InBlock {
            block_hash: "0xaa".into(),
            block_number: 1,
        })]);
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let handle = orchestrator.submit(&noop_call(), &signer).await.unwrap();
        let err = orchestrator
            .wait_for_confirmation_with(handle, Some(Duration::from_millis(50)), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn finalized_never_observed_after_failure() {
        let client = Arc::new(MockChainClient::new());
        client.script_statuses(vec![
            StatusUpdate::new(TransactionStatus::Failed {
                reason: "dispatch error".into(),
            }),
            StatusUpdate::new(TransactionStatus::Finalized {
                block_hash: "0xaa".into(),
                block_number: 2,
            }),
        ]);
        let orchestrator = orchestrator(client);
        let signer = MockWalletSigner::new(ALICE);

        let handle = orchestrator.submit(&noop_call(), &signer).await.unwrap();
        let err = orchestrator.wait_for_confirmation(handle).await.unwrap_err();
        // The failure wins; the late Finalized notification is never applied.
        assert!(matches!(err, BlockchainError::TransactionFailed { .. }));
    }
}
