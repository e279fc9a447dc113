// src/models/transaction.rs
//! Transaction lifecycle types.
//!
//! A submitted extrinsic moves through a small state machine:
//! `Prepared → Submitted → InBlock → Finalized` on the success path, with
//! `Dropped`, `Invalid` and `Failed` as failure exits. `Finalized`, `Failed`,
//! `Dropped` and `Invalid` are terminal; a record never leaves a terminal
//! state.

use crate::error::{BlockchainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a submitted extrinsic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TransactionStatus {
    /// Built and signed, not yet broadcast.
    Prepared,
    /// Broadcast to the network, waiting for inclusion.
    Submitted,
    /// Included in a block that is not yet final.
    #[serde(rename_all = "camelCase")]
    InBlock { block_hash: String, block_number: u64 },
    /// Included in a finalized block.
    #[serde(rename_all = "camelCase")]
    Finalized { block_hash: String, block_number: u64 },
    /// Dropped from the transaction pool.
    Dropped,
    /// Rejected by the pool as invalid.
    Invalid { reason: String },
    /// Dispatch or adapter failure.
    Failed { reason: String },
}

impl TransactionStatus {
    /// Whether this status ends the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized { .. } | Self::Failed { .. } | Self::Dropped | Self::Invalid { .. }
        )
    }

    /// Whether this is the successful terminal state.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }

    /// Valid state-machine transitions. Any non-terminal state may move to
    /// `Failed` on an adapter error.
    pub fn can_transition_to(&self, next: &TransactionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Failed { .. }) => true,
            (Self::Prepared, Self::Submitted) => true,
            (Self::Submitted, Self::InBlock { .. })
            | (Self::Submitted, Self::Finalized { .. })
            | (Self::Submitted, Self::Dropped)
            | (Self::Submitted, Self::Invalid { .. }) => true,
            (Self::InBlock { .. }, Self::Finalized { .. }) => true,
            _ => false,
        }
    }

    /// Short label for logs and status callbacks.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Submitted => "submitted",
            Self::InBlock { .. } => "inBlock",
            Self::Finalized { .. } => "finalized",
            Self::Dropped => "dropped",
            Self::Invalid { .. } => "invalid",
            Self::Failed { .. } => "failed",
        }
    }
}

/// An event emitted by the chain while executing an extrinsic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChainEvent {
    pub pallet: String,
    pub method: String,
    pub data: serde_json::Value,
}

/// An estimated or charged inclusion fee.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Fee {
    /// Amount in the chain's smallest unit.
    pub amount: u128,
    /// Token symbol, from chain metadata.
    pub currency: String,
}

/// Record of one submit/confirm cycle. Owned by the transaction orchestrator
/// until a terminal status, then handed to the caller and discarded.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub extrinsic_hash: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    pub events: Vec<ChainEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Fee>,
    pub submitted_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Fresh record for a just-submitted extrinsic.
    pub fn submitted(extrinsic_hash: impl Into<String>, fee: Option<Fee>) -> Self {
        Self {
            extrinsic_hash: extrinsic_hash.into(),
            status: TransactionStatus::Submitted,
            block_number: None,
            block_hash: None,
            events: Vec::new(),
            fee,
            submitted_at: Utc::now(),
        }
    }

    /// Applies a status transition, enforcing the state machine.
    ///
    /// # Errors
    /// `TransactionInvalid` when the transition is not allowed (e.g. any move
    /// out of a terminal state).
    pub fn apply_status(&mut self, next: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(BlockchainError::TransactionInvalid {
                hash: self.extrinsic_hash.clone(),
                reason: format!(
                    "illegal transition {} -> {}",
                    self.status.label(),
                    next.label()
                ),
            });
        }
        if let TransactionStatus::InBlock {
            block_hash,
            block_number,
        }
        | TransactionStatus::Finalized {
            block_hash,
            block_number,
        } = &next
        {
            self.block_hash = Some(block_hash.clone());
            self.block_number = Some(*block_number);
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_block() -> TransactionStatus {
        TransactionStatus::InBlock {
            block_hash: "0xaa".into(),
            block_number: 7,
        }
    }

    fn finalized() -> TransactionStatus {
        TransactionStatus::Finalized {
            block_hash: "0xaa".into(),
            block_number: 7,
        }
    }

    #[test]
    fn success_path_is_accepted() {
        let mut record = TransactionRecord::submitted("0x01", None);
        record.apply_status(in_block()).unwrap();
        record.apply_status(finalized()).unwrap();
        assert!(record.status.is_success());
        assert_eq!(record.block_number, Some(7));
        assert_eq!(record.block_hash.as_deref(), Some("0xaa"));
    }

    #[test]
    fn terminal_states_never_regress() {
        let mut record = TransactionRecord::submitted("0x01", None);
        record
            .apply_status(TransactionStatus::Failed {
                reason: "dispatch error".into(),
            })
            .unwrap();
        assert!(record.apply_status(finalized()).is_err());

        let mut record = TransactionRecord::submitted("0x02", None);
        record.apply_status(in_block()).unwrap();
        record.apply_status(finalized()).unwrap();
        assert!(record
            .apply_status(TransactionStatus::Failed {
                reason: "late".into()
            })
            .is_err());
    }

    #[test]
    fn any_live_state_may_fail() {
        for status in [TransactionStatus::Prepared, TransactionStatus::Submitted, in_block()] {
            assert!(status.can_transition_to(&TransactionStatus::Failed {
                reason: "adapter".into()
            }));
        }
    }

    #[test]
    fn dropped_and_invalid_only_from_pool() {
        assert!(TransactionStatus::Submitted.can_transition_to(&TransactionStatus::Dropped));
        assert!(!in_block().can_transition_to(&TransactionStatus::Dropped));
        assert!(!TransactionStatus::Prepared.can_transition_to(&finalized()));
    }
}
