// src/config.rs
//! Chain and service configuration.
//!
//! Defaults target a generic substrate-style development node. Every field can
//! be overridden from the environment with a `ZKDID_` prefix, e.g.
//! `ZKDID_RPC_URL`, `ZKDID_SS58_PREFIX`, `ZKDID_CONFIRMATION_TIMEOUT_MS`.

use crate::error::{BlockchainError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Configuration for one target chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Human-readable network name, used in logs and error context.
    pub network: String,
    /// RPC endpoint handed to the chain client adapter.
    pub rpc_url: String,
    /// SS58 network prefix used when encoding account addresses.
    pub ss58_prefix: u16,
    /// Method name of the on-chain DID method (`did:<did_method>:<address>`).
    pub did_method: String,
    /// Name of the DID pallet targeted by orchestrator calls.
    pub did_pallet: String,
    /// Native token symbol reported in fee estimates.
    pub token_symbol: String,
    /// Native token decimals.
    pub token_decimals: u8,
    /// Expected block time, used to derive the confirmation timeout.
    pub block_time_ms: u64,
    /// How long `wait_for_confirmation` waits before giving up.
    pub confirmation_timeout_ms: u64,
    /// Extra weight applied on top of estimates for size-dependent calls.
    pub fee_buffer_percent: u8,
}

impl Default for ChainConfig {
    fn default() -> Self {
        let block_time_ms = 6_000;
        Self {
            network: "substrate-local".to_string(),
            rpc_url: "ws://127.0.0.1:9944".to_string(),
            ss58_prefix: 42,
            did_method: "substrate".to_string(),
            did_pallet: "didRegistry".to_string(),
            token_symbol: "UNIT".to_string(),
            token_decimals: 12,
            block_time_ms,
            // Ten blocks; 60s on a standard 6s parachain cadence.
            confirmation_timeout_ms: block_time_ms * 10,
            fee_buffer_percent: 20,
        }
    }
}

impl ChainConfig {
    /// Loads configuration from the environment, falling back to defaults for
    /// anything unset.
    ///
    /// # Errors
    /// Returns a configuration error if a set variable cannot be parsed into
    /// its field type.
    pub fn from_env() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("ZKDID").try_parsing(true))
            .build()
            .map_err(|e| BlockchainError::MissingConfig { key: e.to_string() })?;
        source
            .try_deserialize()
            .map_err(|e| BlockchainError::MissingConfig { key: e.to_string() })
    }

    /// Confirmation deadline as a [`Duration`].
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Applies the configured weight buffer to an estimated amount.
    ///
    /// Estimates drift between estimation and execution; the buffer absorbs
    /// that drift for calls whose cost depends on current chain state.
    pub fn buffered_weight(&self, estimated: u128) -> u128 {
        estimated.saturating_mul(100 + u128::from(self.fee_buffer_percent)) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_tracks_block_time() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.confirmation_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn weight_buffer_adds_twenty_percent() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.buffered_weight(1_000), 1_200);
        assert_eq!(cfg.buffered_weight(0), 0);
    }
}
