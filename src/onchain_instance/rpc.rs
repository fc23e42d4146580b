//! Chain access used by the execution engine.
//!
//! `ChainRpc` is the narrow capability the engine needs; `RateLimitedRpc`
//! is the production implementation over the nonblocking Solana client,
//! throttled to a fixed quota per time window.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use spl_token::solana_program::program_pack::Pack;
use tracing::debug;

use crate::agent::types::AgentError;
use crate::onchain_instance::bonding_curve::BondingCurveState;

#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Raw account data, `None` when the account does not exist.
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError>;

    /// Finalized recent blockhash.
    async fn latest_blockhash(&self) -> Result<Hash, AgentError>;

    /// Submit with preflight checks skipped.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, AgentError>;

    /// Balance in lamports.
    async fn balance(&self, address: &Pubkey) -> Result<u64, AgentError>;
}

pub struct RateLimitedRpc {
    client: RpcClient,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitedRpc {
    /// `max_requests` calls are allowed per `window`, refilled evenly.
    pub fn new(endpoint: String, max_requests: u32, window: Duration) -> Result<Self, AgentError> {
        let burst = NonZeroU32::new(max_requests)
            .ok_or_else(|| AgentError::Configuration("RPC request quota must be > 0".to_string()))?;
        let quota = Quota::with_period(window / burst.get())
            .ok_or_else(|| AgentError::Configuration("RPC quota window must be > 0".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            client: RpcClient::new_with_commitment(endpoint, CommitmentConfig::confirmed()),
            limiter: RateLimiter::direct(quota),
        })
    }
}

#[async_trait]
impl ChainRpc for RateLimitedRpc {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn latest_blockhash(&self) -> Result<Hash, AgentError> {
        self.limiter.until_ready().await;
        let (hash, _) = self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await?;
        Ok(hash)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, AgentError> {
        self.limiter.until_ready().await;
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Finalized),
            ..Default::default()
        };
        let signature = self.client.send_transaction_with_config(transaction, config).await?;
        debug!("Submitted transaction {}", signature);
        Ok(signature)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, AgentError> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get_balance_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value)
    }
}

/// Fetch and decode a bonding curve account.
pub async fn fetch_bonding_curve(
    rpc: &dyn ChainRpc,
    bonding_curve: &Pubkey,
) -> Result<BondingCurveState, AgentError> {
    let data = rpc
        .account_data(bonding_curve)
        .await?
        .ok_or_else(|| AgentError::Rpc(format!("bonding curve account {} not found", bonding_curve)))?;
    Ok(BondingCurveState::decode(&data)?)
}

/// Raw token amount held by an SPL token account, `None` if it does not exist.
pub async fn token_account_amount(
    rpc: &dyn ChainRpc,
    token_account: &Pubkey,
) -> Result<Option<u64>, AgentError> {
    let Some(data) = rpc.account_data(token_account).await? else {
        return Ok(None);
    };
    let account = spl_token::state::Account::unpack(&data)
        .map_err(|e| AgentError::Rpc(format!("invalid token account {}: {}", token_account, e)))?;
    Ok(Some(account.amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_quota() {
        let err = RateLimitedRpc::new("http://127.0.0.1:8899".to_string(), 0, Duration::from_secs(10));
        assert!(matches!(err, Err(AgentError::Configuration(_))));
    }

    #[test]
    fn rejects_zero_window() {
        let err = RateLimitedRpc::new("http://127.0.0.1:8899".to_string(), 35, Duration::ZERO);
        assert!(matches!(err, Err(AgentError::Configuration(_))));
    }

    #[tokio::test]
    async fn burst_up_to_quota_is_immediate() {
        let rpc = RateLimitedRpc::new("http://127.0.0.1:8899".to_string(), 35, Duration::from_secs(10)).unwrap();
        for _ in 0..35 {
            assert!(rpc.limiter.check().is_ok());
        }
        assert!(rpc.limiter.check().is_err());
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// In-memory chain used by unit tests.
    #[derive(Default)]
    pub struct FakeRpc {
        pub accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
        pub lamports: Mutex<u64>,
        pub sent: Mutex<Vec<Transaction>>,
        pub fail_send: AtomicBool,
        pub fail_blockhash: AtomicBool,
    }

    impl FakeRpc {
        pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
            self.accounts.lock().insert(address, data);
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().len()
        }

        pub fn fail_sends(&self, fail: bool) {
            self.fail_send.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ChainRpc for FakeRpc {
        async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
            Ok(self.accounts.lock().get(address).cloned())
        }

        async fn latest_blockhash(&self) -> Result<Hash, AgentError> {
            if self.fail_blockhash.load(Ordering::SeqCst) {
                return Err(AgentError::Rpc("blockhash unavailable".to_string()));
            }
            Ok(Hash::new_unique())
        }

        async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, AgentError> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(AgentError::Rpc("send rejected".to_string()));
            }
            self.sent.lock().push(transaction.clone());
            Ok(transaction.signatures[0])
        }

        async fn balance(&self, _address: &Pubkey) -> Result<u64, AgentError> {
            Ok(*self.lamports.lock())
        }
    }
}
