use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address,
    instruction::create_associated_token_account_idempotent,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::agent::data_fetcher::MetadataSource;
use crate::agent::types::{AgentError, Coin, TradeReceipt};
use crate::onchain_instance::bonding_curve::TOKEN_DECIMALS;
use crate::onchain_instance::instance::{TradeAccounts, buy_instruction, sell_instruction};
use crate::onchain_instance::rpc::{ChainRpc, fetch_bonding_curve, token_account_amount};
use crate::services::ledger::{Holding, PurchaseLedger};

/// Priority fee settings attached to buys
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSettings {
    /// Micro-lamports per compute unit
    pub compute_unit_price: u64,
    pub compute_unit_limit: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            compute_unit_price: 250_000,
            compute_unit_limit: 100_000,
        }
    }
}

/// Signs and submits bonding-curve trades and keeps the purchase ledger.
///
/// The wallet and ledger sit behind one async mutex that every operation holds
/// from validation to ledger write, RPC round trips included. Two operations
/// on the same wallet never interleave.
pub struct TradeExecutor {
    keypair: Keypair,
    rpc: Arc<dyn ChainRpc>,
    metadata: Arc<dyn MetadataSource>,
    ledger: Mutex<PurchaseLedger>,
    settings: ExecutionSettings,
}

impl TradeExecutor {
    pub fn new(
        keypair: Keypair,
        rpc: Arc<dyn ChainRpc>,
        metadata: Arc<dyn MetadataSource>,
        ledger: PurchaseLedger,
        settings: ExecutionSettings,
    ) -> Self {
        info!("Trade executor ready for wallet {}", keypair.pubkey());
        Self {
            keypair,
            rpc,
            metadata,
            ledger: Mutex::new(ledger),
            settings,
        }
    }

    pub fn wallet(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Snapshot of current holdings.
    pub async fn holdings(&self) -> BTreeMap<String, Holding> {
        self.ledger.lock().await.holdings().clone()
    }

    /// Buy `sol_amount` SOL worth of `coin`, paying at most `slippage` above
    /// the spot price. Fills in the coin's associated bonding curve if unset.
    pub async fn buy(&self, coin: &mut Coin, sol_amount: f64, slippage: f64) -> Result<TradeReceipt, AgentError> {
        if !(sol_amount.is_finite() && sol_amount > 0.0) {
            return Err(AgentError::Validation(format!("buy amount must be > 0 SOL, got {}", sol_amount)));
        }
        check_slippage(slippage)?;

        let mut ledger = self.ledger.lock().await;

        let wallet = self.wallet();
        let user_token_account = get_associated_token_address(&wallet, &coin.mint);
        let state = fetch_bonding_curve(&*self.rpc, &coin.bonding_curve).await?;
        let associated_bonding_curve = self.resolve_associated_bonding_curve(coin).await;
        let price = state.price()?;

        let token_amount = sol_amount / price;
        let raw_amount = to_raw_amount(token_amount);
        let max_sol_cost = (sol_amount * (1.0 + slippage) * LAMPORTS_PER_SOL as f64) as u64;

        let accounts = TradeAccounts {
            mint: coin.mint,
            bonding_curve: coin.bonding_curve,
            associated_bonding_curve,
            user_token_account,
            user: wallet,
        };
        let instructions = [
            ComputeBudgetInstruction::set_compute_unit_price(self.settings.compute_unit_price),
            ComputeBudgetInstruction::set_compute_unit_limit(self.settings.compute_unit_limit),
            create_associated_token_account_idempotent(&wallet, &wallet, &coin.mint, &spl_token::ID),
            buy_instruction(&accounts, raw_amount, max_sol_cost),
        ];

        let signature = self.submit(&instructions).await.map_err(|e| {
            error!("Buy of {} failed: {}", coin.mint, e);
            e
        })?;

        let held = ledger.credit(coin, token_amount)?;
        info!(
            "Bought {:.6} {} at {} SOL ({} SOL, max {} lamports), holding {:.6}: {}",
            token_amount, coin.mint, price, sol_amount, max_sol_cost, held, signature
        );

        Ok(TradeReceipt {
            mint: coin.key(),
            signature: signature.to_string(),
            price,
            token_amount,
            lamport_bound: max_sol_cost,
        })
    }

    /// Sell `percentage` of the recorded holding of `mint`.
    pub async fn sell(&self, mint: &Pubkey, percentage: f64, slippage: f64) -> Result<TradeReceipt, AgentError> {
        check_percentage(percentage)?;
        check_slippage(slippage)?;

        let mut ledger = self.ledger.lock().await;
        self.sell_locked(&mut ledger, &mint.to_string(), percentage, slippage).await
    }

    /// Sell every holding in full under a single lock.
    ///
    /// Failures do not stop the sweep; they are collected and returned as
    /// [`AgentError::SellAllIncomplete`]. Returns the number of positions sold.
    pub async fn sell_all(&self, slippage: f64) -> Result<usize, AgentError> {
        check_slippage(slippage)?;

        let mut ledger = self.ledger.lock().await;
        let mints: Vec<String> = ledger.holdings().keys().cloned().collect();
        info!("Selling all {} holdings", mints.len());

        let mut sold = 0;
        let mut failures = Vec::new();
        for mint in mints {
            match self.sell_locked(&mut ledger, &mint, 100.0, slippage).await {
                Ok(_) => sold += 1,
                Err(e) => {
                    warn!("Sell-all: {} failed: {}", mint, e);
                    failures.push((mint, e.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(sold)
        } else {
            Err(AgentError::SellAllIncomplete { sold, failures })
        }
    }

    async fn sell_locked(
        &self,
        ledger: &mut PurchaseLedger,
        mint: &str,
        percentage: f64,
        slippage: f64,
    ) -> Result<TradeReceipt, AgentError> {
        let holding = ledger
            .get(mint)
            .cloned()
            .ok_or_else(|| AgentError::NotHolding(mint.to_string()))?;
        let mut coin = coin_from_holding(mint, &holding)?;

        let sell_amount = holding.amount * percentage / 100.0;
        let state = fetch_bonding_curve(&*self.rpc, &coin.bonding_curve).await?;
        let associated_bonding_curve = self.resolve_associated_bonding_curve(&mut coin).await;
        let price = state.price()?;

        let raw_amount = to_raw_amount(sell_amount);
        let min_sol_output = (sell_amount * price * (1.0 - slippage) * LAMPORTS_PER_SOL as f64) as u64;

        let wallet = self.wallet();
        let accounts = TradeAccounts {
            mint: coin.mint,
            bonding_curve: coin.bonding_curve,
            associated_bonding_curve,
            user_token_account: get_associated_token_address(&wallet, &coin.mint),
            user: wallet,
        };
        let instruction = sell_instruction(&accounts, raw_amount, min_sol_output);

        let signature = self.submit(&[instruction]).await.map_err(|e| {
            error!("Sell of {} failed: {}", mint, e);
            e
        })?;

        let remaining = ledger.debit(mint, sell_amount)?;
        info!(
            "Sold {:.6} {} ({}%) at {} SOL (min {} lamports), {:.6} left: {}",
            sell_amount, mint, percentage, price, min_sol_output, remaining, signature
        );

        Ok(TradeReceipt {
            mint: mint.to_string(),
            signature: signature.to_string(),
            price,
            token_amount: sell_amount,
            lamport_bound: min_sol_output,
        })
    }

    /// Transfer SOL out of the trading wallet. Leaves the ledger untouched.
    pub async fn withdraw(&self, to: &Pubkey, sol_amount: f64) -> Result<Signature, AgentError> {
        if !(sol_amount.is_finite() && sol_amount > 0.0) {
            return Err(AgentError::Validation(format!("withdraw amount must be > 0 SOL, got {}", sol_amount)));
        }

        let _guard = self.ledger.lock().await;

        let available = lamports_to_sol(self.rpc.balance(&self.wallet()).await?);
        if sol_amount >= available {
            return Err(AgentError::InsufficientBalance {
                requested: sol_amount,
                available,
            });
        }

        let lamports = (sol_amount * LAMPORTS_PER_SOL as f64) as u64;
        let instruction = system_instruction::transfer(&self.wallet(), to, lamports);
        let signature = self.submit(&[instruction]).await?;
        info!("Withdrew {} SOL to {}: {}", sol_amount, to, signature);
        Ok(signature)
    }

    /// Wallet balance in SOL.
    pub async fn balance(&self) -> Result<f64, AgentError> {
        let _guard = self.ledger.lock().await;
        Ok(lamports_to_sol(self.rpc.balance(&self.wallet()).await?))
    }

    /// Fresh spot price of `coin`. Does not take the wallet lock.
    pub async fn price(&self, coin: &Coin) -> Result<f64, AgentError> {
        let state = fetch_bonding_curve(&*self.rpc, &coin.bonding_curve).await?;
        Ok(state.price()?)
    }

    /// Align ledger amounts with the wallet's on-chain token accounts.
    ///
    /// Entries whose token account is missing or empty are dropped, others take
    /// the on-chain amount. An entry that cannot be checked is left as is.
    /// Returns how many entries changed.
    pub async fn reconcile(&self) -> Result<usize, AgentError> {
        let mut ledger = self.ledger.lock().await;
        let wallet = self.wallet();
        let entries: Vec<(String, f64)> = ledger
            .holdings()
            .iter()
            .map(|(mint, holding)| (mint.clone(), holding.amount))
            .collect();

        let mut changed = 0;
        for (mint, recorded) in entries {
            let Ok(mint_key) = Pubkey::from_str(&mint) else {
                warn!("Reconcile: ledger key {} is not a mint address, skipping", mint);
                continue;
            };
            let token_account = get_associated_token_address(&wallet, &mint_key);
            let on_chain = match token_account_amount(&*self.rpc, &token_account).await {
                Ok(amount) => amount.map(from_raw_amount).unwrap_or(0.0),
                Err(e) => {
                    warn!("Reconcile: could not read token account for {}: {}", mint, e);
                    continue;
                }
            };

            if (on_chain - recorded).abs() > f64::EPSILON {
                info!("Reconcile: {} ledger {} -> on-chain {}", mint, recorded, on_chain);
                ledger.set_amount(&mint, on_chain)?;
                changed += 1;
            }
        }

        debug!("Reconciled ledger, {} entries changed", changed);
        Ok(changed)
    }

    // Metadata first, then the ATA of (bonding curve, mint). The result is
    // stored back on the coin.
    async fn resolve_associated_bonding_curve(&self, coin: &mut Coin) -> Pubkey {
        if let Some(existing) = coin.associated_bonding_curve {
            return existing;
        }
        let resolved = match self.metadata.associated_bonding_curve(&coin.mint).await {
            Some(address) => address,
            None => get_associated_token_address(&coin.bonding_curve, &coin.mint),
        };
        coin.associated_bonding_curve = Some(resolved);
        resolved
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<Signature, AgentError> {
        let blockhash = self.rpc.latest_blockhash().await?;
        let wallet = self.wallet();
        let transaction =
            Transaction::new_signed_with_payer(instructions, Some(&wallet), &[&self.keypair], blockhash);
        self.rpc.send_transaction(&transaction).await
    }
}

fn check_slippage(slippage: f64) -> Result<(), AgentError> {
    if (0.0..1.0).contains(&slippage) {
        Ok(())
    } else {
        Err(AgentError::Validation(format!("slippage must be within [0, 1), got {}", slippage)))
    }
}

fn check_percentage(percentage: f64) -> Result<(), AgentError> {
    if (0.0..=100.0).contains(&percentage) {
        Ok(())
    } else {
        Err(AgentError::Validation(format!("percentage must be within [0, 100], got {}", percentage)))
    }
}

fn coin_from_holding(mint: &str, holding: &Holding) -> Result<Coin, AgentError> {
    let parse = |text: &str| {
        Pubkey::from_str(text).map_err(|e| AgentError::Validation(format!("bad address {} in ledger: {}", text, e)))
    };
    let mut coin = Coin::new(parse(mint)?, parse(&holding.bonding_curve)?, 0.0);
    coin.associated_bonding_curve = holding
        .associated_bonding_curve
        .as_deref()
        .map(parse)
        .transpose()?;
    Ok(coin)
}

fn to_raw_amount(tokens: f64) -> u64 {
    (tokens * 10f64.powi(TOKEN_DECIMALS as i32)) as u64
}

fn from_raw_amount(raw: u64) -> f64 {
    raw as f64 / 10f64.powi(TOKEN_DECIMALS as i32)
}

fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
