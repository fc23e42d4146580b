use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval};
use tracing::{debug, error, info, warn};

use crate::agent::classifier::Classifier;
use crate::agent::data_fetcher::{DataFetcher, SignalSource};
use crate::agent::dedup::{DedupFilter, Screening};
use crate::agent::executor::TradeExecutor;
use crate::agent::features::FeaturePipeline;
use crate::agent::planner::{Decision, DecisionGate, TradingSession};
use crate::agent::types::{AgentError, Coin, NewTokenEvent};
use crate::config::{TradeMode, TradingConfig};

/// What happened to one admitted discovery event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Skipped(&'static str),
    Busy,
    /// Trade cycle finished; fractional price change from entry to exit.
    Traded(f64),
    Failed(String),
}

#[derive(Debug, Default)]
struct AgentStats {
    discovered: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    evaluated: AtomicU64,
    admitted: AtomicU64,
    busy: AtomicU64,
    trades_completed: AtomicU64,
    trades_failed: AtomicU64,
}

impl AgentStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub mode: TradeMode,
    pub ready: bool,
    pub halted: bool,
    pub trade_in_flight: bool,
    pub trending_word: String,
    pub starting_balance_sol: Option<f64>,
    pub paper_balance_sol: Option<f64>,
    pub tracked_mints: usize,
    pub discovered: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub evaluated: u64,
    pub admitted: u64,
    pub busy: u64,
    pub trades_completed: u64,
    pub trades_failed: u64,
}

/// Main trading agent: discovery events in, at most one trade cycle at a time out
pub struct TradingAgent {
    config: TradingConfig,
    session: Arc<TradingSession>,
    dedup: DedupFilter,
    pipeline: FeaturePipeline,
    gate: DecisionGate,
    executor: Arc<TradeExecutor>,
    paper_balance: Mutex<f64>,
    starting_balance: Mutex<Option<f64>>,
    stats: AgentStats,
}

impl TradingAgent {
    pub fn new(
        config: TradingConfig,
        dedup_window: Duration,
        session: Arc<TradingSession>,
        source: Arc<dyn SignalSource>,
        classifier: Arc<dyn Classifier>,
        executor: Arc<TradeExecutor>,
    ) -> Self {
        info!(
            "Initializing trading agent in {:?} mode (risk {}%, stop {}% / {}%)",
            config.mode, config.balance_risk, config.trade_stop_loss, config.total_stop_loss
        );
        Self {
            paper_balance: Mutex::new(config.paper_balance_sol),
            starting_balance: Mutex::new(None),
            dedup: DedupFilter::new(dedup_window),
            pipeline: FeaturePipeline::new(source, session.clone()),
            gate: DecisionGate::new(classifier, session.clone()),
            session,
            executor,
            config,
            stats: AgentStats::default(),
        }
    }

    pub fn session(&self) -> &Arc<TradingSession> {
        &self.session
    }

    /// Record the starting balance and open the session for admissions.
    pub async fn start(&self) -> Result<(), AgentError> {
        let balance = self.current_balance().await?;
        *self.starting_balance.lock() = Some(balance);
        info!("Starting balance {} SOL", balance);
        self.session.mark_ready();
        Ok(())
    }

    /// Consume discovery events until the feed closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<NewTokenEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(event);
        }
        info!("Discovery channel closed, agent loop exiting");
    }

    fn on_event(self: &Arc<Self>, event: NewTokenEvent) {
        AgentStats::bump(&self.stats.discovered);
        let screening = self.dedup.screen(&event, self.session.is_ready());
        match &screening {
            Screening::Admitted => {
                info!("Discovered {} (market cap {} SOL)", event.mint, event.market_cap_sol);
                let agent = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = agent.process(event, Screening::Admitted).await;
                    debug!("Event outcome: {:?}", outcome);
                });
            }
            Screening::AlreadySeen => {
                AgentStats::bump(&self.stats.duplicates);
                debug!("Already seen {}", event.mint);
            }
            Screening::Rejected(reason) => {
                AgentStats::bump(&self.stats.rejected);
                debug!("Rejected {:?}: {}", event.mint, reason);
            }
        }
    }

    /// Aggregate features, consult the gate and, when admitted, run one trade
    /// cycle while holding the admission permit.
    pub async fn process(&self, event: NewTokenEvent, screening: Screening) -> ProcessOutcome {
        let mut coin = match coin_from_event(&event) {
            Ok(coin) => coin,
            Err(e) => {
                AgentStats::bump(&self.stats.rejected);
                return ProcessOutcome::Failed(e.to_string());
            }
        };

        let compiled = self.pipeline.compile(&coin).await;
        AgentStats::bump(&self.stats.evaluated);
        coin.market_cap_sol = compiled.market_cap_sol;
        if coin.associated_bonding_curve.is_none() {
            coin.associated_bonding_curve = compiled.metadata.associated_bonding_curve;
        }

        let _permit = match self.gate.evaluate(&screening, &compiled.features) {
            Decision::Skip(reason) => {
                debug!("Skipping {}: {}", coin.mint, reason);
                return ProcessOutcome::Skipped(reason);
            }
            Decision::Busy => {
                AgentStats::bump(&self.stats.busy);
                debug!("Trade in flight, dropping {}", coin.mint);
                return ProcessOutcome::Busy;
            }
            Decision::Admit(permit) => permit,
        };

        AgentStats::bump(&self.stats.admitted);
        info!("Admitted {} ({})", coin.mint, compiled.metadata.name);

        match self.trade_cycle(&mut coin).await {
            Ok(change) => {
                AgentStats::bump(&self.stats.trades_completed);
                ProcessOutcome::Traded(change)
            }
            Err(e) => {
                AgentStats::bump(&self.stats.trades_failed);
                error!("Trade cycle for {} failed: {}", coin.mint, e);
                ProcessOutcome::Failed(e.to_string())
            }
        }
    }

    async fn trade_cycle(&self, coin: &mut Coin) -> Result<f64, AgentError> {
        let size = self.current_balance().await? * self.config.balance_risk / 100.0;
        if !(size > 0.0) {
            return Err(AgentError::Validation(format!("position size {} SOL is not tradable", size)));
        }

        let entry = match self.config.mode {
            TradeMode::Live => self.executor.buy(coin, size, self.config.slippage).await?.price,
            TradeMode::Paper => self.executor.price(coin).await?,
        };
        info!("Entered {} with {} SOL at {}", coin.mint, size, entry);

        let exit = self.hold_position(coin, entry).await;
        let change = (exit - entry) / entry;

        match self.config.mode {
            TradeMode::Live => {
                self.executor.sell(&coin.mint, 100.0, self.config.slippage).await?;
            }
            TradeMode::Paper => {
                let mut balance = self.paper_balance.lock();
                *balance += size * change;
                info!("Paper balance now {:.9} SOL", *balance);
            }
        }
        info!("Exited {} at {} ({:+.2}%)", coin.mint, exit, change * 100.0);

        self.enforce_total_stop_loss().await;
        Ok(change)
    }

    /// Poll the price until the hold time is up or the trade stop-loss fires.
    /// Returns the last price seen.
    async fn hold_position(&self, coin: &Coin, entry: f64) -> f64 {
        let deadline = Instant::now() + self.config.hold_duration();
        let stop = entry * (1.0 - self.config.trade_stop_loss / 100.0);
        let poll = self.config.price_poll_interval();
        let mut last = entry;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;

            match self.executor.price(coin).await {
                Ok(price) => {
                    last = price;
                    if price <= stop {
                        warn!("Stop-loss hit for {}: {} <= {}", coin.mint, price, stop);
                        break;
                    }
                }
                Err(e) => warn!("Price poll for {} failed: {}", coin.mint, e),
            }
        }
        last
    }

    async fn enforce_total_stop_loss(&self) {
        let start = *self.starting_balance.lock();
        let Some(start) = start else {
            return;
        };
        let current = match self.current_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Could not check total stop-loss: {}", e);
                return;
            }
        };

        let floor = start * (1.0 - self.config.total_stop_loss / 100.0);
        if current >= floor {
            return;
        }

        error!("Total stop-loss hit: balance {} SOL below {} SOL", current, floor);
        self.session.halt();
        if self.config.mode == TradeMode::Live {
            match self.executor.sell_all(self.config.slippage).await {
                Ok(sold) => info!("Liquidated {} positions", sold),
                Err(e) => error!("Liquidation after stop-loss incomplete: {}", e),
            }
        }
    }

    async fn current_balance(&self) -> Result<f64, AgentError> {
        match self.config.mode {
            TradeMode::Live => self.executor.balance().await,
            TradeMode::Paper => Ok(*self.paper_balance.lock()),
        }
    }

    /// Periodically drop expired dedup entries.
    pub async fn purge_seen(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            self.dedup.purge_expired();
        }
    }

    pub fn status(&self) -> AgentStatus {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        AgentStatus {
            mode: self.config.mode,
            ready: self.session.is_ready(),
            halted: self.session.is_halted(),
            trade_in_flight: self.session.trade_in_flight(),
            trending_word: self.session.trending_word(),
            starting_balance_sol: *self.starting_balance.lock(),
            paper_balance_sol: (self.config.mode == TradeMode::Paper).then(|| *self.paper_balance.lock()),
            tracked_mints: self.dedup.len(),
            discovered: load(&self.stats.discovered),
            duplicates: load(&self.stats.duplicates),
            rejected: load(&self.stats.rejected),
            evaluated: load(&self.stats.evaluated),
            admitted: load(&self.stats.admitted),
            busy: load(&self.stats.busy),
            trades_completed: load(&self.stats.trades_completed),
            trades_failed: load(&self.stats.trades_failed),
        }
    }
}

/// Keep the session's trending word fresh.
pub async fn refresh_trending_word(fetcher: Arc<DataFetcher>, session: Arc<TradingSession>, every: Duration) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        match fetcher.trending_word().await {
            Ok(word) => {
                if word != session.trending_word() {
                    info!("Trending word is now {:?}", word);
                }
                session.set_trending_word(&word);
            }
            Err(e) => debug!("Trending word refresh failed: {}", e),
        }
    }
}

fn coin_from_event(event: &NewTokenEvent) -> Result<Coin, AgentError> {
    let parse = |field: &str, text: &str| {
        Pubkey::from_str(text).map_err(|e| AgentError::Validation(format!("bad {} {:?}: {}", field, text, e)))
    };
    Ok(Coin::new(
        parse("mint", &event.mint)?,
        parse("bonding curve", &event.bonding_curve_key)?,
        event.market_cap_sol,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use solana_sdk::hash::Hash;
    use solana_sdk::native_token::LAMPORTS_PER_SOL;
    use solana_sdk::signature::{Keypair, Signature};
    use solana_sdk::transaction::Transaction;

    use crate::agent::classifier::RejectAll;
    use crate::agent::executor::{ExecutionSettings, tests::StaticMetadata};
    use crate::agent::features::tests::SilentSource;
    use crate::agent::planner::tests::Fixed;
    use crate::onchain_instance::bonding_curve::{BondingCurveState, encode_fixture};
    use crate::onchain_instance::rpc::ChainRpc;
    use crate::onchain_instance::rpc::fake::FakeRpc;
    use crate::services::ledger::{PurchaseLedger, temp_ledger_path};

    /// Serves a scripted sequence of curve states for one account; the last
    /// one repeats.
    struct ScriptedCurve {
        inner: FakeRpc,
        curve: Pubkey,
        frames: Mutex<VecDeque<Vec<u8>>>,
    }

    #[async_trait]
    impl ChainRpc for ScriptedCurve {
        async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
            if *address != self.curve {
                return self.inner.account_data(address).await;
            }
            let mut frames = self.frames.lock();
            if frames.len() > 1 {
                return Ok(frames.pop_front());
            }
            Ok(frames.front().cloned())
        }
        async fn latest_blockhash(&self) -> Result<Hash, AgentError> {
            self.inner.latest_blockhash().await
        }
        async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, AgentError> {
            self.inner.send_transaction(transaction).await
        }
        async fn balance(&self, address: &Pubkey) -> Result<u64, AgentError> {
            self.inner.balance(address).await
        }
    }

    fn curve_at(sol_reserves_sol: u64) -> Vec<u8> {
        encode_fixture(&BondingCurveState {
            virtual_token_reserves: 1_000_000_000_000,
            virtual_sol_reserves: sol_reserves_sol * LAMPORTS_PER_SOL,
            real_token_reserves: 0,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        })
    }

    fn trading(mode: TradeMode, balance_risk: f64) -> TradingConfig {
        TradingConfig {
            mode,
            balance_risk,
            hold_duration_secs: 1,
            price_poll_interval_ms: 100,
            paper_balance_sol: 1.0,
            ..TradingConfig::default()
        }
    }

    fn agent(config: TradingConfig, rpc: Arc<dyn ChainRpc>, classifier: Arc<dyn Classifier>) -> TradingAgent {
        let executor = TradeExecutor::new(
            Keypair::new(),
            rpc,
            Arc::new(StaticMetadata(None)),
            PurchaseLedger::load(temp_ledger_path()).unwrap(),
            ExecutionSettings::default(),
        );
        TradingAgent::new(
            config,
            Duration::from_secs(60),
            Arc::new(TradingSession::new()),
            Arc::new(SilentSource),
            classifier,
            Arc::new(executor),
        )
    }

    fn event_for(curve: Pubkey) -> NewTokenEvent {
        NewTokenEvent {
            mint: Pubkey::new_unique().to_string(),
            bonding_curve_key: curve.to_string(),
            market_cap_sol: 30.0,
            ..NewTokenEvent::default()
        }
    }

    fn scripted(frames: Vec<Vec<u8>>) -> (Arc<ScriptedCurve>, Pubkey) {
        let curve = Pubkey::new_unique();
        let rpc = Arc::new(ScriptedCurve {
            inner: FakeRpc::default(),
            curve,
            frames: Mutex::new(frames.into()),
        });
        (rpc, curve)
    }

    #[tokio::test(start_paused = true)]
    async fn paper_trade_applies_price_change() {
        let (rpc, curve) = scripted(vec![curve_at(30_000), curve_at(36_000)]);
        let agent = agent(trading(TradeMode::Paper, 4.0), rpc.clone(), Arc::new(Fixed(true)));
        agent.start().await.unwrap();

        let outcome = agent.process(event_for(curve), Screening::Admitted).await;
        let ProcessOutcome::Traded(change) = outcome else {
            panic!("expected a trade, got {:?}", outcome);
        };
        assert!((change - 0.2).abs() < 1e-9);

        let status = agent.status();
        assert!((status.paper_balance_sol.unwrap() - 1.008).abs() < 1e-9);
        assert_eq!(status.trades_completed, 1);
        assert!(!status.trade_in_flight);
        assert_eq!(rpc.inner.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_loss_exits_early() {
        let (rpc, curve) = scripted(vec![curve_at(30_000), curve_at(15_000), curve_at(60_000)]);
        let agent = agent(trading(TradeMode::Paper, 4.0), rpc, Arc::new(Fixed(true)));
        agent.start().await.unwrap();

        let outcome = agent.process(event_for(curve), Screening::Admitted).await;
        assert_eq!(outcome, ProcessOutcome::Traded(-0.5));
        assert!((agent.status().paper_balance_sol.unwrap() - 0.98).abs() < 1e-9);
        assert!(!agent.session().is_halted());
    }

    #[tokio::test(start_paused = true)]
    async fn total_stop_loss_halts_session() {
        let (rpc, curve) = scripted(vec![curve_at(30_000), curve_at(15_000)]);
        let agent = agent(trading(TradeMode::Paper, 100.0), rpc, Arc::new(Fixed(true)));
        agent.start().await.unwrap();

        agent.process(event_for(curve), Screening::Admitted).await;
        assert!(agent.session().is_halted());
        assert!(!agent.session().is_ready());

        let next = agent.process(event_for(curve), Screening::Admitted).await;
        assert_eq!(next, ProcessOutcome::Skipped("session halted"));
    }

    #[tokio::test]
    async fn live_cycle_buys_then_sells_everything() {
        let rpc = Arc::new(FakeRpc::default());
        *rpc.lamports.lock() = 10 * LAMPORTS_PER_SOL;
        let curve = Pubkey::new_unique();
        rpc.set_account(curve, curve_at(30_000));

        let mut config = trading(TradeMode::Live, 4.0);
        config.hold_duration_secs = 0;
        let agent = agent(config, rpc.clone(), Arc::new(Fixed(true)));
        agent.start().await.unwrap();

        let outcome = agent.process(event_for(curve), Screening::Admitted).await;
        assert_eq!(outcome, ProcessOutcome::Traded(0.0));
        assert_eq!(rpc.sent_count(), 2);
        assert!(agent.executor.holdings().await.is_empty());
        assert!(!agent.session().trade_in_flight());
    }

    #[tokio::test]
    async fn failed_buy_releases_the_slot() {
        let rpc = Arc::new(FakeRpc::default());
        *rpc.lamports.lock() = 10 * LAMPORTS_PER_SOL;
        let curve = Pubkey::new_unique();
        rpc.set_account(curve, curve_at(30_000));
        rpc.fail_sends(true);

        let agent = agent(trading(TradeMode::Live, 4.0), rpc.clone(), Arc::new(Fixed(true)));
        agent.start().await.unwrap();

        let outcome = agent.process(event_for(curve), Screening::Admitted).await;
        assert!(matches!(outcome, ProcessOutcome::Failed(_)));
        assert!(!agent.session().trade_in_flight());
        assert_eq!(agent.status().trades_failed, 1);
    }

    #[tokio::test]
    async fn declined_events_never_trade() {
        let rpc = Arc::new(FakeRpc::default());
        let curve = Pubkey::new_unique();
        rpc.set_account(curve, curve_at(30_000));
        let agent = agent(trading(TradeMode::Paper, 4.0), rpc.clone(), Arc::new(RejectAll));
        agent.start().await.unwrap();

        let outcome = agent.process(event_for(curve), Screening::Admitted).await;
        assert_eq!(outcome, ProcessOutcome::Skipped("classifier declined"));
        assert_eq!(agent.status().admitted, 0);
    }

    #[tokio::test]
    async fn malformed_addresses_fail_before_evaluation() {
        let rpc = Arc::new(FakeRpc::default());
        let agent = agent(trading(TradeMode::Paper, 4.0), rpc, Arc::new(Fixed(true)));
        let event = NewTokenEvent {
            mint: "not-a-key".into(),
            bonding_curve_key: "nope".into(),
            market_cap_sol: 1.0,
            ..NewTokenEvent::default()
        };
        assert!(matches!(agent.process(event, Screening::Admitted).await, ProcessOutcome::Failed(_)));
        assert_eq!(agent.status().evaluated, 0);
    }

    #[tokio::test]
    async fn events_before_start_are_rejected() {
        let rpc = Arc::new(FakeRpc::default());
        let agent = Arc::new(agent(trading(TradeMode::Paper, 4.0), rpc, Arc::new(Fixed(true))));

        agent.on_event(event_for(Pubkey::new_unique()));
        let status = agent.status();
        assert_eq!(status.discovered, 1);
        assert_eq!(status.rejected, 1);
        assert_eq!(status.tracked_mints, 0);
    }
}
