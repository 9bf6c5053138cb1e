//! Trading bot orchestrator
//!
//! Owns the lifecycle, wires collaborators through the initializer, runs the
//! five control loops under the task supervisor, and tears everything down
//! on shutdown with a final snapshot.

pub mod initializer;
pub(crate) mod loops;
pub mod status;
pub(crate) mod updates;

use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::adapters::ComponentFactory;
use crate::config::AppConfig;
use crate::coordination::{
    CircuitBreaker, CircuitBreakerConfig, DailyResetGate, LifecycleState, ShutdownController,
    ShutdownReason, ShutdownToken,
};
use crate::domain::{DataType, MarketUpdate};
use crate::error::{Result, VigilError};
use crate::persistence::{PersistedSnapshot, SnapshotStore};
use crate::supervisor::{LiveUnits, TaskSupervisor};

pub use initializer::Components;
pub use status::{ConfigSummary, StatusReport, StatusRegister, StatusSnapshot, TradingTotals};

use status::RECENT_ERRORS;

/// Close reason used when the drawdown breaker liquidates
pub const DRAWDOWN_REASON: &str = "drawdown protection";

/// Run `fut` with an upper bound; expiry becomes [`VigilError::Timeout`]
pub async fn bounded<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(VigilError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

pub(crate) struct BotInner {
    pub(crate) config: AppConfig,
    pub(crate) paper_trading: bool,
    pub(crate) status: Arc<StatusRegister>,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) daily_gate: DailyResetGate,
    factory: Arc<dyn ComponentFactory>,
    components: RwLock<Option<Components>>,
    shutdown: Arc<ShutdownController>,
    live: LiveUnits,
    store: SnapshotStore,
}

impl BotInner {
    fn components(&self) -> Option<Components> {
        self.components
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// RUNNING -> PAUSED. Returns false when trading was not running (a
    /// repeated breach); nothing is liquidated in that case.
    pub(crate) async fn pause(&self, reason: &str) -> Result<bool> {
        if !self
            .status
            .transition_from(LifecycleState::Running, LifecycleState::Paused)?
        {
            return Ok(false);
        }
        warn!(reason, "trading paused");

        if self.config.close_on_pause {
            if let Some(c) = self.components() {
                self.liquidate(&c, reason).await?;
            }
        }
        Ok(true)
    }

    /// Close every open position. Safe to repeat on an empty book.
    pub(crate) async fn liquidate(&self, c: &Components, reason: &str) -> Result<usize> {
        let closed = bounded(
            "close all positions",
            self.config.loops.call_timeout(),
            c.pairs.close_all_positions(reason),
        )
        .await?;
        warn!(closed, reason, "positions closed");
        self.status.set_open_positions(c.pairs.positions().len());
        Ok(closed)
    }

    fn build_snapshot(&self, c: Option<&Components>) -> PersistedSnapshot {
        let status = self.status.snapshot();
        PersistedSnapshot {
            timestamp: Utc::now(),
            state: status.state,
            total_trades: status.total_trades,
            open_positions: status.open_positions,
            total_pnl: status.total_pnl,
            daily_pnl: status.daily_pnl,
            positions: c.map(|c| c.pairs.positions()).unwrap_or_default(),
            errors: self.status.recent_errors(RECENT_ERRORS),
        }
    }

    pub(crate) async fn persist(&self, c: &Components) -> Result<()> {
        self.store.save(&self.build_snapshot(Some(c))).await
    }

    /// Final snapshot, then feed and exchange release. Every step runs;
    /// the first failure is returned.
    async fn teardown(&self) -> Result<()> {
        let limit = self.config.loops.call_timeout();
        let components = self.components();
        let mut first_failure = None;

        if let Err(e) = self.store.save(&self.build_snapshot(components.as_ref())).await {
            error!(error = %e, "final snapshot failed");
            first_failure.get_or_insert(e);
        }

        if let Some(c) = components {
            if let Err(e) = bounded("feed disconnect", limit, c.feed.disconnect()).await {
                error!(error = %e, "market feed disconnect failed");
                first_failure.get_or_insert(e);
            }
            if let Err(e) = bounded("exchange close", limit, c.exchange.close()).await {
                error!(error = %e, "exchange close failed");
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Handle to the bot. Clones share the same instance.
#[derive(Clone)]
pub struct TradingBot {
    inner: Arc<BotInner>,
}

impl TradingBot {
    /// Validate `config` and build an uninitialized bot in INITIALIZING
    pub fn new(
        config: AppConfig,
        factory: Arc<dyn ComponentFactory>,
        paper_trading: bool,
    ) -> Result<Self> {
        config
            .validate(paper_trading)
            .map_err(VigilError::InvalidConfig)?;

        info!(
            exchange = %config.exchange.name,
            pairs = config.trading.pairs.len(),
            paper_trading,
            "trading bot created"
        );

        let store = SnapshotStore::new(&config.persistence.state_file);
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::from(&config.risk_management));
        Ok(Self {
            inner: Arc::new(BotInner {
                config,
                paper_trading,
                status: Arc::new(StatusRegister::new()),
                breaker,
                daily_gate: DailyResetGate::new(),
                factory,
                components: RwLock::new(None),
                shutdown: Arc::new(ShutdownController::new()),
                live: LiveUnits::default(),
                store,
            }),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.status.state()
    }

    pub fn paper_trading(&self) -> bool {
        self.inner.paper_trading
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn status_register(&self) -> Arc<StatusRegister> {
        self.inner.status.clone()
    }

    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.inner.shutdown.clone()
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.inner.shutdown.token()
    }

    pub fn live_units(&self) -> Vec<String> {
        self.inner.live.names()
    }

    pub fn components(&self) -> Option<Components> {
        self.inner.components()
    }

    /// Wire every collaborator. INITIALIZING -> STOPPED on success,
    /// INITIALIZING -> ERROR (with the failure recorded) otherwise.
    pub async fn initialize(&self) -> Result<()> {
        let bot = &self.inner;
        let state = bot.status.state();
        if state != LifecycleState::Initializing {
            return Err(VigilError::InvalidStateTransition {
                from: state.to_string(),
                to: LifecycleState::Stopped.to_string(),
            });
        }
        info!(paper_trading = bot.paper_trading, "initializing trading bot");

        match initializer::initialize_components(
            bot.factory.as_ref(),
            &bot.config,
            bot.paper_trading,
            bot.status.clone(),
        )
        .await
        {
            Ok(components) => {
                *bot.components.write().unwrap_or_else(|e| e.into_inner()) = Some(components);
                bot.status.transition(LifecycleState::Stopped)?;
                info!("trading bot initialized");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "initialization failed");
                bot.status.record_error(e.to_string());
                bot.status.transition(LifecycleState::Error)?;
                Err(e)
            }
        }
    }

    /// Run the bot: STOPPED/ERROR -> RUNNING, then supervise the five loops
    /// until shutdown and finish the teardown. From any other state this is
    /// a logged no-op.
    pub async fn start(&self) -> Result<()> {
        let bot = &self.inner;
        let state = bot.status.state();
        if !state.can_start() {
            warn!(%state, "cannot start from current state");
            return Ok(());
        }
        let Some(components) = bot.components() else {
            warn!(%state, "cannot start without initialized components");
            return Err(VigilError::Internal(
                "start requires a successful initialize".to_string(),
            ));
        };

        // A request that arrived before start is honoured; only a finished
        // shutdown from an earlier run is cleared
        if bot.shutdown.is_complete() {
            bot.shutdown.rearm();
        }
        bot.status.transition(LifecycleState::Running)?;
        bot.status.mark_started();
        info!("trading bot started");

        let mut supervisor = TaskSupervisor::new(bot.status.clone(), bot.live.clone());
        supervisor.spawn(
            loops::MARKET_SCANNER,
            loops::market_scanner(bot.clone(), components.clone(), bot.shutdown.token()),
        );
        supervisor.spawn(
            loops::STRATEGY,
            loops::strategy(bot.clone(), components.clone(), bot.shutdown.token()),
        );
        supervisor.spawn(
            loops::RISK_MONITOR,
            loops::risk_monitor(bot.clone(), components.clone(), bot.shutdown.token()),
        );
        supervisor.spawn(
            loops::PERFORMANCE,
            loops::performance_tracker(bot.clone(), components.clone(), bot.shutdown.token()),
        );
        supervisor.spawn(
            loops::HEALTH_CHECK,
            loops::health_check(bot.clone(), components, bot.shutdown.token()),
        );

        match supervisor.join_all().await {
            Ok(outcomes) => {
                info!(units = outcomes.len(), "all loops finished");
                self.shutdown_with(ShutdownReason::LoopsFinished).await
            }
            Err(e) => {
                error!(error = %e, "task group failed");
                bot.status.record_error(e.to_string());
                bot.shutdown.request(ShutdownReason::LoopsFinished);
                bot.shutdown.claim_teardown();
                supervisor.abort_all();
                bot.status.transition(LifecycleState::Error)?;
                bot.shutdown.complete();
                Err(e)
            }
        }
    }

    /// RUNNING -> PAUSED, liquidating if `close_on_pause` is set. Returns
    /// false when trading was not running.
    pub async fn pause(&self, reason: &str) -> Result<bool> {
        self.inner.pause(reason).await
    }

    /// Ordered teardown: STOPPING, final snapshot, feed disconnect,
    /// exchange close, STOPPED (or ERROR if any step failed), completion.
    /// A call made while another shutdown is in progress waits for it.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with(ShutdownReason::Requested).await
    }

    async fn shutdown_with(&self, reason: ShutdownReason) -> Result<()> {
        let bot = &self.inner;
        let mut token = bot.shutdown.token();

        // One caller per run owns the teardown; the rest wait for it, which
        // returns at once when it already finished
        if !bot.shutdown.claim_teardown() {
            info!("shutdown already claimed, waiting for completion");
            token.completed().await;
            return Ok(());
        }
        if let Err(e) = bot.status.transition(LifecycleState::Stopping) {
            error!(error = %e, "cannot enter shutdown");
            bot.shutdown.complete();
            return Err(e);
        }

        info!(%reason, "shutting down trading bot");
        if !bot.shutdown.is_requested() {
            bot.shutdown.request(reason);
        }

        let outcome = bot.teardown().await;
        let final_state = match &outcome {
            Ok(()) => LifecycleState::Stopped,
            Err(e) => {
                bot.status.record_error(format!("shutdown: {e}"));
                LifecycleState::Error
            }
        };
        if let Err(e) = bot.status.transition(final_state) {
            warn!(error = %e, "unexpected state at end of shutdown");
        }
        info!(state = %final_state, "trading bot stopped");
        bot.shutdown.complete();
        outcome
    }

    /// Snapshot of the bot for operators
    pub fn status(&self) -> StatusReport {
        let bot = &self.inner;
        let snapshot = bot.status.snapshot();
        let components = bot.components();

        let now = Utc::now();
        let uptime_secs = snapshot
            .start_time
            .map(|t| (now - t).num_seconds().max(0))
            .unwrap_or(0);
        let errors = bot.status.recent_errors(RECENT_ERRORS);

        StatusReport {
            state: snapshot.state,
            uptime_secs,
            start_time: snapshot.start_time,
            last_update: snapshot.last_update,
            paper_trading: bot.paper_trading,
            trading: TradingTotals {
                total_trades: snapshot.total_trades,
                open_positions: snapshot.open_positions,
                total_pnl: snapshot.total_pnl,
                daily_pnl: snapshot.daily_pnl,
            },
            performance: components
                .as_ref()
                .map(|c| c.pairs.performance_summary())
                .unwrap_or_default(),
            websocket: components.as_ref().map(|c| c.feed.metrics()),
            errors,
            metrics: snapshot.metrics,
            live_units: bot.live.names(),
            config: ConfigSummary {
                exchange: bot.config.exchange.name.clone(),
                pairs: components
                    .as_ref()
                    .map(|c| c.pairs.tracked_symbols().len())
                    .unwrap_or(0),
                strategy: bot.config.strategy.name.clone(),
            },
        }
    }

    /// Feed callback entry point
    pub fn handle_market_update(&self, update: MarketUpdate) {
        if let Some(c) = self.inner.components() {
            updates::route_market_update(&self.inner.status, c.market_data.as_ref(), update);
        }
    }

    /// Add `symbol` to monitoring at runtime: load its market data,
    /// subscribe ticker and trade updates, attach a strategy. Failures are
    /// logged and recorded, never returned. Returns whether it was added.
    pub async fn watch_symbol(&self, symbol: &str) -> bool {
        let bot = &self.inner;
        let Some(c) = bot.components() else {
            warn!(symbol, "cannot watch symbol before initialization");
            return false;
        };
        if c.pairs.tracked_symbols().iter().any(|s| s == symbol) {
            return false;
        }

        let added = async {
            bounded(
                "market data initialize",
                bot.config.loops.call_timeout(),
                c.market_data.initialize(vec![symbol.to_string()]),
            )
            .await?;

            let status = bot.status.clone();
            let market_data = c.market_data.clone();
            c.feed.subscribe(
                symbol,
                vec![DataType::Ticker, DataType::Trades],
                Arc::new(move |update| {
                    updates::route_market_update(&status, market_data.as_ref(), update)
                }),
            )?;
            Ok::<_, VigilError>(c.pairs.track_symbol(symbol))
        }
        .await;

        match added {
            Ok(added) => {
                info!(symbol, added, "symbol under watch");
                added
            }
            Err(e) => {
                error!(symbol, error = %e, "failed to watch symbol");
                bot.status.record_error(format!("watch {symbol}: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ExchangeConnector, PaperComponents};
    use rust_decimal_macros::dec;

    fn config(tag: &str) -> AppConfig {
        let mut config = AppConfig::default_config(&["BTC/USDT"]);
        config.persistence.state_file = std::env::temp_dir()
            .join(format!("vigil-bot-{tag}-{}", uuid::Uuid::new_v4()))
            .join("bot_state.json")
            .to_string_lossy()
            .into_owned();
        config
    }

    fn bot(config: AppConfig) -> (TradingBot, Arc<PaperComponents>) {
        let factory = Arc::new(PaperComponents::new());
        let bot = TradingBot::new(config, factory.clone(), true).unwrap();
        (bot, factory)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = AppConfig::default_config(&[]);
        config.trading.initial_balance = dec!(0);
        let err = TradingBot::new(config, Arc::new(PaperComponents::new()), true)
            .err()
            .unwrap();
        assert!(matches!(err, VigilError::InvalidConfig(ref msgs) if msgs.len() >= 2));
    }

    #[tokio::test]
    async fn test_initialize_twice_is_rejected() {
        let (bot, _) = bot(config("init-twice"));
        bot.initialize().await.unwrap();
        assert_eq!(bot.state(), LifecycleState::Stopped);
        assert!(bot.initialize().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_initialize_records_error() {
        let factory = Arc::new(PaperComponents::new().with_exchange_refusing());
        let bot = TradingBot::new(config("init-fail"), factory, true).unwrap();

        assert!(bot.initialize().await.is_err());
        assert_eq!(bot.state(), LifecycleState::Error);
        assert_eq!(
            bot.status().errors,
            vec!["initialization failed at connect exchange: connection refused".to_string()]
        );
    }

    #[tokio::test]
    async fn test_start_is_noop_outside_stopped_or_error() {
        let (bot, _) = bot(config("start-noop"));
        bot.start().await.unwrap();
        assert_eq!(bot.state(), LifecycleState::Initializing);
    }

    #[tokio::test]
    async fn test_pause_only_from_running() {
        let (bot, _) = bot(config("pause"));
        bot.initialize().await.unwrap();
        assert!(!bot.pause("test").await.unwrap());
        assert_eq!(bot.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let cfg = config("shutdown-idle");
        let path = std::path::PathBuf::from(&cfg.persistence.state_file);
        let (bot, factory) = bot(cfg);
        bot.initialize().await.unwrap();

        bot.shutdown().await.unwrap();
        assert_eq!(bot.state(), LifecycleState::Stopped);
        assert!(path.exists());
        assert!(!factory.exchange_handle().unwrap().is_connected());

        // Already complete: a second call does nothing
        bot.shutdown().await.unwrap();
        assert_eq!(factory.exchange_handle().unwrap().close_calls(), 1);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_watch_symbol() {
        let (bot, factory) = bot(config("watch"));
        bot.initialize().await.unwrap();

        assert!(bot.watch_symbol("SOL/USDT").await);
        assert!(!bot.watch_symbol("SOL/USDT").await);
        assert_eq!(factory.feed_handle().unwrap().subscription_count("SOL/USDT"), 1);
        assert_eq!(bot.status().config.pairs, 2);
    }

    #[tokio::test]
    async fn test_watch_symbol_before_initialize() {
        let (bot, _) = bot(config("watch-early"));
        assert!(!bot.watch_symbol("SOL/USDT").await);
    }
}
