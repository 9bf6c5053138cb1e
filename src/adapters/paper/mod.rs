//! Paper-trading collaborators.
//!
//! Everything here runs in-process: no orders leave the machine. The binary
//! wires these up for `vigil run`, and the test suites drive them through
//! their knobs (refused handshakes, dropped connections, forced risk).

mod exchange;
mod feed;
mod market_data;
mod pairs;
mod risk;
mod scanner;

pub use exchange::PaperExchange;
pub use feed::SimulatedFeed;
pub use market_data::PaperMarketData;
pub use pairs::PaperPairManager;
pub use risk::PaperRiskEngine;
pub use scanner::VolumeWatchlist;

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, RwLock};

use crate::adapters::traits::{
    ComponentFactory, ExchangeConnector, MarketDataManager, MarketFeed, PairManager, RiskEngine,
    WatchlistScanner,
};
use crate::config::{AppConfig, ExchangeConfig, RiskManagementConfig, TradingConfig};
use crate::error::{Result, VigilError};

/// Realized PnL shared by the paper pair manager and risk engine
#[derive(Debug, Default)]
pub struct PaperLedger {
    inner: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    realized: Decimal,
    day_start: Decimal,
}

impl PaperLedger {
    pub fn record(&self, pnl: Decimal) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).realized += pnl;
    }

    pub fn realized(&self) -> Decimal {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).realized
    }

    /// Realized PnL at the last daily reset
    pub fn day_start(&self) -> Decimal {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).day_start
    }

    pub fn mark_day_start(&self) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.day_start = state.realized;
    }
}

#[derive(Default)]
struct Built {
    exchange: Option<Arc<PaperExchange>>,
    feed: Option<Arc<SimulatedFeed>>,
    risk: Option<Arc<PaperRiskEngine>>,
    market_data: Option<Arc<PaperMarketData>>,
    pairs: Option<Arc<PaperPairManager>>,
}

/// Factory for the paper stack. Keeps a handle on each component it builds
/// so callers can inject market data or simulate faults afterwards.
#[derive(Default)]
pub struct PaperComponents {
    ledger: Arc<PaperLedger>,
    refuse_exchange: bool,
    refuse_feed: bool,
    built: RwLock<Built>,
}

impl PaperComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exchange handshakes will be refused
    pub fn with_exchange_refusing(mut self) -> Self {
        self.refuse_exchange = true;
        self
    }

    /// Feed handshakes will be refused
    pub fn with_feed_refusing(mut self) -> Self {
        self.refuse_feed = true;
        self
    }

    pub fn ledger(&self) -> Arc<PaperLedger> {
        self.ledger.clone()
    }

    pub fn exchange_handle(&self) -> Option<Arc<PaperExchange>> {
        self.built.read().unwrap_or_else(|e| e.into_inner()).exchange.clone()
    }

    pub fn feed_handle(&self) -> Option<Arc<SimulatedFeed>> {
        self.built.read().unwrap_or_else(|e| e.into_inner()).feed.clone()
    }

    pub fn risk_handle(&self) -> Option<Arc<PaperRiskEngine>> {
        self.built.read().unwrap_or_else(|e| e.into_inner()).risk.clone()
    }

    pub fn market_data_handle(&self) -> Option<Arc<PaperMarketData>> {
        self.built.read().unwrap_or_else(|e| e.into_inner()).market_data.clone()
    }

    pub fn pairs_handle(&self) -> Option<Arc<PaperPairManager>> {
        self.built.read().unwrap_or_else(|e| e.into_inner()).pairs.clone()
    }

    fn built(&self) -> std::sync::RwLockWriteGuard<'_, Built> {
        self.built.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ComponentFactory for PaperComponents {
    fn exchange(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeConnector>> {
        let exchange = Arc::new(PaperExchange::new(&config.name, config.testnet));
        exchange.set_refuse_connect(self.refuse_exchange);
        self.built().exchange = Some(exchange.clone());
        Ok(exchange)
    }

    fn market_feed(&self, _config: &ExchangeConfig) -> Result<Arc<dyn MarketFeed>> {
        let feed = Arc::new(SimulatedFeed::new());
        feed.set_refuse_connect(self.refuse_feed);
        self.built().feed = Some(feed.clone());
        Ok(feed)
    }

    fn risk_engine(&self, config: &RiskManagementConfig) -> Result<Arc<dyn RiskEngine>> {
        let risk = Arc::new(PaperRiskEngine::new(
            self.ledger.clone(),
            config.trailing_stop_pct,
        ));
        self.built().risk = Some(risk.clone());
        Ok(risk)
    }

    fn market_data(
        &self,
        exchange: Arc<dyn ExchangeConnector>,
    ) -> Result<Arc<dyn MarketDataManager>> {
        let data = Arc::new(PaperMarketData::new(exchange));
        self.built().market_data = Some(data.clone());
        Ok(data)
    }

    fn watchlist_scanner(
        &self,
        trading: &TradingConfig,
        market_data: Arc<dyn MarketDataManager>,
    ) -> Result<Arc<dyn WatchlistScanner>> {
        Ok(Arc::new(VolumeWatchlist::new(trading, market_data)))
    }

    fn pair_manager(
        &self,
        exchange: Arc<dyn ExchangeConnector>,
        market_data: Arc<dyn MarketDataManager>,
        config: &AppConfig,
        paper_trading: bool,
    ) -> Result<Arc<dyn PairManager>> {
        if !paper_trading {
            return Err(VigilError::PairManager(
                "paper components cannot host a live pair manager".to_string(),
            ));
        }
        let pairs = Arc::new(PaperPairManager::new(
            exchange,
            market_data,
            self.ledger.clone(),
            &config.strategy.name,
        ));
        self.built().pairs = Some(pairs.clone());
        Ok(pairs)
    }
}
