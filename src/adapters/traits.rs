//! Collaborator interfaces consumed by the orchestrator.
//!
//! Exchange protocol, market-data parsing, risk math, pair selection and
//! strategy evaluation all live behind these traits. The orchestrator only
//! sequences calls, bounds them in time, and contains their failures.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, Credentials, ExchangeConfig, RiskManagementConfig, TradingConfig};
use crate::domain::{
    DataType, FeedMetrics, OrderBook, PairPerformance, PerformanceSummary, Position,
    RiskSnapshot, Signal, Ticker, UpdateCallback,
};
use crate::error::Result;

/// Exchange connection used for order placement and account access
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Open (or reopen) the connection. `Ok(false)` is a refused handshake.
    async fn connect(&self, credentials: Credentials) -> Result<bool>;

    /// Liveness probe
    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Streaming market-data feed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn connect(&self) -> Result<bool>;

    async fn disconnect(&self) -> Result<()>;

    /// Route updates of `data_types` for `symbol` to `callback`
    fn subscribe(&self, symbol: &str, data_types: Vec<DataType>, callback: UpdateCallback)
        -> Result<()>;

    /// Latest ticker seen on the stream, if any
    fn ticker(&self, symbol: &str) -> Option<Ticker>;

    fn metrics(&self) -> FeedMetrics;
}

/// Risk engine. Its counters are mutated only through its own API.
#[cfg_attr(test, mockall::automock)]
pub trait RiskEngine: Send + Sync {
    fn risk_snapshot(&self, capital: Decimal) -> Result<RiskSnapshot>;

    /// New stop for `position` at `price`, or `None` when the stop must not move
    fn update_trailing_stop(&self, position: &Position, price: Decimal) -> Option<Decimal>;

    fn reset_daily_counters(&self);
}

/// Market-data manager holding snapshots and caches for tracked symbols
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataManager: Send + Sync {
    async fn initialize(&self, symbols: Vec<String>) -> Result<()>;

    /// Refresh snapshots for every tracked symbol
    async fn update_all(&self) -> Result<()>;

    /// Raw ticker cache write, fed from the stream
    fn cache_ticker(&self, ticker: Ticker);

    /// Order-book update hook, fed from the stream
    fn apply_orderbook(&self, symbol: &str, book: OrderBook);

    fn cached_ticker(&self, symbol: &str) -> Option<Ticker>;

    fn cached_tickers(&self) -> Vec<Ticker>;
}

/// Dynamic symbol selection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatchlistScanner: Send + Sync {
    /// Recompute and return the watchlist
    async fn update_watchlist(&self) -> Result<Vec<String>>;

    fn watchlist(&self) -> Vec<String>;
}

/// Multi-pair strategy host. Sole owner and mutator of open positions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairManager: Send + Sync {
    async fn update_market_data(&self) -> Result<()>;

    async fn check_signals(&self) -> Result<Vec<Signal>>;

    async fn execute_signals(&self, signals: Vec<Signal>) -> Result<()>;

    fn positions(&self) -> Vec<Position>;

    /// Move the stop of the open position on `symbol`
    fn set_stop_loss(&self, symbol: &str, stop: Decimal);

    fn performance(&self) -> HashMap<String, PairPerformance>;

    fn performance_summary(&self) -> PerformanceSummary;

    /// Close every open position; returns how many were closed. Must be a
    /// no-op on an empty book.
    async fn close_all_positions(&self, reason: &str) -> Result<usize>;

    /// Start hosting a strategy for `symbol`; false if already tracked
    fn track_symbol(&self, symbol: &str) -> bool;

    fn tracked_symbols(&self) -> Vec<String>;
}

/// Constructs the collaborators in the order the initializer asks for them.
/// Connection is done by the initializer, not the factory.
pub trait ComponentFactory: Send + Sync {
    fn exchange(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeConnector>>;

    fn market_feed(&self, config: &ExchangeConfig) -> Result<Arc<dyn MarketFeed>>;

    fn risk_engine(&self, config: &RiskManagementConfig) -> Result<Arc<dyn RiskEngine>>;

    fn market_data(
        &self,
        exchange: Arc<dyn ExchangeConnector>,
    ) -> Result<Arc<dyn MarketDataManager>>;

    fn watchlist_scanner(
        &self,
        trading: &TradingConfig,
        market_data: Arc<dyn MarketDataManager>,
    ) -> Result<Arc<dyn WatchlistScanner>>;

    fn pair_manager(
        &self,
        exchange: Arc<dyn ExchangeConnector>,
        market_data: Arc<dyn MarketDataManager>,
        config: &AppConfig,
        paper_trading: bool,
    ) -> Result<Arc<dyn PairManager>>;
}
