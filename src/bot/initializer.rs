//! Ordered bring-up of the collaborators.
//!
//! connect exchange -> connect market feed -> risk engine -> market data
//! (initial symbols) -> watchlist scanner -> pair manager -> feed
//! subscriptions. The first failing step aborts the sequence; connections
//! opened by earlier steps are released before the error is returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bounded;
use super::updates::route_market_update;
use crate::adapters::{
    ComponentFactory, ExchangeConnector, MarketDataManager, MarketFeed, PairManager, RiskEngine,
    WatchlistScanner,
};
use crate::bot::status::StatusRegister;
use crate::config::AppConfig;
use crate::domain::{DataType, UpdateCallback};
use crate::error::{Result, VigilError};

pub(crate) const STEP_EXCHANGE: &str = "connect exchange";
pub(crate) const STEP_FEED: &str = "connect market feed";
pub(crate) const STEP_RISK: &str = "construct risk engine";
pub(crate) const STEP_MARKET_DATA: &str = "load market data";
pub(crate) const STEP_SCANNER: &str = "construct watchlist scanner";
pub(crate) const STEP_PAIRS: &str = "construct pair manager";
pub(crate) const STEP_SUBSCRIBE: &str = "subscribe market feed";

/// Every collaborator the orchestrator drives
#[derive(Clone)]
pub struct Components {
    pub exchange: Arc<dyn ExchangeConnector>,
    pub feed: Arc<dyn MarketFeed>,
    pub risk: Arc<dyn RiskEngine>,
    pub market_data: Arc<dyn MarketDataManager>,
    pub scanner: Arc<dyn WatchlistScanner>,
    pub pairs: Arc<dyn PairManager>,
}

/// Connections opened so far, released on abort
#[derive(Default)]
struct Acquired {
    exchange: Option<Arc<dyn ExchangeConnector>>,
    feed: Option<Arc<dyn MarketFeed>>,
}

impl Acquired {
    async fn release(self, limit: Duration) {
        if let Some(feed) = self.feed {
            if let Err(e) = bounded("feed disconnect", limit, feed.disconnect()).await {
                warn!(error = %e, "failed to release market feed");
            }
        }
        if let Some(exchange) = self.exchange {
            if let Err(e) = bounded("exchange close", limit, exchange.close()).await {
                warn!(error = %e, "failed to release exchange");
            }
        }
    }
}

fn step_failed(step: &str, reason: impl std::fmt::Display) -> VigilError {
    VigilError::Initialization {
        step: step.to_string(),
        reason: reason.to_string(),
    }
}

async fn step<T>(
    name: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    debug!(step = name, "initialization step");
    bounded(name, limit, fut).await.map_err(|e| step_failed(name, e))
}

async fn connect_step(
    name: &str,
    limit: Duration,
    fut: impl Future<Output = Result<bool>>,
) -> Result<()> {
    if step(name, limit, fut).await? {
        Ok(())
    } else {
        Err(step_failed(name, "connection refused"))
    }
}

pub(crate) async fn initialize_components(
    factory: &dyn ComponentFactory,
    config: &AppConfig,
    paper_trading: bool,
    status: Arc<StatusRegister>,
) -> Result<Components> {
    let limit = config.loops.call_timeout();
    let mut acquired = Acquired::default();

    match run_steps(factory, config, paper_trading, status, &mut acquired).await {
        Ok(components) => Ok(components),
        Err(e) => {
            acquired.release(limit).await;
            Err(e)
        }
    }
}

async fn run_steps(
    factory: &dyn ComponentFactory,
    config: &AppConfig,
    paper_trading: bool,
    status: Arc<StatusRegister>,
    acquired: &mut Acquired,
) -> Result<Components> {
    let limit = config.loops.call_timeout();

    let exchange = factory
        .exchange(&config.exchange)
        .map_err(|e| step_failed(STEP_EXCHANGE, e))?;
    if config.exchange.skip_connection {
        info!(exchange = %config.exchange.name, "exchange handshake skipped");
    } else {
        let credentials = config.exchange.credentials();
        connect_step(STEP_EXCHANGE, limit, exchange.connect(credentials)).await?;
        acquired.exchange = Some(exchange.clone());
        info!(exchange = %config.exchange.name, testnet = config.exchange.testnet, "exchange connected");
    }

    let feed = factory
        .market_feed(&config.exchange)
        .map_err(|e| step_failed(STEP_FEED, e))?;
    connect_step(STEP_FEED, limit, feed.connect()).await?;
    acquired.feed = Some(feed.clone());
    info!("market feed connected");

    let risk = factory
        .risk_engine(&config.risk_management)
        .map_err(|e| step_failed(STEP_RISK, e))?;

    let market_data = factory
        .market_data(exchange.clone())
        .map_err(|e| step_failed(STEP_MARKET_DATA, e))?;
    step(
        STEP_MARKET_DATA,
        limit,
        market_data.initialize(config.trading.pairs.clone()),
    )
    .await?;

    let scanner = factory
        .watchlist_scanner(&config.trading, market_data.clone())
        .map_err(|e| step_failed(STEP_SCANNER, e))?;

    let pairs = factory
        .pair_manager(exchange.clone(), market_data.clone(), config, paper_trading)
        .map_err(|e| step_failed(STEP_PAIRS, e))?;
    for symbol in &config.trading.pairs {
        pairs.track_symbol(symbol);
    }

    let callback: UpdateCallback = {
        let status = status.clone();
        let market_data = market_data.clone();
        Arc::new(move |update| route_market_update(&status, market_data.as_ref(), update))
    };
    for symbol in &config.trading.pairs {
        feed.subscribe(symbol, DataType::ALL.to_vec(), callback.clone())
            .map_err(|e| step_failed(STEP_SUBSCRIBE, e))?;
    }
    info!(pairs = config.trading.pairs.len(), "market feed subscriptions registered");

    Ok(Components {
        exchange,
        feed,
        risk,
        market_data,
        scanner,
        pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PaperComponents;

    #[tokio::test]
    async fn test_runs_every_step() {
        let factory = PaperComponents::new();
        let config = AppConfig::default_config(&["BTC/USDT", "ETH/USDT"]);
        let status = Arc::new(StatusRegister::new());

        let components = initialize_components(&factory, &config, true, status)
            .await
            .unwrap();
        assert!(components.exchange.is_connected());
        assert!(components.feed.metrics().connected);
        assert_eq!(components.pairs.tracked_symbols().len(), 2);

        let feed = factory.feed_handle().unwrap();
        assert_eq!(feed.subscription_count("BTC/USDT"), 1);
        assert_eq!(feed.subscription_count("ETH/USDT"), 1);
    }

    #[tokio::test]
    async fn test_refused_feed_releases_exchange() {
        let factory = PaperComponents::new().with_feed_refusing();
        let config = AppConfig::default_config(&["BTC/USDT"]);
        let status = Arc::new(StatusRegister::new());

        let err = initialize_components(&factory, &config, true, status)
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "initialization failed at connect market feed: connection refused"
        );

        let exchange = factory.exchange_handle().unwrap();
        assert!(!exchange.is_connected());
        assert_eq!(exchange.close_calls(), 1);
        assert!(factory.risk_handle().is_none());
    }

    #[tokio::test]
    async fn test_live_pair_manager_failure_releases_both() {
        let factory = PaperComponents::new();
        let config = AppConfig::default_config(&["BTC/USDT"]);
        let status = Arc::new(StatusRegister::new());

        let err = initialize_components(&factory, &config, false, status)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VigilError::Initialization { ref step, .. } if step == STEP_PAIRS));
        assert!(!factory.feed_handle().unwrap().metrics().connected);
        assert_eq!(factory.exchange_handle().unwrap().close_calls(), 1);
    }

    #[tokio::test]
    async fn test_refused_exchange_stops_before_feed() {
        let factory = PaperComponents::new().with_exchange_refusing();
        let config = AppConfig::default_config(&["BTC/USDT"]);
        let status = Arc::new(StatusRegister::new());

        let err = initialize_components(&factory, &config, true, status)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("initialization failed at connect exchange"));
        assert!(factory.feed_handle().is_none());
        assert_eq!(factory.exchange_handle().unwrap().close_calls(), 0);
    }
}
