use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::PaperLedger;
use crate::adapters::traits::{ExchangeConnector, MarketDataManager, PairManager};
use crate::domain::{PairPerformance, PerformanceSummary, Position, Signal, SignalAction};
use crate::error::{Result, VigilError};

/// Paper strategy host. Signals come from an internal queue that callers
/// (or a strategy adapter) feed through [`PaperPairManager::queue_signal`];
/// fills happen at the signal price.
pub struct PaperPairManager {
    exchange: Arc<dyn ExchangeConnector>,
    market_data: Arc<dyn MarketDataManager>,
    ledger: Arc<PaperLedger>,
    strategy: String,
    tracked: RwLock<BTreeSet<String>>,
    positions: RwLock<HashMap<String, Position>>,
    performance: RwLock<HashMap<String, PairPerformance>>,
    pending: Mutex<VecDeque<Signal>>,
}

impl PaperPairManager {
    pub fn new(
        exchange: Arc<dyn ExchangeConnector>,
        market_data: Arc<dyn MarketDataManager>,
        ledger: Arc<PaperLedger>,
        strategy: &str,
    ) -> Self {
        Self {
            exchange,
            market_data,
            ledger,
            strategy: strategy.to_string(),
            tracked: RwLock::new(BTreeSet::new()),
            positions: RwLock::new(HashMap::new()),
            performance: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue a signal for the next `check_signals` call
    pub fn queue_signal(&self, signal: Signal) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(signal);
    }

    fn open(&self, signal: &Signal, side: crate::domain::Side) {
        let mut positions = self.positions.write().unwrap_or_else(|e| e.into_inner());
        if positions.contains_key(&signal.symbol) {
            debug!(symbol = %signal.symbol, "position already open, signal ignored");
            return;
        }
        info!(
            symbol = %signal.symbol,
            side = %side,
            price = %signal.price,
            quantity = %signal.quantity,
            "paper position opened"
        );
        positions.insert(
            signal.symbol.clone(),
            Position {
                symbol: signal.symbol.clone(),
                side,
                quantity: signal.quantity,
                entry_price: signal.price,
                stop_loss: None,
                opened_at: Utc::now(),
            },
        );
    }

    /// Remove the position on `symbol` at `price` and book the result
    fn close(&self, symbol: &str, price: Decimal, reason: &str) -> bool {
        let position = self
            .positions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(symbol);
        let Some(position) = position else {
            return false;
        };

        let pnl = position.pnl_at(price);
        self.ledger.record(pnl);
        let mut performance = self.performance.write().unwrap_or_else(|e| e.into_inner());
        let perf = performance.entry(symbol.to_string()).or_default();
        perf.trades += 1;
        if pnl > Decimal::ZERO {
            perf.wins += 1;
        }
        perf.pnl += pnl;
        perf.last_trade = Some(Utc::now());

        info!(symbol, %price, %pnl, reason, "paper position closed");
        true
    }
}

#[async_trait]
impl PairManager for PaperPairManager {
    async fn update_market_data(&self) -> Result<()> {
        let stale = self
            .tracked_symbols()
            .into_iter()
            .filter(|symbol| self.market_data.cached_ticker(symbol).is_none())
            .count();
        if stale > 0 {
            debug!(stale, "tracked symbols without a cached ticker");
        }
        Ok(())
    }

    async fn check_signals(&self) -> Result<Vec<Signal>> {
        let tracked = self.tracked.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let signals: Vec<Signal> = pending
            .drain(..)
            .filter(|s| tracked.contains(&s.symbol))
            .collect();
        if !signals.is_empty() {
            debug!(strategy = %self.strategy, count = signals.len(), "signals ready");
        }
        Ok(signals)
    }

    async fn execute_signals(&self, signals: Vec<Signal>) -> Result<()> {
        if signals.is_empty() {
            return Ok(());
        }
        if !self.exchange.is_connected() {
            return Err(VigilError::Exchange(format!(
                "cannot execute {} signals: exchange disconnected",
                signals.len()
            )));
        }
        for signal in &signals {
            match signal.action {
                SignalAction::Open(side) => self.open(signal, side),
                SignalAction::Close => {
                    if !self.close(&signal.symbol, signal.price, &signal.reason) {
                        warn!(symbol = %signal.symbol, "close signal without open position");
                    }
                }
            }
        }
        Ok(())
    }

    fn positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn set_stop_loss(&self, symbol: &str, stop: Decimal) {
        if let Some(position) = self
            .positions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(symbol)
        {
            position.stop_loss = Some(stop);
        }
    }

    fn performance(&self) -> HashMap<String, PairPerformance> {
        self.performance
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn performance_summary(&self) -> PerformanceSummary {
        let performance = self.performance.read().unwrap_or_else(|e| e.into_inner());
        PerformanceSummary::from_pairs(performance.values())
    }

    async fn close_all_positions(&self, reason: &str) -> Result<usize> {
        let open: Vec<Position> = self.positions();
        let mut closed = 0;
        for position in open {
            let price = self
                .market_data
                .cached_ticker(&position.symbol)
                .map(|t| t.last)
                .unwrap_or(position.entry_price);
            if self.close(&position.symbol, price, reason) {
                closed += 1;
            }
        }
        Ok(closed)
    }

    fn track_symbol(&self, symbol: &str) -> bool {
        let added = self
            .tracked
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string());
        if added {
            debug!(symbol, strategy = %self.strategy, "strategy attached");
        }
        added
    }

    fn tracked_symbols(&self) -> Vec<String> {
        self.tracked
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper::{PaperExchange, PaperMarketData};
    use crate::config::Credentials;
    use crate::domain::{Side, Ticker};
    use rust_decimal_macros::dec;

    async fn manager() -> (PaperPairManager, Arc<PaperMarketData>, Arc<PaperLedger>) {
        let exchange = Arc::new(PaperExchange::new("binance", true));
        exchange
            .connect(Credentials {
                api_key: String::new(),
                api_secret: String::new(),
            })
            .await
            .unwrap();
        let data = Arc::new(PaperMarketData::new(exchange.clone()));
        let ledger = Arc::new(PaperLedger::default());
        let pm = PaperPairManager::new(exchange, data.clone(), ledger.clone(), "multi_signal");
        pm.track_symbol("BTC/USDT");
        (pm, data, ledger)
    }

    #[tokio::test]
    async fn test_open_then_close_books_pnl() {
        let (pm, _, ledger) = manager().await;
        pm.queue_signal(Signal::new("BTC/USDT", SignalAction::Open(Side::Long), dec!(100), dec!(2)));
        let signals = pm.check_signals().await.unwrap();
        pm.execute_signals(signals).await.unwrap();
        assert_eq!(pm.positions().len(), 1);

        pm.queue_signal(Signal::new("BTC/USDT", SignalAction::Close, dec!(110), dec!(2)));
        let signals = pm.check_signals().await.unwrap();
        pm.execute_signals(signals).await.unwrap();
        assert!(pm.positions().is_empty());
        assert_eq!(ledger.realized(), dec!(20));

        let summary = pm.performance_summary();
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.win_rate, 100.0);
    }

    #[tokio::test]
    async fn test_signals_for_untracked_symbols_are_dropped() {
        let (pm, _, _) = manager().await;
        pm.queue_signal(Signal::new("DOGE/USDT", SignalAction::Open(Side::Long), dec!(1), dec!(1)));
        assert!(pm.check_signals().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_all_uses_cached_price() {
        let (pm, data, ledger) = manager().await;
        pm.queue_signal(Signal::new("BTC/USDT", SignalAction::Open(Side::Short), dec!(100), dec!(1)));
        pm.execute_signals(pm.check_signals().await.unwrap()).await.unwrap();
        data.cache_ticker(Ticker::at_price("BTC/USDT", dec!(90)));

        assert_eq!(pm.close_all_positions("test").await.unwrap(), 1);
        assert_eq!(ledger.realized(), dec!(10));
        assert_eq!(pm.close_all_positions("test").await.unwrap(), 0);
    }

    #[test]
    fn test_track_symbol_is_idempotent() {
        let exchange = Arc::new(PaperExchange::new("binance", true));
        let data = Arc::new(PaperMarketData::new(exchange.clone()));
        let pm = PaperPairManager::new(exchange, data, Arc::new(PaperLedger::default()), "s");
        assert!(pm.track_symbol("ETH/USDT"));
        assert!(!pm.track_symbol("ETH/USDT"));
        assert_eq!(pm.tracked_symbols(), vec!["ETH/USDT".to_string()]);
    }
}
