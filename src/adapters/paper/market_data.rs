use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::adapters::traits::{ExchangeConnector, MarketDataManager};
use crate::domain::{OrderBook, Ticker};
use crate::error::{Result, VigilError};

/// Ticker and order-book cache filled from the stream
pub struct PaperMarketData {
    exchange: Arc<dyn ExchangeConnector>,
    symbols: RwLock<BTreeSet<String>>,
    tickers: RwLock<HashMap<String, Ticker>>,
    books: RwLock<HashMap<String, OrderBook>>,
    refreshes: AtomicU64,
}

impl PaperMarketData {
    pub fn new(exchange: Arc<dyn ExchangeConnector>) -> Self {
        Self {
            exchange,
            symbols: RwLock::new(BTreeSet::new()),
            tickers: RwLock::new(HashMap::new()),
            books: RwLock::new(HashMap::new()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn order_book(&self, symbol: &str) -> Option<OrderBook> {
        self.books
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .cloned()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataManager for PaperMarketData {
    async fn initialize(&self, symbols: Vec<String>) -> Result<()> {
        let mut tracked = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        for symbol in symbols {
            tracked.insert(symbol);
        }
        debug!(count = tracked.len(), "market data tracking symbols");
        Ok(())
    }

    async fn update_all(&self) -> Result<()> {
        if !self.exchange.is_connected() {
            return Err(VigilError::MarketData(
                "cannot refresh snapshots: exchange disconnected".to_string(),
            ));
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cache_ticker(&self, ticker: Ticker) {
        self.tickers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ticker.symbol.clone(), ticker);
    }

    fn apply_orderbook(&self, symbol: &str, book: OrderBook) {
        self.books
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), book);
    }

    fn cached_ticker(&self, symbol: &str) -> Option<Ticker> {
        self.tickers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .cloned()
    }

    fn cached_tickers(&self) -> Vec<Ticker> {
        self.tickers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}
