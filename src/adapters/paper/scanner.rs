use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::adapters::traits::{MarketDataManager, WatchlistScanner};
use crate::config::TradingConfig;
use crate::error::Result;

/// Ranks cached tickers by quote volume and keeps the top `max_pairs`
/// above `min_volume`. Falls back to the configured pairs while the cache
/// holds nothing liquid enough.
pub struct VolumeWatchlist {
    market_data: Arc<dyn MarketDataManager>,
    configured: Vec<String>,
    min_volume: Decimal,
    max_pairs: usize,
    current: RwLock<Vec<String>>,
}

impl VolumeWatchlist {
    pub fn new(trading: &TradingConfig, market_data: Arc<dyn MarketDataManager>) -> Self {
        Self {
            market_data,
            configured: trading.pairs.clone(),
            min_volume: trading.min_volume_usdt,
            max_pairs: trading.max_pairs,
            current: RwLock::new(trading.pairs.clone()),
        }
    }
}

#[async_trait]
impl WatchlistScanner for VolumeWatchlist {
    async fn update_watchlist(&self) -> Result<Vec<String>> {
        let mut liquid: Vec<_> = self
            .market_data
            .cached_tickers()
            .into_iter()
            .filter(|t| t.quote_volume >= self.min_volume)
            .collect();
        liquid.sort_by(|a, b| b.quote_volume.cmp(&a.quote_volume));

        let mut watchlist: Vec<String> = liquid
            .into_iter()
            .take(self.max_pairs)
            .map(|t| t.symbol)
            .collect();
        if watchlist.is_empty() {
            watchlist = self.configured.iter().take(self.max_pairs).cloned().collect();
        }

        info!(pairs = watchlist.len(), "watchlist updated");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = watchlist.clone();
        Ok(watchlist)
    }

    fn watchlist(&self) -> Vec<String> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper::{PaperExchange, PaperMarketData};
    use crate::config::AppConfig;
    use crate::domain::Ticker;
    use rust_decimal_macros::dec;

    fn ticker(symbol: &str, volume: Decimal) -> Ticker {
        let mut t = Ticker::at_price(symbol, dec!(1));
        t.quote_volume = volume;
        t
    }

    #[tokio::test]
    async fn test_ranks_by_volume_and_caps() {
        let mut config = AppConfig::default_config(&["BTC/USDT"]);
        config.trading.max_pairs = 2;
        let data = Arc::new(PaperMarketData::new(Arc::new(PaperExchange::new("binance", true))));
        data.cache_ticker(ticker("A/USDT", dec!(2_000_000)));
        data.cache_ticker(ticker("B/USDT", dec!(5_000_000)));
        data.cache_ticker(ticker("C/USDT", dec!(3_000_000)));
        data.cache_ticker(ticker("D/USDT", dec!(10)));

        let scanner = VolumeWatchlist::new(&config.trading, data);
        let list = scanner.update_watchlist().await.unwrap();
        assert_eq!(list, vec!["B/USDT".to_string(), "C/USDT".to_string()]);
        assert_eq!(scanner.watchlist(), list);
    }

    #[tokio::test]
    async fn test_falls_back_to_configured_pairs() {
        let config = AppConfig::default_config(&["BTC/USDT", "ETH/USDT"]);
        let data = Arc::new(PaperMarketData::new(Arc::new(PaperExchange::new("binance", true))));
        let scanner = VolumeWatchlist::new(&config.trading, data);
        let list = scanner.update_watchlist().await.unwrap();
        assert_eq!(list, vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]);
    }
}
