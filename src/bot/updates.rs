use tracing::{trace, warn};

use crate::adapters::MarketDataManager;
use crate::bot::status::{StatusRegister, METRIC_HIGH_LATENCY, METRIC_WS_UPDATES};
use crate::domain::{MarketPayload, MarketUpdate};
use crate::supervisor::HIGH_LATENCY;

/// Feed callback body. Tickers go to the raw cache, books to the book hook,
/// trades are only counted. Every update bumps `ws_updates` by one.
pub(crate) fn route_market_update(
    status: &StatusRegister,
    market_data: &dyn MarketDataManager,
    update: MarketUpdate,
) {
    if update.latency > HIGH_LATENCY {
        warn!(
            symbol = %update.symbol,
            data_type = %update.data_type(),
            latency_ms = update.latency.as_millis() as u64,
            "high latency market update"
        );
        status.increment_metric(METRIC_HIGH_LATENCY, 1);
    }

    match update.payload {
        MarketPayload::Ticker(ticker) => market_data.cache_ticker(ticker),
        MarketPayload::Orderbook(book) => market_data.apply_orderbook(&update.symbol, book),
        MarketPayload::Trades(trades) => {
            trace!(symbol = %update.symbol, count = trades.len(), "trades received");
        }
    }

    status.increment_metric(METRIC_WS_UPDATES, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockMarketDataManager;
    use crate::domain::{OrderBook, Ticker};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ticker_update(latency_ms: u64) -> MarketUpdate {
        MarketUpdate {
            symbol: "BTC/USDT".to_string(),
            payload: MarketPayload::Ticker(Ticker::at_price("BTC/USDT", dec!(1))),
            latency: Duration::from_millis(latency_ms),
        }
    }

    #[test]
    fn test_counter_increments_once_regardless_of_latency() {
        let status = StatusRegister::new();
        let mut data = MockMarketDataManager::new();
        data.expect_cache_ticker().times(2).return_const(());

        route_market_update(&status, &data, ticker_update(5));
        route_market_update(&status, &data, ticker_update(450));

        assert_eq!(status.metric(METRIC_WS_UPDATES), 2);
        assert_eq!(status.metric(METRIC_HIGH_LATENCY), 1);
    }

    #[test]
    fn test_orderbook_goes_to_book_hook() {
        let status = StatusRegister::new();
        let mut data = MockMarketDataManager::new();
        data.expect_apply_orderbook()
            .withf(|symbol, _| symbol.to_string() == "ETH/USDT")
            .times(1)
            .return_const(());
        data.expect_cache_ticker().never();

        route_market_update(
            &status,
            &data,
            MarketUpdate {
                symbol: "ETH/USDT".to_string(),
                payload: MarketPayload::Orderbook(OrderBook::default()),
                latency: Duration::from_millis(1),
            },
        );
        assert_eq!(status.metric(METRIC_WS_UPDATES), 1);
    }

    #[test]
    fn test_exactly_threshold_is_not_high() {
        let status = StatusRegister::new();
        let mut data = MockMarketDataManager::new();
        data.expect_cache_ticker().return_const(());
        route_market_update(&status, &data, ticker_update(200));
        assert_eq!(status.metric(METRIC_HIGH_LATENCY), 0);
    }
}
