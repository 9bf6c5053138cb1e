use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Channels a feed subscription can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Ticker,
    Trades,
    Orderbook,
}

impl DataType {
    pub const ALL: [DataType; 3] = [DataType::Ticker, DataType::Trades, DataType::Orderbook];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Ticker => "ticker",
            DataType::Trades => "trades",
            DataType::Orderbook => "orderbook",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest 24h ticker for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    /// 24h traded volume in quote currency
    pub quote_volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Ticker with bid/ask collapsed onto the last price
    pub fn at_price(symbol: &str, last: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            last,
            bid: last,
            ask: last,
            quote_volume: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }
}

/// Public trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub price: Decimal,
    pub quantity: Decimal,
    pub buyer_is_maker: bool,
    pub timestamp: DateTime<Utc>,
}

/// Price level in an order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book depth update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }
}

/// Payload of a feed update; its variant determines the data type
#[derive(Debug, Clone, PartialEq)]
pub enum MarketPayload {
    Ticker(Ticker),
    Trades(Vec<TradePrint>),
    Orderbook(OrderBook),
}

/// Real-time update pushed by the market-data feed. Consumed once by the
/// update handler and never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketUpdate {
    pub symbol: String,
    pub payload: MarketPayload,
    /// Exchange event time to local receipt
    pub latency: Duration,
}

impl MarketUpdate {
    pub fn data_type(&self) -> DataType {
        match self.payload {
            MarketPayload::Ticker(_) => DataType::Ticker,
            MarketPayload::Trades(_) => DataType::Trades,
            MarketPayload::Orderbook(_) => DataType::Orderbook,
        }
    }
}

/// Callback registered with the feed for a symbol's updates
pub type UpdateCallback = Arc<dyn Fn(MarketUpdate) + Send + Sync>;

/// Feed liveness probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMetrics {
    pub connected: bool,
    #[serde(with = "duration_ms")]
    pub avg_latency: Duration,
    pub updates_received: u64,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}
