use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a position or signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open position, owned by the pair manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Unrealized (or realized, at exit) PnL at `price`
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (price - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - price) * self.quantity,
        }
    }
}

/// What a signal asks the pair manager to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Open(Side),
    Close,
}

/// Trade signal produced by strategy evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub action: SignalAction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(symbol: &str, action: SignalAction, price: Decimal, quantity: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            price,
            quantity,
            reason: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }
}

/// Read-only risk view, fetched fresh every Risk Monitor cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Loss from the equity peak, as a ratio (0.2 = 20%)
    pub current_drawdown: Decimal,
    /// Today's PnL relative to capital; negative is a loss
    pub daily_pnl: Decimal,
}

/// Per-symbol trade statistics kept by the pair manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairPerformance {
    pub trades: u64,
    pub wins: u64,
    pub pnl: Decimal,
    pub last_trade: Option<DateTime<Utc>>,
}

/// Aggregate across every tracked pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_trades: u64,
    pub winning_trades: u64,
    /// Percentage, 0-100
    pub win_rate: f64,
    pub total_pnl: Decimal,
}

impl PerformanceSummary {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a PairPerformance>) -> Self {
        let mut summary = Self::default();
        for perf in pairs {
            summary.total_trades += perf.trades;
            summary.winning_trades += perf.wins;
            summary.total_pnl += perf.pnl;
        }
        if summary.total_trades > 0 {
            summary.win_rate =
                summary.winning_trades as f64 / summary.total_trades as f64 * 100.0;
        }
        summary
    }
}
