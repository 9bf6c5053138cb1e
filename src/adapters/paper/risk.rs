use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::PaperLedger;
use crate::adapters::traits::RiskEngine;
use crate::domain::{Position, RiskSnapshot, Side};
use crate::error::Result;

/// Drawdown tracker over the paper ledger's realized PnL
pub struct PaperRiskEngine {
    ledger: Arc<PaperLedger>,
    trailing_stop_pct: Decimal,
    peak_equity: Mutex<Option<Decimal>>,
    forced: Mutex<Option<RiskSnapshot>>,
    daily_resets: AtomicU32,
}

impl PaperRiskEngine {
    pub fn new(ledger: Arc<PaperLedger>, trailing_stop_pct: Decimal) -> Self {
        Self {
            ledger,
            trailing_stop_pct,
            peak_equity: Mutex::new(None),
            forced: Mutex::new(None),
            daily_resets: AtomicU32::new(0),
        }
    }

    /// Report `snapshot` verbatim instead of the computed one (drills, tests)
    pub fn force_snapshot(&self, snapshot: Option<RiskSnapshot>) {
        *self.forced.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    pub fn daily_resets(&self) -> u32 {
        self.daily_resets.load(Ordering::SeqCst)
    }
}

impl RiskEngine for PaperRiskEngine {
    fn risk_snapshot(&self, capital: Decimal) -> Result<RiskSnapshot> {
        if let Some(forced) = *self.forced.lock().unwrap_or_else(|e| e.into_inner()) {
            return Ok(forced);
        }

        let realized = self.ledger.realized();
        let equity = capital + realized;

        let mut peak = self.peak_equity.lock().unwrap_or_else(|e| e.into_inner());
        let high = peak.map_or(equity, |p| p.max(equity));
        *peak = Some(high);

        let current_drawdown = if high > Decimal::ZERO {
            ((high - equity) / high).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        let daily_pnl = if capital > Decimal::ZERO {
            (realized - self.ledger.day_start()) / capital
        } else {
            Decimal::ZERO
        };

        Ok(RiskSnapshot {
            current_drawdown,
            daily_pnl,
        })
    }

    fn update_trailing_stop(&self, position: &Position, price: Decimal) -> Option<Decimal> {
        let candidate = match position.side {
            Side::Long => price * (Decimal::ONE - self.trailing_stop_pct),
            Side::Short => price * (Decimal::ONE + self.trailing_stop_pct),
        };
        let improves = match (position.side, position.stop_loss) {
            (_, None) => true,
            (Side::Long, Some(stop)) => candidate > stop,
            (Side::Short, Some(stop)) => candidate < stop,
        };
        improves.then_some(candidate)
    }

    fn reset_daily_counters(&self) {
        self.ledger.mark_day_start();
        self.daily_resets.fetch_add(1, Ordering::SeqCst);
        debug!("paper risk engine daily counters reset");
    }
}
