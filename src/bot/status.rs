//! Status register: lifecycle state plus aggregate trading metrics.
//!
//! Every field sits behind one `std::sync::RwLock`. Each operation is a
//! single short critical section and the guard is never held across an
//! `.await`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::coordination::LifecycleState;
use crate::domain::{FeedMetrics, PerformanceSummary};
use crate::error::{Result, VigilError};

/// Errors kept before a trim
pub const MAX_ERRORS: usize = 100;
/// Errors kept after a trim
pub const TRIMMED_ERRORS: usize = 50;
/// Errors surfaced in status reports and snapshots
pub const RECENT_ERRORS: usize = 10;

/// Feed updates handled
pub const METRIC_WS_UPDATES: &str = "ws_updates";
/// Feed updates that arrived above the latency threshold
pub const METRIC_HIGH_LATENCY: &str = "high_latency_updates";
/// Risk cycles that saw drawdown above the warning threshold
pub const METRIC_DRAWDOWN_WARNINGS: &str = "drawdown_warnings";
/// Risk cycles that saw the daily loss limit exceeded
pub const METRIC_DAILY_LOSS_WARNINGS: &str = "daily_loss_warnings";

#[derive(Debug, Clone)]
struct Status {
    state: LifecycleState,
    start_time: Option<DateTime<Utc>>,
    last_update: DateTime<Utc>,
    total_trades: u64,
    open_positions: usize,
    total_pnl: Decimal,
    daily_pnl: Decimal,
    daily_baseline: Decimal,
    errors: Vec<String>,
    metrics: BTreeMap<String, u64>,
}

/// Copy of the register at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: LifecycleState,
    pub start_time: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub total_trades: u64,
    pub open_positions: usize,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub errors: Vec<String>,
    pub metrics: BTreeMap<String, u64>,
}

pub struct StatusRegister {
    inner: RwLock<Status>,
}

impl StatusRegister {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Status {
                state: LifecycleState::Initializing,
                start_time: None,
                last_update: Utc::now(),
                total_trades: 0,
                open_positions: 0,
                total_pnl: Decimal::ZERO,
                daily_pnl: Decimal::ZERO,
                daily_baseline: Decimal::ZERO,
                errors: Vec::new(),
                metrics: BTreeMap::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Status> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Status> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> LifecycleState {
        self.read().state
    }

    /// Move to `next` if the lifecycle graph allows it; returns the previous
    /// state.
    pub(crate) fn transition(&self, next: LifecycleState) -> Result<LifecycleState> {
        let mut status = self.write();
        let prev = status.state;
        if !prev.can_transition_to(next) {
            return Err(VigilError::InvalidStateTransition {
                from: prev.to_string(),
                to: next.to_string(),
            });
        }
        status.state = next;
        status.last_update = Utc::now();
        debug!(from = %prev, to = %next, "lifecycle transition");
        Ok(prev)
    }

    /// Transition only when currently in `expected`. Used where two callers
    /// may race for the same edge.
    pub(crate) fn transition_from(
        &self,
        expected: LifecycleState,
        next: LifecycleState,
    ) -> Result<bool> {
        let mut status = self.write();
        if status.state != expected {
            return Ok(false);
        }
        if !expected.can_transition_to(next) {
            return Err(VigilError::InvalidStateTransition {
                from: expected.to_string(),
                to: next.to_string(),
            });
        }
        status.state = next;
        status.last_update = Utc::now();
        debug!(from = %expected, to = %next, "lifecycle transition");
        Ok(true)
    }

    pub(crate) fn mark_started(&self) {
        let mut status = self.write();
        let now = Utc::now();
        status.start_time = Some(now);
        status.last_update = now;
    }

    /// Append one error. Past [`MAX_ERRORS`] the list is cut to the most
    /// recent [`TRIMMED_ERRORS`] in the same step.
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut status = self.write();
        status.errors.push(message);
        if status.errors.len() > MAX_ERRORS {
            let excess = status.errors.len() - TRIMMED_ERRORS;
            status.errors.drain(..excess);
        }
    }

    /// Trim to the most recent [`TRIMMED_ERRORS`] when over [`MAX_ERRORS`]
    pub fn trim_errors(&self) -> bool {
        let mut status = self.write();
        if status.errors.len() <= MAX_ERRORS {
            return false;
        }
        let excess = status.errors.len() - TRIMMED_ERRORS;
        status.errors.drain(..excess);
        warn!(kept = TRIMMED_ERRORS, "error list trimmed");
        true
    }

    pub fn errors(&self) -> Vec<String> {
        self.read().errors.clone()
    }

    pub fn recent_errors(&self, n: usize) -> Vec<String> {
        let status = self.read();
        let start = status.errors.len().saturating_sub(n);
        status.errors[start..].to_vec()
    }

    pub fn increment_metric(&self, key: &str, by: u64) {
        *self.write().metrics.entry(key.to_string()).or_insert(0) += by;
    }

    pub fn metric(&self, key: &str) -> u64 {
        self.read().metrics.get(key).copied().unwrap_or(0)
    }

    pub fn set_open_positions(&self, count: usize) {
        let mut status = self.write();
        status.open_positions = count;
        status.last_update = Utc::now();
    }

    /// Record totals from the pair manager and derive today's PnL from the
    /// baseline anchored at the last daily reset
    pub fn update_performance(&self, total_trades: u64, total_pnl: Decimal) -> Decimal {
        let mut status = self.write();
        status.total_trades = total_trades;
        status.total_pnl = total_pnl;
        status.daily_pnl = total_pnl - status.daily_baseline;
        status.last_update = Utc::now();
        status.daily_pnl
    }

    /// New trading day: today's PnL starts from the current total
    pub fn anchor_daily_baseline(&self) {
        let mut status = self.write();
        status.daily_baseline = status.total_pnl;
        status.daily_pnl = Decimal::ZERO;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let status = self.read();
        StatusSnapshot {
            state: status.state,
            start_time: status.start_time,
            last_update: status.last_update,
            total_trades: status.total_trades,
            open_positions: status.open_positions,
            total_pnl: status.total_pnl,
            daily_pnl: status.daily_pnl,
            errors: status.errors.clone(),
            metrics: status.metrics.clone(),
        }
    }
}

impl Default for StatusRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingTotals {
    pub total_trades: u64,
    pub open_positions: usize,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub exchange: String,
    pub pairs: usize,
    pub strategy: String,
}

/// Read-only status answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: LifecycleState,
    pub uptime_secs: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub paper_trading: bool,
    pub trading: TradingTotals,
    pub performance: PerformanceSummary,
    pub websocket: Option<FeedMetrics>,
    pub errors: Vec<String>,
    pub metrics: BTreeMap<String, u64>,
    pub live_units: Vec<String>,
    pub config: ConfigSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_cap_holds_after_every_append() {
        let register = StatusRegister::new();
        for i in 0..=MAX_ERRORS {
            register.record_error(format!("e{i}"));
            assert!(register.errors().len() <= MAX_ERRORS);
        }
        let errors = register.errors();
        assert_eq!(errors.len(), TRIMMED_ERRORS);
        assert_eq!(errors.first().unwrap(), "e51");
        assert_eq!(errors.last().unwrap(), "e100");
    }

    #[test]
    fn test_exactly_cap_is_not_trimmed() {
        let register = StatusRegister::new();
        for i in 0..MAX_ERRORS {
            register.record_error(format!("e{i}"));
        }
        assert_eq!(register.errors().len(), MAX_ERRORS);
        assert!(!register.trim_errors());
    }

    #[test]
    fn test_recent_errors() {
        let register = StatusRegister::new();
        for i in 0..15 {
            register.record_error(format!("e{i}"));
        }
        let recent = register.recent_errors(RECENT_ERRORS);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], "e5");
    }

    #[test]
    fn test_rejects_illegal_transition() {
        let register = StatusRegister::new();
        let err = register.transition(LifecycleState::Paused).unwrap_err();
        assert!(matches!(err, VigilError::InvalidStateTransition { .. }));
        assert_eq!(register.state(), LifecycleState::Initializing);
    }

    #[test]
    fn test_transition_from_guards_races() {
        let register = StatusRegister::new();
        register.transition(LifecycleState::Stopped).unwrap();
        register.transition(LifecycleState::Running).unwrap();
        assert!(register
            .transition_from(LifecycleState::Running, LifecycleState::Paused)
            .unwrap());
        assert!(!register
            .transition_from(LifecycleState::Running, LifecycleState::Paused)
            .unwrap());
    }

    #[test]
    fn test_daily_pnl_from_baseline() {
        let register = StatusRegister::new();
        assert_eq!(register.update_performance(3, dec!(120)), dec!(120));
        register.anchor_daily_baseline();
        assert_eq!(register.snapshot().daily_pnl, dec!(0));
        assert_eq!(register.update_performance(5, dec!(100)), dec!(-20));
    }

    #[test]
    fn test_metrics() {
        let register = StatusRegister::new();
        register.increment_metric(METRIC_WS_UPDATES, 1);
        register.increment_metric(METRIC_WS_UPDATES, 1);
        assert_eq!(register.metric(METRIC_WS_UPDATES), 2);
        assert_eq!(register.metric(METRIC_HIGH_LATENCY), 0);
    }
}
