//! Drawdown circuit breaker
//!
//! Pure threshold evaluation over a fresh [`RiskSnapshot`]. The risk monitor
//! loop acts on the verdict; this module never touches lifecycle state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RiskManagementConfig;
use crate::domain::RiskSnapshot;

/// Threshold set for the breaker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Drawdown ratio above which a warning is logged
    pub drawdown_warning: Decimal,
    /// Drawdown ratio above which trading is paused
    pub drawdown_critical: Decimal,
    /// Daily loss ratio above which a warning is logged
    pub max_daily_loss: Decimal,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            drawdown_warning: dec!(0.15),
            drawdown_critical: dec!(0.20),
            max_daily_loss: dec!(0.05),
        }
    }
}

impl From<&RiskManagementConfig> for CircuitBreakerConfig {
    fn from(risk: &RiskManagementConfig) -> Self {
        Self {
            drawdown_warning: risk.max_drawdown_warning,
            drawdown_critical: risk.max_drawdown_critical,
            max_daily_loss: risk.max_daily_loss,
        }
    }
}

/// Drawdown classification for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawdownLevel {
    Normal,
    Warning,
    Critical,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerVerdict {
    pub drawdown: DrawdownLevel,
    pub daily_loss_exceeded: bool,
    pub snapshot: RiskSnapshot,
}

impl BreakerVerdict {
    pub fn should_pause(&self) -> bool {
        self.drawdown == DrawdownLevel::Critical
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Classify `snapshot`. Thresholds are strict: exactly 20% drawdown is
    /// still a warning, not critical.
    pub fn evaluate(&self, snapshot: RiskSnapshot) -> BreakerVerdict {
        let drawdown = if snapshot.current_drawdown > self.config.drawdown_critical {
            DrawdownLevel::Critical
        } else if snapshot.current_drawdown > self.config.drawdown_warning {
            DrawdownLevel::Warning
        } else {
            DrawdownLevel::Normal
        };

        BreakerVerdict {
            drawdown,
            // daily_pnl is signed; only losses count
            daily_loss_exceeded: snapshot.daily_pnl < -self.config.max_daily_loss,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(drawdown: Decimal, daily: Decimal) -> RiskSnapshot {
        RiskSnapshot {
            current_drawdown: drawdown,
            daily_pnl: daily,
        }
    }

    #[test]
    fn test_drawdown_levels() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.evaluate(snap(dec!(0.10), dec!(0))).drawdown, DrawdownLevel::Normal);
        assert_eq!(breaker.evaluate(snap(dec!(0.16), dec!(0))).drawdown, DrawdownLevel::Warning);
        assert_eq!(breaker.evaluate(snap(dec!(0.20), dec!(0))).drawdown, DrawdownLevel::Warning);

        let critical = breaker.evaluate(snap(dec!(0.21), dec!(0)));
        assert_eq!(critical.drawdown, DrawdownLevel::Critical);
        assert!(critical.should_pause());
    }

    #[test]
    fn test_daily_loss_only_counts_losses() {
        let breaker = CircuitBreaker::default();
        assert!(breaker.evaluate(snap(dec!(0), dec!(-0.06))).daily_loss_exceeded);
        assert!(!breaker.evaluate(snap(dec!(0), dec!(-0.05))).daily_loss_exceeded);
        assert!(!breaker.evaluate(snap(dec!(0), dec!(0.08))).daily_loss_exceeded);
    }

    #[test]
    fn test_config_from_risk_section() {
        let mut risk = RiskManagementConfig::default();
        risk.max_drawdown_critical = dec!(0.30);
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::from(&risk));
        assert!(!breaker.evaluate(snap(dec!(0.25), dec!(0))).should_pause());
    }
}
