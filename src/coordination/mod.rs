//! Coordination primitives for the bot's control plane:
//! lifecycle states, shutdown signalling, the drawdown breaker and the
//! daily reset gate.

pub mod circuit_breaker;
pub mod daily_reset;
pub mod lifecycle;
pub mod shutdown;

pub use circuit_breaker::{BreakerVerdict, CircuitBreaker, CircuitBreakerConfig, DrawdownLevel};
pub use daily_reset::DailyResetGate;
pub use lifecycle::LifecycleState;
pub use shutdown::{install_signal_handlers, ShutdownController, ShutdownReason, ShutdownToken};
