//! Bot lifecycle states
//!
//! One instance per process lives in the status register. Transitions are
//! checked against [`LifecycleState::can_transition_to`]; only the bot's
//! entry points (`initialize`, `start`, `pause`, `shutdown`, fatal errors)
//! request them.

use serde::{Deserialize, Serialize};

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Collaborators are being wired
    Initializing,
    /// Loops are active and signals are executed
    Running,
    /// Loops stay alive; signal execution is suppressed
    Paused,
    /// Teardown in progress
    Stopping,
    /// Initialized or torn down cleanly; `start` may run
    Stopped,
    /// Fatal failure; `start` may retry
    Error,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Initializing => "INITIALIZING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Paused => "PAUSED",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Error => "ERROR",
        }
    }

    /// States from which `start` is accepted
    pub fn can_start(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Error)
    }

    /// Whether new orders may be placed
    pub fn can_trade(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Error)
    }

    /// Edge check for the lifecycle graph. Any state may fail into `Error`
    /// and any state may begin a shutdown.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            (_, Error) => true,
            (Stopping, Stopping) => false,
            (_, Stopping) => true,
            (Initializing, Stopped) => true,
            (Stopping, Stopped) => true,
            (Stopped | Error, Running) => true,
            (Running, Paused) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
