//! Supervision of the bot's concurrent work: isolated loop tasks and the
//! connectivity checks that keep collaborators alive.

pub mod reconnect;
pub mod task_supervisor;

pub use reconnect::{HealthReport, ReconnectAttempt, ReconnectionManager, HIGH_LATENCY};
pub use task_supervisor::{LiveUnits, TaskSupervisor, UnitOutcome};
