pub mod adapters;
pub mod bot;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod supervisor;

pub use adapters::{ComponentFactory, PaperComponents};
pub use bot::{Components, StatusReport, TradingBot};
pub use config::AppConfig;
pub use coordination::{
    CircuitBreaker, CircuitBreakerConfig, LifecycleState, ShutdownController, ShutdownReason,
};
pub use error::{Result, VigilError};
pub use persistence::{PersistedSnapshot, SnapshotStore};
pub use supervisor::{ReconnectionManager, TaskSupervisor};
