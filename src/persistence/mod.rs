//! State persistence for operator inspection and crash forensics

pub mod snapshot;

pub use snapshot::{PersistedSnapshot, SnapshotStore};
