//! Snapshot persistence
//!
//! The bot state is written as one pretty-printed JSON document, overwritten
//! in place on each write. Writes go through a sibling temp file, are synced,
//! then renamed over the target, so a crash mid-write leaves either the old
//! or the new snapshot on disk, never a torn one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::coordination::LifecycleState;
use crate::domain::Position;
use crate::error::{Result, VigilError};

/// Persisted view of the bot at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub timestamp: DateTime<Utc>,
    pub state: LifecycleState,
    pub total_trades: u64,
    pub open_positions: usize,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub positions: Vec<Position>,
    /// Most recent errors only
    pub errors: Vec<String>,
}

/// Clones share the write lock, so writers through one store never race
/// on the temp file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `snapshot` atomically, creating the parent directory if needed
    pub async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let _write = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            VigilError::Persistence(format!(
                "failed to move snapshot into {}: {e}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), bytes = json.len(), "snapshot written");
        Ok(())
    }

    /// Read the last snapshot; `Ok(None)` when nothing was written yet
    pub async fn load(&self) -> Result<Option<PersistedSnapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vigil-snapshot-{tag}-{}", uuid::Uuid::new_v4()))
    }

    fn snapshot(trades: u64) -> PersistedSnapshot {
        PersistedSnapshot {
            timestamp: Utc::now(),
            state: LifecycleState::Running,
            total_trades: trades,
            open_positions: 0,
            total_pnl: dec!(12.5),
            daily_pnl: dec!(-1.25),
            positions: Vec::new(),
            errors: vec!["scanner: timeout".to_string()],
        }
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_overwrites() {
        let dir = scratch_dir("overwrite");
        let store = SnapshotStore::new(dir.join("nested").join("bot_state.json"));

        store.save(&snapshot(1)).await.unwrap();
        store.save(&snapshot(2)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.total_trades, 2);
        assert_eq!(loaded.total_pnl, dec!(12.5));
        assert!(!store.temp_path().exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let store = SnapshotStore::new(scratch_dir("missing").join("bot_state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_is_error() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bot_state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = SnapshotStore::new(&path);
        assert!(matches!(store.load().await, Err(VigilError::Json(_))));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_concurrent_saves_through_clones() {
        let dir = scratch_dir("concurrent");
        let store = SnapshotStore::new(dir.join("bot_state.json"));
        let other = store.clone();

        let (first, second) = (snapshot(1), snapshot(2));
        let (a, b) = tokio::join!(store.save(&first), other.save(&second));
        assert!(a.is_ok() && b.is_ok());
        assert!(store.load().await.unwrap().is_some());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_state_serializes_uppercase() {
        let json = serde_json::to_value(snapshot(0)).unwrap();
        assert_eq!(json["state"], "RUNNING");
    }
}
