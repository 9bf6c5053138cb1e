//! Task supervisor
//!
//! Runs each periodic loop as an isolated tokio task inside a `JoinSet`.
//! Failures and panics become `"<name>: <message>"` entries in the status
//! register instead of taking the process down. Units are never restarted.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::bot::status::StatusRegister;
use crate::error::{Result, VigilError};

/// How a monitored unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed,
    Cancelled,
    Failed(String),
    Panicked(String),
}

/// Names of the units currently running. Cheap to clone and read from
/// anywhere.
#[derive(Debug, Clone, Default)]
pub struct LiveUnits(Arc<RwLock<BTreeSet<String>>>);

impl LiveUnits {
    pub fn names(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, name: &str) {
        self.0
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
    }
}

/// Removes the unit from the live set and stops its inner task when the
/// wrapper finishes or is dropped. This is the only removal path.
struct UnitGuard {
    name: String,
    live: LiveUnits,
    inner: Option<AbortHandle>,
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.take() {
            handle.abort();
        }
        self.live
            .0
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
        debug!(unit = %self.name, "unit left live set");
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct TaskSupervisor {
    units: JoinSet<(String, UnitOutcome)>,
    live: LiveUnits,
    status: Arc<StatusRegister>,
}

impl TaskSupervisor {
    pub fn new(status: Arc<StatusRegister>, live: LiveUnits) -> Self {
        Self {
            units: JoinSet::new(),
            live,
            status,
        }
    }

    pub fn live_units(&self) -> &LiveUnits {
        &self.live
    }

    /// Spawn `fut` as a monitored unit named `name`
    pub fn spawn<F>(&mut self, name: &str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.to_string();
        self.live.insert(&name);
        let status = self.status.clone();
        // Owned by the wrapper future, so it also runs if the wrapper is
        // aborted before its first poll
        let mut guard = UnitGuard {
            name: name.clone(),
            live: self.live.clone(),
            inner: None,
        };
        debug!(unit = %name, "unit spawned");

        self.units.spawn(async move {
            // The inner task isolates panics from the wrapper
            let inner = tokio::spawn(fut);
            guard.inner = Some(inner.abort_handle());

            let outcome = match inner.await {
                Ok(Ok(())) => UnitOutcome::Completed,
                Ok(Err(e)) if e.is_cancelled() => UnitOutcome::Cancelled,
                Ok(Err(e)) => UnitOutcome::Failed(e.to_string()),
                Err(e) if e.is_panic() => UnitOutcome::Panicked(panic_message(e)),
                Err(_) => UnitOutcome::Cancelled,
            };
            guard.inner = None;

            match &outcome {
                UnitOutcome::Completed => info!(unit = %name, "unit finished"),
                UnitOutcome::Cancelled => info!(unit = %name, "unit cancelled"),
                UnitOutcome::Failed(msg) | UnitOutcome::Panicked(msg) => {
                    error!(unit = %name, error = %msg, "unit crashed");
                    status.record_error(format!("{name}: {msg}"));
                }
            }
            drop(guard);
            (name, outcome)
        });
    }

    /// Wait for every unit. A `JoinError` escaping a wrapper means the
    /// group itself failed; that is returned as an error.
    pub async fn join_all(&mut self) -> Result<Vec<(String, UnitOutcome)>> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.units.join_next().await {
            match joined {
                Ok(done) => outcomes.push(done),
                Err(e) if e.is_cancelled() => {
                    warn!("supervised unit wrapper cancelled");
                }
                Err(e) => {
                    let msg = if e.is_panic() {
                        panic_message(e)
                    } else {
                        e.to_string()
                    };
                    return Err(VigilError::Internal(format!("task group failed: {msg}")));
                }
            }
        }
        Ok(outcomes)
    }

    /// Abort every unit still running
    pub fn abort_all(&mut self) {
        self.units.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn supervisor() -> (TaskSupervisor, Arc<StatusRegister>) {
        let status = Arc::new(StatusRegister::new());
        (TaskSupervisor::new(status.clone(), LiveUnits::default()), status)
    }

    #[tokio::test]
    async fn test_failure_is_recorded_with_name() {
        let (mut sup, status) = supervisor();
        sup.spawn("scanner", async {
            Err::<(), _>(VigilError::MarketData("boom".to_string()))
        });
        let outcomes = sup.join_all().await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, UnitOutcome::Failed(_)));
        assert_eq!(status.errors(), vec!["scanner: Market data error: boom".to_string()]);
        assert!(sup.live_units().is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (mut sup, status) = supervisor();
        sup.spawn("risk", async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        sup.spawn("health", async { Ok(()) });
        let mut outcomes = sup.join_all().await.unwrap();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(outcomes[0], ("health".to_string(), UnitOutcome::Completed));
        assert_eq!(outcomes[1], ("risk".to_string(), UnitOutcome::Panicked("kaboom".to_string())));
        assert_eq!(status.errors(), vec!["risk: kaboom".to_string()]);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_an_error() {
        let (mut sup, status) = supervisor();
        sup.spawn("strategy", async { Err::<(), _>(VigilError::Cancelled) });
        let outcomes = sup.join_all().await.unwrap();
        assert_eq!(outcomes[0].1, UnitOutcome::Cancelled);
        assert!(status.errors().is_empty());
    }

    #[tokio::test]
    async fn test_live_set_tracks_running_units() {
        let (mut sup, _) = supervisor();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        sup.spawn("performance", async move {
            let _ = rx.await;
            Ok(())
        });
        assert!(sup.live_units().contains("performance"));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), sup.join_all())
            .await
            .unwrap()
            .unwrap();
        assert!(!sup.live_units().contains("performance"));
    }

    #[tokio::test]
    async fn test_abort_all_empties_live_set() {
        let (mut sup, _) = supervisor();
        sup.spawn("stuck", async {
            std::future::pending::<()>().await;
            Ok(())
        });
        sup.abort_all();
        sup.join_all().await.unwrap();
        assert!(sup.live_units().is_empty());
    }
}
