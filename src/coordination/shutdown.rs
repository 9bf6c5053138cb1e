//! Shutdown coordination
//!
//! A single [`ShutdownController`] owns the request flag and the completion
//! latch. Loops hold cheap [`ShutdownToken`] clones and race their sleeps
//! against [`ShutdownToken::cancelled`]. Signal listeners only request; the
//! bot's run loop performs the actual teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Why shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// `TradingBot::shutdown` called directly
    Requested,
    /// Every loop exited on its own
    LoopsFinished,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::Terminate => write!(f, "terminate"),
            ShutdownReason::Requested => write!(f, "requested"),
            ShutdownReason::LoopsFinished => write!(f, "loops finished"),
        }
    }
}

/// Owner side of the shutdown request and completion signals
#[derive(Debug)]
pub struct ShutdownController {
    requested_tx: watch::Sender<bool>,
    completed_tx: watch::Sender<bool>,
    completed: AtomicBool,
    claimed: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (requested_tx, _) = watch::channel(false);
        let (completed_tx, _) = watch::channel(false);
        Self {
            requested_tx,
            completed_tx,
            completed: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        }
    }

    /// Token observed by loops and waiters
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            requested_rx: self.requested_tx.subscribe(),
            completed_rx: self.completed_tx.subscribe(),
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.requested_tx.borrow()
    }

    /// Raise the request flag. Returns false when it was already raised.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let first = self.requested_tx.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        });
        if first {
            info!(%reason, "shutdown requested");
        } else {
            warn!(%reason, "shutdown already requested");
        }
        first
    }

    /// Take ownership of this run's teardown. Exactly one caller gets true
    /// until the next [`rearm`](Self::rearm).
    pub fn claim_teardown(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Fire the completion latch. Only the first call has any effect.
    pub fn complete(&self) -> bool {
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.completed_tx.send_replace(true);
        info!("shutdown complete");
        true
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Allow another run after a completed shutdown. Only valid once every
    /// loop from the previous run has exited.
    pub fn rearm(&self) {
        self.requested_tx.send_replace(false);
        self.completed_tx.send_replace(false);
        self.completed.store(false, Ordering::SeqCst);
        self.claimed.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side, cloned into every loop
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    requested_rx: watch::Receiver<bool>,
    completed_rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.requested_rx.borrow()
    }

    /// Resolves once shutdown is requested (immediately if it already was)
    pub async fn cancelled(&mut self) {
        // A closed channel means the controller is gone; treat that as a request
        let _ = self.requested_rx.wait_for(|requested| *requested).await;
    }

    /// Resolves once teardown has finished
    pub async fn completed(&mut self) {
        let _ = self.completed_rx.wait_for(|done| *done).await;
    }
}

/// Listen for SIGINT/SIGTERM and turn them into shutdown requests.
/// Teardown itself happens wherever the token is observed.
pub fn install_signal_handlers(controller: Arc<ShutdownController>) {
    let ctrl_c = controller.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C");
                ctrl_c.request(ShutdownReason::Interrupt);
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    controller.request(ShutdownReason::Terminate);
                }
                Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reason_display() {
        assert_eq!(ShutdownReason::Interrupt.to_string(), "interrupt");
        assert_eq!(ShutdownReason::LoopsFinished.to_string(), "loops finished");
    }

    #[tokio::test]
    async fn test_request_is_idempotent() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert!(!token.is_cancelled());

        assert!(controller.request(ShutdownReason::Requested));
        assert!(!controller.request(ShutdownReason::Interrupt));
        assert!(token.is_cancelled());
        assert!(controller.is_requested());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let controller = Arc::new(ShutdownController::new());
        let mut token = controller.token();

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });
        controller.request(ShutdownReason::Requested);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[test]
    fn test_cancelled_pending_until_requested() {
        let controller = ShutdownController::new();
        let mut token = controller.token();
        let mut cancelled = tokio_test::task::spawn(async move { token.cancelled().await });

        tokio_test::assert_pending!(cancelled.poll());
        controller.request(ShutdownReason::Interrupt);
        assert!(cancelled.is_woken());
        tokio_test::assert_ready!(cancelled.poll());
    }

    #[tokio::test]
    async fn test_completion_fires_once() {
        let controller = ShutdownController::new();
        let mut token = controller.token();
        assert!(controller.complete());
        assert!(!controller.complete());
        token.completed().await;
        assert!(controller.is_complete());
    }

    #[tokio::test]
    async fn test_rearm_clears_flags() {
        let controller = ShutdownController::new();
        controller.request(ShutdownReason::Requested);
        controller.complete();
        controller.rearm();
        assert!(!controller.is_requested());
        assert!(!controller.is_complete());
        assert!(controller.complete());
    }

    #[test]
    fn test_teardown_claimed_once_per_run() {
        let controller = ShutdownController::new();
        assert!(controller.claim_teardown());
        assert!(!controller.claim_teardown());
        controller.complete();
        assert!(!controller.claim_teardown());

        controller.rearm();
        assert!(controller.claim_teardown());
    }
}
