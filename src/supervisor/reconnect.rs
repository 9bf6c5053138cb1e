use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::{ExchangeConnector, MarketFeed};
use crate::bot::bounded;
use crate::config::ExchangeConfig;
use crate::error::Result;

/// Average feed latency above which a warning is logged
pub const HIGH_LATENCY: Duration = Duration::from_millis(200);

/// Result of one reconnect decision for a single collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectAttempt {
    /// Connection was live, nothing done
    NotNeeded,
    /// Liveness check not applicable (handshake skipped by config)
    Skipped,
    Reconnected,
    /// Handshake returned false
    Refused,
    Failed(String),
}

/// One health check pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub feed: ReconnectAttempt,
    pub exchange: ReconnectAttempt,
    pub avg_latency: Duration,
    pub high_latency: bool,
}

impl HealthReport {
    /// Error lines for the status register
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, attempt) in [("market feed", &self.feed), ("exchange", &self.exchange)] {
            match attempt {
                ReconnectAttempt::Refused => out.push(format!("{name} reconnect refused")),
                ReconnectAttempt::Failed(msg) => {
                    out.push(format!("{name} reconnect failed: {msg}"))
                }
                _ => {}
            }
        }
        out
    }
}

/// Liveness checks for the feed and the exchange. Each is probed
/// independently and gets at most one connect call per pass; a failed
/// reconnect waits for the next pass.
pub struct ReconnectionManager {
    feed: Arc<dyn MarketFeed>,
    exchange: Arc<dyn ExchangeConnector>,
    exchange_config: ExchangeConfig,
    call_timeout: Duration,
}

impl ReconnectionManager {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        exchange: Arc<dyn ExchangeConnector>,
        exchange_config: ExchangeConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            feed,
            exchange,
            exchange_config,
            call_timeout,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let metrics = self.feed.metrics();

        let feed = if metrics.connected {
            ReconnectAttempt::NotNeeded
        } else {
            warn!("market feed disconnected, reconnecting");
            Self::attempt("feed reconnect", self.call_timeout, self.feed.connect()).await
        };

        let exchange = if self.exchange_config.skip_connection {
            ReconnectAttempt::Skipped
        } else if self.exchange.is_connected() {
            ReconnectAttempt::NotNeeded
        } else {
            warn!(exchange = %self.exchange_config.name, "exchange disconnected, reconnecting");
            let credentials = self.exchange_config.credentials();
            Self::attempt(
                "exchange reconnect",
                self.call_timeout,
                self.exchange.connect(credentials),
            )
            .await
        };

        let high_latency = metrics.avg_latency > HIGH_LATENCY;
        if high_latency {
            warn!(
                avg_latency_ms = metrics.avg_latency.as_millis() as u64,
                "high average feed latency"
            );
        }

        HealthReport {
            feed,
            exchange,
            avg_latency: metrics.avg_latency,
            high_latency,
        }
    }

    async fn attempt(
        operation: &str,
        limit: Duration,
        connect: impl std::future::Future<Output = Result<bool>>,
    ) -> ReconnectAttempt {
        match bounded(operation, limit, connect).await {
            Ok(true) => {
                info!(operation, "reconnected");
                ReconnectAttempt::Reconnected
            }
            Ok(false) => {
                warn!(operation, "reconnect refused");
                ReconnectAttempt::Refused
            }
            Err(e) => {
                warn!(operation, error = %e, "reconnect failed");
                ReconnectAttempt::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockExchangeConnector, MockMarketFeed};
    use crate::config::AppConfig;
    use crate::domain::FeedMetrics;

    fn feed(connected: bool, latency_ms: u64, connects: usize) -> MockMarketFeed {
        let mut feed = MockMarketFeed::new();
        feed.expect_metrics().returning(move || FeedMetrics {
            connected,
            avg_latency: Duration::from_millis(latency_ms),
            updates_received: 0,
        });
        feed.expect_connect().times(connects).returning(|| Ok(true));
        feed
    }

    fn exchange(connected: bool, connects: usize) -> MockExchangeConnector {
        let mut exchange = MockExchangeConnector::new();
        exchange.expect_is_connected().return_const(connected);
        exchange.expect_connect().times(connects).returning(|_| Ok(false));
        exchange
    }

    fn manager(feed: MockMarketFeed, exchange: MockExchangeConnector) -> ReconnectionManager {
        ReconnectionManager::new(
            Arc::new(feed),
            Arc::new(exchange),
            AppConfig::default_config(&["BTC/USDT"]).exchange,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_disconnected_feed_gets_exactly_one_connect() {
        let report = manager(feed(false, 10, 1), exchange(true, 0)).check().await;
        assert_eq!(report.feed, ReconnectAttempt::Reconnected);
        assert_eq!(report.exchange, ReconnectAttempt::NotNeeded);
        assert!(report.failures().is_empty());
    }

    #[tokio::test]
    async fn test_checks_are_independent() {
        let report = manager(feed(true, 10, 0), exchange(false, 1)).check().await;
        assert_eq!(report.feed, ReconnectAttempt::NotNeeded);
        assert_eq!(report.exchange, ReconnectAttempt::Refused);
        assert_eq!(report.failures(), vec!["exchange reconnect refused".to_string()]);
    }

    #[tokio::test]
    async fn test_high_latency_is_flagged_without_action() {
        let report = manager(feed(true, 250, 0), exchange(true, 0)).check().await;
        assert!(report.high_latency);
        assert_eq!(report.feed, ReconnectAttempt::NotNeeded);
    }

    #[tokio::test]
    async fn test_skip_connection_ignores_exchange() {
        let mut config = AppConfig::default_config(&["BTC/USDT"]).exchange;
        config.skip_connection = true;
        let manager = ReconnectionManager::new(
            Arc::new(feed(true, 10, 0)),
            Arc::new(exchange(false, 0)),
            config,
            Duration::from_secs(5),
        );
        assert_eq!(manager.check().await.exchange, ReconnectAttempt::Skipped);
    }
}
