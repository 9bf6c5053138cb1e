use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info};

use crate::adapters::traits::ExchangeConnector;
use crate::config::Credentials;
use crate::error::Result;

/// Simulated exchange session. Orders never leave the process, so no
/// credentials are checked; only the connection flag is modelled.
pub struct PaperExchange {
    name: String,
    testnet: bool,
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    connect_calls: AtomicU32,
    close_calls: AtomicU32,
}

impl PaperExchange {
    pub fn new(name: &str, testnet: bool) -> Self {
        Self {
            name: name.to_string(),
            testnet,
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
        }
    }

    /// Make subsequent handshakes return `Ok(false)`
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Drop the session as if the venue closed it
    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeConnector for PaperExchange {
    async fn connect(&self, _credentials: Credentials) -> Result<bool> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect.load(Ordering::SeqCst) {
            debug!(exchange = %self.name, "paper exchange refused connection");
            return Ok(false);
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(exchange = %self.name, testnet = self.testnet, "paper exchange connected");
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        debug!(exchange = %self.name, "paper exchange closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            api_key: String::new(),
            api_secret: String::new(),
        }
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let exchange = PaperExchange::new("binance", true);
        assert!(!exchange.is_connected());
        assert!(exchange.connect(creds()).await.unwrap());
        assert!(exchange.is_connected());
        exchange.close().await.unwrap();
        assert!(!exchange.is_connected());
        assert_eq!(exchange.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_refused_connect_stays_disconnected() {
        let exchange = PaperExchange::new("binance", true);
        exchange.set_refuse_connect(true);
        assert!(!exchange.connect(creds()).await.unwrap());
        assert!(!exchange.is_connected());
        assert_eq!(exchange.connect_calls(), 1);
    }
}
