use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::adapters::traits::MarketFeed;
use crate::domain::{DataType, FeedMetrics, MarketPayload, MarketUpdate, Ticker, UpdateCallback};
use crate::error::Result;

const LATENCY_WINDOW: usize = 100;

struct Subscription {
    data_types: Vec<DataType>,
    callback: UpdateCallback,
}

/// In-process market feed. Updates are injected with [`SimulatedFeed::publish`]
/// and routed to subscribers exactly like a streaming connection would.
pub struct SimulatedFeed {
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    connect_calls: AtomicU32,
    updates_received: AtomicU64,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    tickers: RwLock<HashMap<String, Ticker>>,
    latencies: Mutex<VecDeque<Duration>>,
}

impl SimulatedFeed {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            updates_received: AtomicU64::new(0),
            subscriptions: RwLock::new(HashMap::new()),
            tickers: RwLock::new(HashMap::new()),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Drop the stream as if the socket closed
    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self, symbol: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver an update to matching subscribers. Returns how many callbacks
    /// ran; nothing is delivered while disconnected.
    pub fn publish(&self, update: MarketUpdate) -> usize {
        if !self.connected.load(Ordering::SeqCst) {
            return 0;
        }

        self.updates_received.fetch_add(1, Ordering::Relaxed);
        {
            let mut latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
            if latencies.len() == LATENCY_WINDOW {
                latencies.pop_front();
            }
            latencies.push_back(update.latency);
        }
        if let MarketPayload::Ticker(ticker) = &update.payload {
            self.tickers
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(update.symbol.clone(), ticker.clone());
        }

        // Callbacks run outside the lock so they may subscribe in turn
        let data_type = update.data_type();
        let callbacks: Vec<UpdateCallback> = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&update.symbol)
            .map(|subs| {
                subs.iter()
                    .filter(|s| s.data_types.contains(&data_type))
                    .map(|s| s.callback.clone())
                    .collect()
            })
            .unwrap_or_default();

        for callback in &callbacks {
            callback(update.clone());
        }
        callbacks.len()
    }
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketFeed for SimulatedFeed {
    async fn connect(&self) -> Result<bool> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("simulated feed connected");
        Ok(true)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        info!("simulated feed disconnected");
        Ok(())
    }

    fn subscribe(
        &self,
        symbol: &str,
        data_types: Vec<DataType>,
        callback: UpdateCallback,
    ) -> Result<()> {
        debug!(symbol, ?data_types, "feed subscription added");
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(symbol.to_string())
            .or_default()
            .push(Subscription {
                data_types,
                callback,
            });
        Ok(())
    }

    fn ticker(&self, symbol: &str) -> Option<Ticker> {
        self.tickers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .cloned()
    }

    fn metrics(&self) -> FeedMetrics {
        let latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
        let avg_latency = if latencies.is_empty() {
            Duration::ZERO
        } else {
            latencies.iter().sum::<Duration>() / latencies.len() as u32
        };
        FeedMetrics {
            connected: self.connected.load(Ordering::SeqCst),
            avg_latency,
            updates_received: self.updates_received.load(Ordering::Relaxed),
        }
    }
}
