//! Collaborator seams and their in-process paper implementations

pub mod paper;
pub mod traits;

pub use paper::{
    PaperComponents, PaperExchange, PaperLedger, PaperMarketData, PaperPairManager,
    PaperRiskEngine, SimulatedFeed, VolumeWatchlist,
};
pub use traits::{
    ComponentFactory, ExchangeConnector, MarketDataManager, MarketFeed, PairManager, RiskEngine,
    WatchlistScanner,
};

#[cfg(test)]
pub use traits::{
    MockExchangeConnector, MockMarketDataManager, MockMarketFeed, MockPairManager,
    MockRiskEngine, MockWatchlistScanner,
};
