//! External collaborator interfaces and their production adapters
//!
//! The runtime core consumes collaborators through these narrow traits;
//! everything behind them (transport, auth, wire formats) is replaceable.

pub mod allora;
pub mod indexer;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExecutionResult, MarketState, Order, PricePoint, Prediction};
use crate::error::Result;

pub use allora::AlloraClient;
pub use indexer::IndexerClient;

/// Blockchain indexer / exchange access for one venue.
///
/// Errors are classified before they leave the adapter: `Transient` feeds
/// the circuit breaker, `Rejected` surfaces to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Current top-of-book snapshot for a market
    async fn get_market_state(&self, market_id: &str) -> Result<MarketState>;

    /// Trailing price history for a market
    async fn get_price_history(
        &self,
        market_id: &str,
        lookback: Duration,
    ) -> Result<Vec<PricePoint>>;

    /// Submit a signed order to the venue
    async fn submit_order(&self, order: &Order) -> Result<ExecutionResult>;
}

/// Price-prediction service access
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Directional forecast for a market over the given horizon
    async fn get_prediction(&self, market_id: &str, horizon: Duration) -> Result<Prediction>;
}
