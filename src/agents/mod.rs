//! Trading agents
//!
//! Each agent owns the state for one market and implements `TradingAgent`.
//! Agents never retry or back off themselves; failure policy lives in the
//! supervisor's circuit breaker.

pub mod momentum;
pub mod traits;

pub use momentum::{MomentumAgent, MomentumAgentConfig};
pub use traits::TradingAgent;
