//! TradingAgent trait — the supervisor's view of an agent
//!
//! Agents are driven by the supervisor's tick loop: one `evaluate_market`
//! per tick, followed by `execute_decision` when the evaluation produced an
//! actionable decision. Collaborator failures propagate out unchanged so the
//! supervisor can feed them to the circuit breaker; agents do not retry.

use async_trait::async_trait;

use crate::config::RiskParameters;
use crate::coordination::CancelToken;
use crate::domain::{AgentState, Decision, ExecutionResult};
use crate::error::Result;

#[async_trait]
pub trait TradingAgent: Send {
    /// Unique identifier for this agent instance; doubles as its circuit
    /// breaker call-site key
    fn id(&self) -> &str;

    /// Market this agent trades
    fn market_id(&self) -> &str;

    /// Risk parameters this agent operates under
    fn risk_params(&self) -> &RiskParameters;

    /// Read-only view of the agent's state
    fn state(&self) -> &AgentState;

    /// Inspect market and forecast; return an actionable decision or `None`.
    ///
    /// Must short-circuit to `None` during cooldown or when the daily trade
    /// budget is spent, and must never return a decision that violates the
    /// risk parameters.
    async fn evaluate_market(&mut self, cancel: &CancelToken) -> Result<Option<Decision>>;

    /// Submit a decision to the venue. State is updated only when the
    /// submission fully succeeds.
    async fn execute_decision(
        &mut self,
        decision: Decision,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult>;

    /// Shed historical buffers under memory pressure
    fn prune_history(&mut self);
}
