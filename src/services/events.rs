//! Structured runtime events
//!
//! The supervisor publishes these fire-and-forget; sinks must never block
//! the loop.

use rust_decimal::Decimal;

use crate::coordination::CircuitState;
use crate::domain::{Order, SupervisorState};

/// Outcome of an agent decision for event reporting
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    Executed {
        fill_price: Decimal,
        filled_quantity: Decimal,
    },
    Rejected {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Executed { .. } => "executed",
            DecisionOutcome::Rejected { .. } => "rejected",
            DecisionOutcome::Failed { .. } => "failed",
        }
    }
}

/// Events emitted by the runtime core
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// An agent produced (or failed to produce) an executable decision
    Decision {
        agent_id: String,
        market_id: String,
        order: Option<Order>,
        outcome: DecisionOutcome,
    },
    /// A resource or performance threshold was breached
    Warning { source: String, message: String },
    /// A collaborator circuit changed state
    CircuitStateChange {
        collaborator: String,
        from: CircuitState,
        to: CircuitState,
    },
    /// The supervisor state machine advanced
    Lifecycle {
        from: SupervisorState,
        to: SupervisorState,
    },
}

/// Sink for runtime events. Implementations must be non-blocking.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RuntimeEvent);
}

/// Default sink: structured tracing output
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Decision {
                agent_id,
                market_id,
                order,
                outcome,
            } => match &outcome {
                DecisionOutcome::Executed {
                    fill_price,
                    filled_quantity,
                } => {
                    tracing::info!(
                        agent_id = %agent_id,
                        market_id = %market_id,
                        side = order.as_ref().map(|o| o.side.as_str()),
                        %fill_price,
                        %filled_quantity,
                        outcome = outcome.as_str(),
                        "decision"
                    );
                }
                DecisionOutcome::Rejected { reason } | DecisionOutcome::Failed { reason } => {
                    tracing::warn!(
                        agent_id = %agent_id,
                        market_id = %market_id,
                        reason = %reason,
                        outcome = outcome.as_str(),
                        "decision"
                    );
                }
            },
            RuntimeEvent::Warning { source, message } => {
                tracing::warn!(source = %source, "{}", message);
            }
            RuntimeEvent::CircuitStateChange {
                collaborator,
                from,
                to,
            } => {
                tracing::warn!(collaborator = %collaborator, %from, %to, "circuit state change");
            }
            RuntimeEvent::Lifecycle { from, to } => {
                tracing::info!(%from, %to, "supervisor state change");
            }
        }
    }
}
