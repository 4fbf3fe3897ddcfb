//! Runtime supervisor
//!
//! Owns the scheduling loop. Each tick it drives every registered agent in
//! registration order, guarded by the circuit breaker and a per-agent
//! timeout, then samples the resource monitor. A shutdown signal (or a hard
//! memory-ceiling breach) drains the loop: in-flight work may finish within
//! the grace period, after which it is cancelled by dropping its future.
//! Agents apply state only on fully successful executions, so that drop can
//! never leave a partial position update.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::agents::TradingAgent;
use crate::coordination::{CancelToken, CircuitBreaker, CircuitState, CircuitTransition};
use crate::domain::{ExecutionResult, Order, SupervisorState};
use crate::error::{HelmsmanError, Result};
use crate::services::{DecisionOutcome, EventSink, RuntimeEvent};
use crate::supervisor::{ResourceMonitor, ThresholdBreach};

/// Scheduling-loop configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval between tick boundaries
    pub tick_interval: Duration,
    /// Budget for one agent's evaluate+execute within a tick
    pub agent_timeout: Duration,
    /// How long in-flight work may drain after shutdown is requested
    pub drain_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15),
            agent_timeout: Duration::from_secs(10),
            drain_grace: Duration::from_secs(30),
        }
    }
}

/// What one agent did this tick
enum AgentTickResult {
    NoAction,
    Executed {
        order: Order,
        result: ExecutionResult,
    },
}

/// Whether the loop may continue after a tick
enum TickOutcome {
    Continue,
    Exhausted(String),
}

/// Drives registered agents on a fixed interval with supervised failure
/// handling and resource monitoring
pub struct Supervisor {
    config: SupervisorConfig,
    agents: Vec<Box<dyn TradingAgent>>,
    breaker: CircuitBreaker,
    monitor: ResourceMonitor,
    events: Arc<dyn EventSink>,
    cancel: CancelToken,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        breaker: CircuitBreaker,
        monitor: ResourceMonitor,
        events: Arc<dyn EventSink>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            agents: Vec::new(),
            breaker,
            monitor,
            events,
            cancel,
            state: SupervisorState::Starting,
        }
    }

    /// Register an agent. Agents are processed every tick in registration
    /// order.
    pub fn register_agent(&mut self, agent: Box<dyn TradingAgent>) {
        info!(
            agent_id = agent.id(),
            market_id = agent.market_id(),
            "registered agent"
        );
        self.agents.push(agent);
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Circuit state for a collaborator call site (agents keyed by id)
    pub fn circuit_state(&self, collaborator: &str) -> CircuitState {
        self.breaker.state(collaborator)
    }

    /// Read-only view of a registered agent, in registration order
    pub fn agent(&self, idx: usize) -> Option<&dyn TradingAgent> {
        self.agents.get(idx).map(|a| a.as_ref())
    }

    fn transition(&mut self, to: SupervisorState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(HelmsmanError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        let from = self.state;
        self.state = to;
        info!(%from, %to, "supervisor state change");
        self.events.publish(RuntimeEvent::Lifecycle { from, to });
        Ok(())
    }

    /// Run until shutdown is requested or the memory ceiling forces a drain
    pub async fn run(&mut self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(HelmsmanError::Configuration(
                "no agents registered".to_string(),
            ));
        }

        self.transition(SupervisorState::Running)?;

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut exhausted_reason = None;
        loop {
            let cancel = self.cancel.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Run the tick. If shutdown arrives mid-tick the in-flight work
            // gets the grace period, then its future is dropped.
            let grace = self.config.drain_grace;
            let cancel = self.cancel.clone();
            let outcome = tokio::select! {
                outcome = self.run_tick() => Some(outcome),
                _ = async {
                    cancel.cancelled().await;
                    tokio::time::sleep(grace).await;
                } => {
                    warn!(grace = ?grace, "in-flight tick cancelled after grace period");
                    None
                }
            };

            if let Some(TickOutcome::Exhausted(reason)) = outcome {
                error!(reason = %reason, "hard resource ceiling breached, draining");
                exhausted_reason = Some(reason);
                break;
            }

            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.transition(SupervisorState::Draining)?;
        // In-flight work already completed or was cancelled above; nothing
        // is pending by the time we get here.
        self.transition(SupervisorState::Stopped)?;
        info!("supervisor stopped");

        match exhausted_reason {
            Some(reason) => Err(HelmsmanError::ResourceExhaustion(reason)),
            None => Ok(()),
        }
    }

    /// One full cycle: every agent in registration order, then monitoring
    async fn run_tick(&mut self) -> TickOutcome {
        let tick_start = Instant::now();

        for idx in 0..self.agents.len() {
            if self.cancel.is_cancelled() {
                // Draining: don't start work for the remaining agents
                break;
            }
            self.run_agent_tick(idx).await;
        }

        // Monitoring always runs after the agents in a cycle
        let tick_duration = tick_start.elapsed();
        let sample = self.monitor.sample(tick_duration);
        debug!(
            resident_mb = sample.resident_bytes / (1024 * 1024),
            tick_ms = tick_duration.as_millis() as u64,
            "tick complete"
        );

        let mut exhausted = None;
        for breach in self.monitor.check_thresholds() {
            match breach {
                ThresholdBreach::MemoryWarning {
                    resident_bytes,
                    threshold_bytes,
                } => {
                    self.events.publish(RuntimeEvent::Warning {
                        source: "resource_monitor".to_string(),
                        message: format!(
                            "resident memory {}MB above warning threshold {}MB",
                            resident_bytes / (1024 * 1024),
                            threshold_bytes / (1024 * 1024)
                        ),
                    });
                    // Mitigation: shed agent history buffers
                    for agent in &mut self.agents {
                        agent.prune_history();
                    }
                }
                ThresholdBreach::PerformanceDegradation {
                    rolling_avg,
                    baseline,
                } => {
                    self.events.publish(RuntimeEvent::Warning {
                        source: "resource_monitor".to_string(),
                        message: format!(
                            "average tick {}ms degraded past baseline {}ms",
                            rolling_avg.as_millis(),
                            baseline.as_millis()
                        ),
                    });
                }
                ThresholdBreach::MemoryExhausted {
                    resident_bytes,
                    ceiling_bytes,
                } => {
                    let message = format!(
                        "resident memory {}MB breached hard ceiling {}MB",
                        resident_bytes / (1024 * 1024),
                        ceiling_bytes / (1024 * 1024)
                    );
                    self.events.publish(RuntimeEvent::Warning {
                        source: "resource_monitor".to_string(),
                        message: message.clone(),
                    });
                    exhausted = Some(message);
                }
            }
        }

        match exhausted {
            Some(reason) => TickOutcome::Exhausted(reason),
            None => TickOutcome::Continue,
        }
    }

    /// Drive one agent through its guarded evaluate/execute cycle
    async fn run_agent_tick(&mut self, idx: usize) {
        let agent_id = self.agents[idx].id().to_string();
        let market_id = self.agents[idx].market_id().to_string();

        match self.breaker.before_call(&agent_id) {
            Ok(None) => {}
            Ok(Some(transition)) => self.publish_circuit(transition),
            Err(HelmsmanError::CircuitOpen { retry_in, .. }) => {
                debug!(agent_id = %agent_id, ?retry_in, "circuit open, skipping agent tick");
                return;
            }
            Err(e) => {
                debug!(agent_id = %agent_id, "call not permitted: {}", e);
                return;
            }
        }

        let timeout = self.config.agent_timeout;
        let cancel = self.cancel.clone();
        let agent = &mut self.agents[idx];

        let tick_result = tokio::time::timeout(timeout, async {
            match agent.evaluate_market(&cancel).await? {
                None => Ok(AgentTickResult::NoAction),
                Some(decision) => {
                    let order = decision.order.clone();
                    let result = agent.execute_decision(decision, &cancel).await?;
                    Ok(AgentTickResult::Executed { order, result })
                }
            }
        })
        .await;

        match tick_result {
            Err(_elapsed) => {
                // A timed-out collaborator counts as a transient failure
                warn!(agent_id = %agent_id, ?timeout, "agent tick timed out");
                if let Some(t) = self.breaker.record_failure(&agent_id) {
                    self.publish_circuit(t);
                }
            }
            Ok(Ok(AgentTickResult::NoAction)) => {
                if let Some(t) = self.breaker.record_success(&agent_id) {
                    self.publish_circuit(t);
                }
            }
            Ok(Ok(AgentTickResult::Executed { order, result })) => {
                if let Some(t) = self.breaker.record_success(&agent_id) {
                    self.publish_circuit(t);
                }
                self.events.publish(RuntimeEvent::Decision {
                    agent_id,
                    market_id,
                    order: Some(order),
                    outcome: DecisionOutcome::Executed {
                        fill_price: result.fill_price,
                        filled_quantity: result.filled_quantity,
                    },
                });
            }
            Ok(Err(e)) => self.handle_agent_error(agent_id, market_id, e),
        }
    }

    fn handle_agent_error(&mut self, agent_id: String, market_id: String, err: HelmsmanError) {
        match err {
            HelmsmanError::Rejected(reason) => {
                // A considered "no" from the venue or the risk gate; the
                // breaker is untouched in either direction
                self.events.publish(RuntimeEvent::Decision {
                    agent_id,
                    market_id,
                    order: None,
                    outcome: DecisionOutcome::Rejected { reason },
                });
            }
            HelmsmanError::Cancelled => {
                debug!(agent_id = %agent_id, "agent tick cancelled");
            }
            e if e.is_transient() => {
                warn!(agent_id = %agent_id, "transient collaborator failure: {}", e);
                if let Some(t) = self.breaker.record_failure(&agent_id) {
                    self.publish_circuit(t);
                }
            }
            e => {
                // Malformed data and other non-transient faults: logged and
                // surfaced, retried on the next tick without breaker effect
                warn!(agent_id = %agent_id, market_id = %market_id, "agent tick failed: {}", e);
                self.events.publish(RuntimeEvent::Decision {
                    agent_id,
                    market_id,
                    order: None,
                    outcome: DecisionOutcome::Failed {
                        reason: e.to_string(),
                    },
                });
            }
        }
    }

    fn publish_circuit(&self, transition: CircuitTransition) {
        self.events.publish(RuntimeEvent::CircuitStateChange {
            collaborator: transition.collaborator,
            from: transition.from,
            to: transition.to,
        });
    }
}
