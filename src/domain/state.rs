use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::Side;

/// Runtime supervisor state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupervisorState {
    /// Loading configuration, constructing agents and collaborators
    Starting,
    /// Ticking on the configured interval
    Running,
    /// Shutdown requested, in-flight work draining within the grace period
    Draining,
    /// Terminal, all resources released
    Stopped,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Starting => "STARTING",
            SupervisorState::Running => "RUNNING",
            SupervisorState::Draining => "DRAINING",
            SupervisorState::Stopped => "STOPPED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: SupervisorState) -> bool {
        use SupervisorState::*;

        matches!(
            (self, target),
            (Starting, Running) | (Running, Draining) | (Draining, Stopped)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Stopped)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open position held by an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub quantity: Decimal,
    /// Volume-weighted average entry price; zero while flat
    pub entry_price: Decimal,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Per-agent mutable state, owned exclusively by its agent.
///
/// Mutation happens only inside the owning agent's tick, and only after an
/// execution fully succeeds, so a cancelled tick can never leave a partial
/// update behind.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub agent_id: String,
    pub position: Position,
    pub realized_pnl: Decimal,
    pub last_decision_at: Option<DateTime<Utc>>,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    trading_day: NaiveDate,
    cooldown_until: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            position: Position::default(),
            realized_pnl: Decimal::ZERO,
            last_decision_at: None,
            consecutive_losses: 0,
            trades_today: 0,
            trading_day: now.date_naive(),
            cooldown_until: None,
        }
    }

    /// Reset the daily trade counter when the UTC day rolls over
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.trading_day {
            self.trading_day = today;
            self.trades_today = 0;
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    /// Stamp a decision as taken this tick
    pub fn record_decision(&mut self, now: DateTime<Utc>) {
        self.last_decision_at = Some(now);
        self.trades_today += 1;
    }

    /// Apply a fill to the position and return the realized P&L delta.
    ///
    /// Buys extend the position at a volume-weighted entry price; sells
    /// realize P&L against the entry and are clamped to the held quantity.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal) -> Decimal {
        match side {
            Side::Buy => {
                let old_notional = self.position.quantity * self.position.entry_price;
                let new_quantity = self.position.quantity + quantity;
                if new_quantity > Decimal::ZERO {
                    self.position.entry_price = (old_notional + quantity * price) / new_quantity;
                }
                self.position.quantity = new_quantity;
                Decimal::ZERO
            }
            Side::Sell => {
                let closed = quantity.min(self.position.quantity);
                let realized = (price - self.position.entry_price) * closed;
                self.position.quantity -= closed;
                if self.position.is_flat() {
                    self.position.entry_price = Decimal::ZERO;
                }
                self.realized_pnl += realized;
                realized
            }
        }
    }

    /// Record a loss (failed execution or losing close); entering cooldown
    /// once the streak reaches the configured threshold
    pub fn record_loss(&mut self, now: DateTime<Utc>, cooldown: Duration, threshold: u32) {
        self.consecutive_losses += 1;
        if self.consecutive_losses >= threshold {
            let cooldown = ChronoDuration::from_std(cooldown).unwrap_or(ChronoDuration::zero());
            self.cooldown_until = Some(now + cooldown);
        }
    }

    /// A winning close clears the loss streak and any pending cooldown
    pub fn record_win(&mut self) {
        self.consecutive_losses = 0;
        self.cooldown_until = None;
    }
}
