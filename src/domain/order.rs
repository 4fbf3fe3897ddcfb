use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A limit order to be submitted to the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub market_id: String,
    pub side: Side,
    pub quantity: Decimal,
    pub limit_price: Decimal,
    /// Protective stop price, derived from the market's stop-loss fraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
}

impl Order {
    /// Quote-denominated notional value at the limit price
    pub fn notional(&self) -> Decimal {
        self.quantity * self.limit_price
    }
}

/// An agent's proposed trading action, validated against risk parameters
/// before execution
#[derive(Debug, Clone)]
pub struct Decision {
    pub decision_id: Uuid,
    pub order: Order,
    /// Net expected edge (fraction of mid) that motivated the decision
    pub edge: Decimal,
    /// Confidence carried over from the prediction
    pub confidence: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(order: Order, edge: Decimal, confidence: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            order,
            edge,
            confidence,
            created_at: at,
        }
    }
}

/// Venue acknowledgment of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_hash: String,
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}
