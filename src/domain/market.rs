use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of a spot market at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub market_id: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub last_price: Decimal,
    /// Quote-denominated volume over the trailing 24h
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketState {
    /// Mid price between best bid and best ask
    pub fn mid(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    /// Absolute bid/ask spread
    pub fn spread(&self) -> Decimal {
        self.best_ask - self.best_bid
    }

    /// Spread as a fraction of mid (zero when the book is empty)
    pub fn spread_frac(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            Decimal::ZERO
        } else {
            self.spread() / mid
        }
    }

    /// Is this snapshot usable for trading decisions?
    pub fn is_valid(&self) -> bool {
        self.best_bid > Decimal::ZERO && self.best_ask >= self.best_bid
    }
}

/// One historical trade/candle point from the indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Predicted price direction over the horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Forecast returned by the prediction service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub market_id: String,
    pub direction: Direction,
    pub predicted_price: Decimal,
    /// Model confidence in [0, 1]
    pub confidence: Decimal,
    /// Confidence interval around the predicted price
    pub interval_low: Decimal,
    pub interval_high: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Prediction {
    /// Width of the confidence interval as a fraction of the predicted price
    pub fn interval_width_frac(&self) -> Decimal {
        if self.predicted_price.is_zero() {
            Decimal::ZERO
        } else {
            (self.interval_high - self.interval_low) / self.predicted_price
        }
    }
}
