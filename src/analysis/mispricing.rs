//! Mispricing analysis
//!
//! Pure math relating a forecast to the current book: how much edge is left
//! after the spread, fees and slippage allowance are paid. No I/O.

use rust_decimal::Decimal;

use crate::domain::{Direction, MarketState, PricePoint, Prediction};

/// A tradable discrepancy between forecast and market
#[derive(Debug, Clone)]
pub struct MispricingSignal {
    pub direction: Direction,
    /// Expected net edge as a fraction of mid, after costs
    pub edge: Decimal,
    pub confidence: Decimal,
}

/// Compare a prediction against the current market state.
///
/// Returns `None` when the forecast disagrees with its own direction, when
/// the book is unusable, or when the net edge does not clear `min_edge`.
pub fn evaluate_mispricing(
    state: &MarketState,
    prediction: &Prediction,
    fee_rate: Decimal,
    max_slippage: Decimal,
    min_edge: Decimal,
) -> Option<MispricingSignal> {
    if !state.is_valid() {
        return None;
    }
    let mid = state.mid();
    if mid.is_zero() {
        return None;
    }

    let move_frac = (prediction.predicted_price - mid) / mid;

    // The stated direction must agree with the predicted move
    let consistent = match prediction.direction {
        Direction::Up => move_frac > Decimal::ZERO,
        Direction::Down => move_frac < Decimal::ZERO,
    };
    if !consistent {
        return None;
    }

    // Crossing the spread costs half of it from mid; budget slippage on top
    let costs = fee_rate + state.spread_frac() / Decimal::TWO + max_slippage;
    let edge = move_frac.abs() - costs;
    if edge < min_edge {
        return None;
    }

    Some(MispricingSignal {
        direction: prediction.direction,
        edge,
        confidence: prediction.confidence,
    })
}

/// Mean absolute fractional return over consecutive history points.
///
/// Used to scale position size down in turbulent conditions; returns zero
/// for fewer than two points.
pub fn realized_volatility(history: &[PricePoint]) -> Decimal {
    if history.len() < 2 {
        return Decimal::ZERO;
    }

    let mut total = Decimal::ZERO;
    let mut count = 0u32;
    for pair in history.windows(2) {
        let prev = pair[0].price;
        let next = pair[1].price;
        if prev.is_zero() {
            continue;
        }
        total += ((next - prev) / prev).abs();
        count += 1;
    }

    if count == 0 {
        Decimal::ZERO
    } else {
        total / Decimal::from(count)
    }
}
