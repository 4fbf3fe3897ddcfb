pub mod mispricing;

pub use mispricing::{evaluate_mispricing, realized_volatility, MispricingSignal};
