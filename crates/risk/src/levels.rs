//! Stop-loss and take-profit arithmetic.
//!
//! All functions are pure. Callers are responsible for passing a defined ATR;
//! nothing here clamps or validates prices.

use common::{Direction, RiskLevels};

/// Stop beyond the swept level by `atr_multiplier × atr`: below it for a
/// bullish sweep, above it for a bearish one.
pub fn stop_loss(sweep_price: f64, direction: Direction, atr_multiplier: f64, atr: f64) -> f64 {
    match direction {
        Direction::Bullish => sweep_price - atr_multiplier * atr,
        Direction::Bearish => sweep_price + atr_multiplier * atr,
    }
}

/// Target at `risk_reward_ratio` times the entry-to-stop distance.
///
/// The trade side is inferred from the stop: a stop below the entry means a
/// long, anything else a short. With `entry == stop` the risk is zero and
/// the target equals the entry.
pub fn take_profit(entry_price: f64, stop_loss: f64, risk_reward_ratio: f64) -> f64 {
    let risk = (entry_price - stop_loss).abs();
    if entry_price > stop_loss {
        entry_price + risk_reward_ratio * risk
    } else {
        entry_price - risk_reward_ratio * risk
    }
}

/// Both levels for a trade entered at `entry_price` after a sweep of
/// `sweep_price`.
pub fn risk_levels(
    sweep_price: f64,
    direction: Direction,
    entry_price: f64,
    atr: f64,
    atr_multiplier: f64,
    risk_reward_ratio: f64,
) -> RiskLevels {
    let stop = stop_loss(sweep_price, direction, atr_multiplier, atr);
    RiskLevels {
        stop_loss: stop,
        take_profit: take_profit(entry_price, stop, risk_reward_ratio),
    }
}

/// Trailing stop `trailing_multiplier × atr` away from `price`, never looser
/// than `current_stop`.
pub fn trail_stop(
    current_stop: f64,
    price: f64,
    direction: Direction,
    trailing_multiplier: f64,
    atr: f64,
) -> f64 {
    match direction {
        Direction::Bullish => current_stop.max(price - trailing_multiplier * atr),
        Direction::Bearish => current_stop.min(price + trailing_multiplier * atr),
    }
}
