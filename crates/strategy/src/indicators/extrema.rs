use common::{Bar, Error, Extreme, Result};

/// Lowest low (`Extreme::Low`) or highest high (`Extreme::High`) of the last
/// `window` bars, current bar included.
///
/// Fails with `InsufficientHistory` until `window` bars exist.
pub fn rolling_extreme(bars: &[Bar], window: usize, kind: Extreme) -> Result<f64> {
    if window == 0 || bars.len() < window {
        return Err(Error::insufficient(window.max(1), bars.len()));
    }

    let prices = bars[bars.len() - window..].iter().map(|b| b.price(kind));
    let value = match kind {
        Extreme::Low => prices.fold(f64::INFINITY, f64::min),
        Extreme::High => prices.fold(f64::NEG_INFINITY, f64::max),
    };
    Ok(value)
}

/// `rolling_extreme` over the window ending at the previous bar. This is the
/// level a sweep on the current bar is measured against.
pub fn prior_extreme(bars: &[Bar], window: usize, kind: Extreme) -> Result<f64> {
    match bars.split_last() {
        Some((_, prior)) => rolling_extreme(prior, window, kind),
        None => Err(Error::insufficient(window + 1, 0)),
    }
}
