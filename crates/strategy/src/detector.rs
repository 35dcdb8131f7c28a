//! Liquidity-sweep detection.
//!
//! A bullish sweep is a bar that trades below a reference low and closes back
//! above it; a bearish sweep is the mirror on highs. The reference level is
//! either the prior `lookback`-bar extreme or the latest confirmed pivot.
//! Missing history never raises: the bar simply carries no signal.

use common::{Bar, Direction, Extreme, Pivot, SweepEvent, SweepSignal};

use crate::config::{DetectionConfig, DetectionMethod};
use crate::indicators::{latest_pivot, prior_extreme, PivotTracker};

/// Lookback method, bullish side: the current bar's low pierces the lowest
/// low of the previous `lookback` bars and its close reclaims it.
pub fn detect_bullish_sweep(bars: &[Bar], lookback: usize) -> Option<SweepEvent> {
    let (index, bar) = current(bars)?;
    let prior_low = prior_extreme(bars, lookback, Extreme::Low).ok()?;
    (bar.low < prior_low && bar.close > prior_low)
        .then(|| sweep(index, bar, Direction::Bullish, prior_low))
}

/// Lookback method, bearish side: mirror of [`detect_bullish_sweep`] on
/// highs.
pub fn detect_bearish_sweep(bars: &[Bar], lookback: usize) -> Option<SweepEvent> {
    let (index, bar) = current(bars)?;
    let prior_high = prior_extreme(bars, lookback, Extreme::High).ok()?;
    (bar.high > prior_high && bar.close < prior_high)
        .then(|| sweep(index, bar, Direction::Bearish, prior_high))
}

pub fn detect_lookback_sweep(bars: &[Bar], lookback: usize) -> SweepSignal {
    SweepSignal {
        bullish: detect_bullish_sweep(bars, lookback),
        bearish: detect_bearish_sweep(bars, lookback),
    }
}

/// Pivot method over a full history. Rescans for the latest pivots on every
/// call; [`StreamingDetector`] keeps them incrementally instead.
pub fn detect_pivot_sweep(
    bars: &[Bar],
    left_bars: usize,
    right_bars: usize,
    sweep_threshold: f64,
) -> SweepSignal {
    let Some((index, bar)) = current(bars) else {
        return SweepSignal::none();
    };
    pivot_sweep_at(
        index,
        bar,
        latest_pivot(bars, left_bars, right_bars, Extreme::Low),
        latest_pivot(bars, left_bars, right_bars, Extreme::High),
        sweep_threshold,
    )
}

/// Pivot-sweep test for one bar against already known pivots.
///
/// Bullish when `low < pivot_low × (1 − threshold)` and `close > pivot_low`;
/// bearish when `high > pivot_high × (1 + threshold)` and `close < pivot_high`.
pub fn pivot_sweep_at(
    index: usize,
    bar: &Bar,
    pivot_low: Option<Pivot>,
    pivot_high: Option<Pivot>,
    sweep_threshold: f64,
) -> SweepSignal {
    let bullish = pivot_low.and_then(|p| {
        (bar.low < p.price * (1.0 - sweep_threshold) && bar.close > p.price)
            .then(|| sweep(index, bar, Direction::Bullish, p.price))
    });
    let bearish = pivot_high.and_then(|p| {
        (bar.high > p.price * (1.0 + sweep_threshold) && bar.close < p.price)
            .then(|| sweep(index, bar, Direction::Bearish, p.price))
    });
    SweepSignal { bullish, bearish }
}

/// Stateless detector dispatching on the configured method.
#[derive(Debug, Clone)]
pub struct SweepDetector {
    config: DetectionConfig,
}

impl SweepDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Sweep signal for the last bar of `bars`.
    pub fn detect(&self, bars: &[Bar]) -> SweepSignal {
        match self.config.method {
            DetectionMethod::Lookback => detect_lookback_sweep(bars, self.config.lookback),
            DetectionMethod::PivotBased => detect_pivot_sweep(
                bars,
                self.config.left_bars,
                self.config.right_bars,
                self.config.sweep_threshold,
            ),
        }
    }
}

/// Incremental detector for a growing history.
///
/// Produces the same signals as [`SweepDetector`] but keeps the latest
/// pivots in a [`PivotTracker`], so each bar costs O(left + right) instead of
/// a rescan. [`StreamingDetector::next`] must see every bar, in order.
#[derive(Debug, Clone)]
pub struct StreamingDetector {
    config: DetectionConfig,
    pivots: PivotTracker,
}

impl StreamingDetector {
    pub fn new(config: DetectionConfig) -> Self {
        let pivots = PivotTracker::new(config.left_bars, config.right_bars);
        Self { config, pivots }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Signal for the last bar of `history`, which must be exactly one bar
    /// longer than on the previous call.
    pub fn next(&mut self, history: &[Bar]) -> SweepSignal {
        self.pivots.update(history);
        let Some((index, bar)) = current(history) else {
            return SweepSignal::none();
        };

        match self.config.method {
            DetectionMethod::Lookback => detect_lookback_sweep(history, self.config.lookback),
            DetectionMethod::PivotBased => pivot_sweep_at(
                index,
                bar,
                self.pivots.latest(Extreme::Low),
                self.pivots.latest(Extreme::High),
                self.config.sweep_threshold,
            ),
        }
    }
}

fn current(bars: &[Bar]) -> Option<(usize, &Bar)> {
    bars.last().map(|bar| (bars.len() - 1, bar))
}

fn sweep(index: usize, bar: &Bar, direction: Direction, level: f64) -> SweepEvent {
    SweepEvent {
        bar_index: index,
        timestamp: bar.timestamp,
        direction,
        swept_level: level,
        confirmed: false,
    }
}
