//! Per-bar plotting and alert records for a charting front end.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use common::{Bar, Direction, Result, SweepSignal};
use risk::{stop_loss, take_profit};

use crate::config::DetectionConfig;
use crate::detector::StreamingDetector;
use crate::indicators::AtrIndicator;

/// Everything a chart needs to draw for one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub bullish_sweep: bool,
    pub bearish_sweep: bool,
    pub sweep_level: Option<f64>,
    pub atr: Option<f64>,
    /// Stop/target for a one-sided sweep once the ATR is defined, measured
    /// from the sweep bar's close.
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub alert: Option<String>,
}

/// Annotate every bar of `bars` in causal order.
pub fn annotate(
    symbol: &str,
    bars: &[Bar],
    detection: &DetectionConfig,
    risk_reward_ratio: f64,
) -> Vec<Annotation> {
    let mut detector = StreamingDetector::new(detection.clone());
    let atr_series = AtrIndicator::new(detection.atr_length).series(bars);

    let annotations: Vec<Annotation> = (0..bars.len())
        .map(|i| {
            let bar = &bars[i];
            let signal = detector.next(&bars[..=i]);
            let atr = atr_series[i];

            let levels = one_sided(&signal).zip(atr).map(|((direction, level), atr)| {
                let stop = stop_loss(level, direction, detection.atr_multiplier, atr);
                (stop, take_profit(bar.close, stop, risk_reward_ratio))
            });

            Annotation {
                index: i,
                timestamp: bar.timestamp,
                bullish_sweep: signal.bullish.is_some(),
                bearish_sweep: signal.bearish.is_some(),
                sweep_level: signal.sweep_level(),
                atr,
                stop_loss: levels.map(|(stop, _)| stop),
                take_profit: levels.map(|(_, target)| target),
                alert: alert_text(symbol, &signal),
            }
        })
        .collect();

    debug!(
        symbol,
        bars = bars.len(),
        sweeps = annotations.iter().filter(|a| a.alert.is_some()).count(),
        "Annotated series"
    );
    annotations
}

/// Write one JSON object per line.
pub fn write_json_lines<W: Write>(annotations: &[Annotation], mut writer: W) -> Result<()> {
    for annotation in annotations {
        serde_json::to_writer(&mut writer, annotation)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn one_sided(signal: &SweepSignal) -> Option<(Direction, f64)> {
    match (signal.bullish, signal.bearish) {
        (Some(s), None) | (None, Some(s)) => Some((s.direction, s.swept_level)),
        _ => None,
    }
}

fn alert_text(symbol: &str, signal: &SweepSignal) -> Option<String> {
    let parts: Vec<String> = [signal.bullish, signal.bearish]
        .into_iter()
        .flatten()
        .map(|s| {
            let side = match s.direction {
                Direction::Bullish => "Bullish",
                Direction::Bearish => "Bearish",
            };
            format!("{side} liquidity sweep on {symbol} at {:.4}", s.swept_level)
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join("; "))
}
