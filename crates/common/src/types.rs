use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One closed OHLC bar. Bars arrive in chronological order and are never
/// mutated once appended to a history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Price on the given side of the bar: `high` for `Extreme::High`,
    /// `low` for `Extreme::Low`.
    pub fn price(&self, kind: Extreme) -> f64 {
        match kind {
            Extreme::High => self.high,
            Extreme::Low => self.low,
        }
    }
}

/// Which side of the bar range a computation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extreme {
    High,
    Low,
}

impl std::fmt::Display for Extreme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extreme::High => write!(f, "high"),
            Extreme::Low => write!(f, "low"),
        }
    }
}

/// Expected reversal direction of a sweep, and therefore the trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sweep of a low, expecting price to move up (long).
    Bullish,
    /// Sweep of a high, expecting price to move down (short).
    Bearish,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }

    /// +1.0 for longs, -1.0 for shorts. Multiplying a price move by this
    /// gives the move in the trade's favour.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
        }
    }
}

/// A confirmed local extreme. Only exists once `right_bars` later bars have
/// been observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: Extreme,
}

/// A sweep detected on a single bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepEvent {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// The prior low/high (or pivot price) that was pierced.
    pub swept_level: f64,
    /// Set by the sequencer once the sweep is accepted for entry.
    pub confirmed: bool,
}

/// Detector output for one bar. Both directions are evaluated
/// independently, so both may be present on an outside bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSignal {
    pub bullish: Option<SweepEvent>,
    pub bearish: Option<SweepEvent>,
}

impl SweepSignal {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bullish.is_none() && self.bearish.is_none()
    }

    pub fn get(&self, direction: Direction) -> Option<&SweepEvent> {
        match direction {
            Direction::Bullish => self.bullish.as_ref(),
            Direction::Bearish => self.bearish.as_ref(),
        }
    }

    /// The swept price for plotting: bullish level first, then bearish.
    pub fn sweep_level(&self) -> Option<f64> {
        self.bullish
            .or(self.bearish)
            .map(|event| event.swept_level)
    }
}

/// Stop and target prices for one trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    OpposingSweep,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::OpposingSweep => write!(f, "opposing sweep"),
        }
    }
}

/// Lifecycle phase of the sequencer's current trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradePhase {
    #[default]
    Idle,
    SweepDetected,
    AwaitingConfirmation,
    Entered,
    TrailingActive,
    Closed,
}

impl std::fmt::Display for TradePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradePhase::Idle => write!(f, "idle"),
            TradePhase::SweepDetected => write!(f, "sweep detected"),
            TradePhase::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            TradePhase::Entered => write!(f, "entered"),
            TradePhase::TrailingActive => write!(f, "trailing active"),
            TradePhase::Closed => write!(f, "closed"),
        }
    }
}

/// State transitions emitted by the signal sequencer, consumed by the
/// backtest and annotation adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    SweepDetected {
        sweep: SweepEvent,
    },
    AwaitingConfirmation {
        sweep: SweepEvent,
    },
    ConfirmationFailed {
        sweep: SweepEvent,
        bar_index: usize,
    },
    Entered {
        sweep: SweepEvent,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        entry_price: f64,
        levels: RiskLevels,
    },
    StopMoved {
        bar_index: usize,
        direction: Direction,
        from: f64,
        to: f64,
    },
    Closed {
        bar_index: usize,
        timestamp: DateTime<Utc>,
        direction: Direction,
        entry_price: f64,
        exit_price: f64,
        reason: ExitReason,
    },
}

impl TradeEvent {
    pub fn bar_index(&self) -> usize {
        match self {
            TradeEvent::SweepDetected { sweep } | TradeEvent::AwaitingConfirmation { sweep } => {
                sweep.bar_index
            }
            TradeEvent::ConfirmationFailed { bar_index, .. }
            | TradeEvent::Entered { bar_index, .. }
            | TradeEvent::StopMoved { bar_index, .. }
            | TradeEvent::Closed { bar_index, .. } => *bar_index,
        }
    }
}
