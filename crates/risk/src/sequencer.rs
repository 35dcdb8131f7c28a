use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::{
    Bar, Direction, Error, ExitReason, Result, RiskLevels, SweepEvent, SweepSignal, TradeEvent,
    TradePhase,
};

use crate::levels::{risk_levels, trail_stop};

/// User-configurable risk parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Stop distance beyond the swept level, in ATRs.
    pub stop_atr_multiplier: f64,
    /// Trailing distance behind the close, in ATRs.
    pub trailing_atr_multiplier: f64,
    /// Target distance as a multiple of the entry-to-stop distance.
    pub risk_reward_ratio: f64,
    /// Wait for the bar after the sweep to close in the reversal direction.
    pub use_confirmation: bool,
    pub use_trailing_stop: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_atr_multiplier: 1.5,
            trailing_atr_multiplier: 2.0,
            risk_reward_ratio: 2.0,
            use_confirmation: false,
            use_trailing_stop: false,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("stop_atr_multiplier", self.stop_atr_multiplier)?;
        ensure_positive("trailing_atr_multiplier", self.trailing_atr_multiplier)?;
        ensure_positive("risk_reward_ratio", self.risk_reward_ratio)
    }
}

fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenTrade {
    sweep: SweepEvent,
    entry_index: usize,
    entry_price: f64,
    levels: RiskLevels,
    trailing: bool,
}

impl OpenTrade {
    fn direction(&self) -> Direction {
        self.sweep.direction
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Awaiting { sweep: SweepEvent, sweep_close: f64 },
    Open(OpenTrade),
}

/// Turns per-bar sweep signals into entries and exits for a single trade
/// slot.
///
/// Each bar is evaluated in a fixed order: exits of the open trade, then
/// trailing, then a pending confirmation, then new sweeps. A trade closed on
/// a bar leaves the slot free, so an opposing sweep on that same bar
/// reverses the position.
pub struct SignalSequencer {
    config: RiskConfig,
    state: State,
    phase: TradePhase,
}

impl SignalSequencer {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            phase: TradePhase::Idle,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Phase after the most recent bar. `SweepDetected` and `Closed` are
    /// only reported for the bar on which they happened.
    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    /// Levels of the open trade, if any.
    pub fn levels(&self) -> Option<RiskLevels> {
        match self.state {
            State::Open(trade) => Some(trade.levels),
            _ => None,
        }
    }

    /// Side of the open trade, if any.
    pub fn position(&self) -> Option<Direction> {
        match self.state {
            State::Open(trade) => Some(trade.direction()),
            _ => None,
        }
    }

    /// Evaluate one closed bar. `index` is the bar's position in the
    /// history, `atr` is `None` while the ATR is still warming up.
    pub fn on_bar(
        &mut self,
        index: usize,
        bar: &Bar,
        signal: &SweepSignal,
        atr: Option<f64>,
    ) -> Vec<TradeEvent> {
        let mut events = Vec::new();
        self.phase = match self.state {
            State::Idle => TradePhase::Idle,
            State::Awaiting { .. } => TradePhase::AwaitingConfirmation,
            State::Open(trade) if trade.trailing => TradePhase::TrailingActive,
            State::Open(_) => TradePhase::Entered,
        };

        // ── Exits ──────────────────────────────────────────────────────────
        if let State::Open(trade) = self.state {
            if index > trade.entry_index {
                if let Some((exit_price, reason)) = exit_for(&trade, bar, signal) {
                    info!(
                        bar = index,
                        direction = %trade.direction(),
                        entry = trade.entry_price,
                        exit = exit_price,
                        reason = %reason,
                        "Trade closed"
                    );
                    events.push(TradeEvent::Closed {
                        bar_index: index,
                        timestamp: bar.timestamp,
                        direction: trade.direction(),
                        entry_price: trade.entry_price,
                        exit_price,
                        reason,
                    });
                    self.state = State::Idle;
                    self.phase = TradePhase::Closed;
                }
            }
        }

        // ── Trailing ───────────────────────────────────────────────────────
        if let State::Open(ref mut trade) = self.state {
            if self.config.use_trailing_stop && index > trade.entry_index {
                if let Some(atr) = atr {
                    let from = trade.levels.stop_loss;
                    let to = trail_stop(
                        from,
                        bar.close,
                        trade.direction(),
                        self.config.trailing_atr_multiplier,
                        atr,
                    );
                    if to != from {
                        debug!(bar = index, from, to, "Trailing stop moved");
                        trade.levels.stop_loss = to;
                        trade.trailing = true;
                        self.phase = TradePhase::TrailingActive;
                        events.push(TradeEvent::StopMoved {
                            bar_index: index,
                            direction: trade.direction(),
                            from,
                            to,
                        });
                    }
                }
            }
        }

        // ── Pending confirmation ───────────────────────────────────────────
        if let State::Awaiting { sweep, sweep_close } = self.state {
            self.state = State::Idle;
            let confirmed = match sweep.direction {
                Direction::Bullish => bar.close > sweep_close,
                Direction::Bearish => bar.close < sweep_close,
            };
            match (confirmed, atr) {
                (true, Some(atr)) => {
                    self.enter(sweep, index, bar, atr, &mut events);
                    if matches!(self.state, State::Open(_)) {
                        // A fresh sweep on the entry bar is reported, not traded.
                        if let Some(sweep) = one_sided(signal, index) {
                            events.push(TradeEvent::SweepDetected { sweep });
                        }
                        return events;
                    }
                }
                _ => {
                    debug!(bar = index, direction = %sweep.direction, "Sweep not confirmed");
                    self.phase = TradePhase::Idle;
                    events.push(TradeEvent::ConfirmationFailed {
                        sweep,
                        bar_index: index,
                    });
                }
            }
        }

        // ── New sweeps ─────────────────────────────────────────────────────
        if matches!(self.state, State::Idle) {
            if let Some(sweep) = one_sided(signal, index) {
                events.push(TradeEvent::SweepDetected { sweep });
                self.phase = TradePhase::SweepDetected;

                match atr {
                    None => {
                        debug!(bar = index, "ATR not yet available, no entry");
                    }
                    Some(_) if self.config.use_confirmation => {
                        self.state = State::Awaiting {
                            sweep,
                            sweep_close: bar.close,
                        };
                        self.phase = TradePhase::AwaitingConfirmation;
                        events.push(TradeEvent::AwaitingConfirmation { sweep });
                    }
                    Some(atr) => self.enter(sweep, index, bar, atr, &mut events),
                }
            }
        }

        events
    }

    fn enter(
        &mut self,
        sweep: SweepEvent,
        index: usize,
        bar: &Bar,
        atr: f64,
        events: &mut Vec<TradeEvent>,
    ) {
        let entry_price = bar.close;
        let levels = risk_levels(
            sweep.swept_level,
            sweep.direction,
            entry_price,
            atr,
            self.config.stop_atr_multiplier,
            self.config.risk_reward_ratio,
        );

        // Stop must sit on the losing side of the entry.
        if (entry_price - levels.stop_loss) * sweep.direction.sign() <= 0.0 {
            warn!(
                bar = index,
                entry = entry_price,
                stop = levels.stop_loss,
                "Stop on the wrong side of entry, skipping trade"
            );
            return;
        }

        let sweep = SweepEvent {
            confirmed: true,
            ..sweep
        };
        info!(
            bar = index,
            direction = %sweep.direction,
            entry = entry_price,
            stop = levels.stop_loss,
            target = levels.take_profit,
            "Trade entered"
        );
        self.state = State::Open(OpenTrade {
            sweep,
            entry_index: index,
            entry_price,
            levels,
            trailing: false,
        });
        self.phase = TradePhase::Entered;
        events.push(TradeEvent::Entered {
            sweep,
            bar_index: index,
            timestamp: bar.timestamp,
            entry_price,
            levels,
        });
    }
}

/// The single sweep on this bar. A bar sweeping both ways is ambiguous.
fn one_sided(signal: &SweepSignal, index: usize) -> Option<SweepEvent> {
    match (signal.bullish, signal.bearish) {
        (Some(_), Some(_)) => {
            debug!(bar = index, "Bullish and bearish sweep on one bar, ignored");
            None
        }
        (Some(sweep), None) | (None, Some(sweep)) => Some(sweep),
        (None, None) => None,
    }
}

/// Exit price and reason for `trade` on `bar`, if any. Stop is checked
/// before target; a gap through either level fills at the open.
fn exit_for(trade: &OpenTrade, bar: &Bar, signal: &SweepSignal) -> Option<(f64, ExitReason)> {
    let RiskLevels {
        stop_loss,
        take_profit,
    } = trade.levels;

    match trade.direction() {
        Direction::Bullish => {
            if bar.low <= stop_loss {
                return Some((bar.open.min(stop_loss), ExitReason::StopLoss));
            }
            if bar.high >= take_profit {
                return Some((bar.open.max(take_profit), ExitReason::TakeProfit));
            }
        }
        Direction::Bearish => {
            if bar.high >= stop_loss {
                return Some((bar.open.max(stop_loss), ExitReason::StopLoss));
            }
            if bar.low <= take_profit {
                return Some((bar.open.min(take_profit), ExitReason::TakeProfit));
            }
        }
    }

    signal
        .get(trade.direction().opposite())
        .map(|_| (bar.close, ExitReason::OpposingSweep))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::hours(4 * i as i64),
            open,
            high,
            low,
            close,
        }
    }

    fn sweep(i: usize, direction: Direction, level: f64) -> SweepEvent {
        SweepEvent {
            bar_index: i,
            timestamp: bar(i, 0.0, 0.0, 0.0, 0.0).timestamp,
            direction,
            swept_level: level,
            confirmed: false,
        }
    }

    fn bullish(i: usize, level: f64) -> SweepSignal {
        SweepSignal {
            bullish: Some(sweep(i, Direction::Bullish, level)),
            bearish: None,
        }
    }

    fn bearish(i: usize, level: f64) -> SweepSignal {
        SweepSignal {
            bullish: None,
            bearish: Some(sweep(i, Direction::Bearish, level)),
        }
    }

    fn config() -> RiskConfig {
        RiskConfig {
            stop_atr_multiplier: 1.0,
            trailing_atr_multiplier: 1.0,
            risk_reward_ratio: 2.0,
            use_confirmation: false,
            use_trailing_stop: false,
        }
    }

    #[test]
    fn enters_immediately_without_confirmation() {
        let mut seq = SignalSequencer::new(config());
        // Swept 100, closed 101, ATR 2 → stop 98, target 101 + 2×3 = 107
        let events = seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));

        assert!(matches!(events[0], TradeEvent::SweepDetected { .. }));
        match &events[1] {
            TradeEvent::Entered { entry_price, levels, sweep, .. } => {
                assert_eq!(*entry_price, 101.0);
                assert!((levels.stop_loss - 98.0).abs() < 1e-9);
                assert!((levels.take_profit - 107.0).abs() < 1e-9);
                assert!(sweep.confirmed);
            }
            other => panic!("expected Entered, got {other:?}"),
        }
        assert_eq!(seq.phase(), TradePhase::Entered);
        assert_eq!(seq.position(), Some(Direction::Bullish));
    }

    #[test]
    fn no_entry_while_atr_warming_up() {
        let mut seq = SignalSequencer::new(config());
        let events = seq.on_bar(2, &bar(2, 100.5, 102.0, 99.0, 101.0), &bullish(2, 100.0), None);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TradeEvent::SweepDetected { .. }));
        assert!(seq.position().is_none());
    }

    #[test]
    fn confirmation_bar_closing_higher_enters() {
        let mut seq = SignalSequencer::new(RiskConfig {
            use_confirmation: true,
            ..config()
        });
        let events = seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        assert!(matches!(events.last(), Some(TradeEvent::AwaitingConfirmation { .. })));
        assert_eq!(seq.phase(), TradePhase::AwaitingConfirmation);

        let events = seq.on_bar(6, &bar(6, 101.0, 103.0, 100.5, 102.5), &SweepSignal::none(), Some(2.0));
        match &events[0] {
            TradeEvent::Entered { entry_price, bar_index, .. } => {
                assert_eq!(*entry_price, 102.5);
                assert_eq!(*bar_index, 6);
            }
            other => panic!("expected Entered, got {other:?}"),
        }
    }

    #[test]
    fn confirmation_bar_closing_lower_cancels() {
        let mut seq = SignalSequencer::new(RiskConfig {
            use_confirmation: true,
            ..config()
        });
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        let events = seq.on_bar(6, &bar(6, 101.0, 101.2, 100.1, 100.4), &SweepSignal::none(), Some(2.0));

        assert!(matches!(events[0], TradeEvent::ConfirmationFailed { .. }));
        assert!(seq.position().is_none());
        assert_eq!(seq.phase(), TradePhase::Idle);
    }

    #[test]
    fn stop_loss_closes_long() {
        let mut seq = SignalSequencer::new(config());
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        let events = seq.on_bar(6, &bar(6, 100.0, 100.5, 97.0, 97.5), &SweepSignal::none(), Some(2.0));

        match &events[0] {
            TradeEvent::Closed { exit_price, reason, .. } => {
                assert_eq!(*reason, ExitReason::StopLoss);
                assert!((exit_price - 98.0).abs() < 1e-9);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
        assert_eq!(seq.phase(), TradePhase::Closed);
    }

    #[test]
    fn take_profit_closes_short() {
        let mut seq = SignalSequencer::new(config());
        // Short: swept 100, closed 99, ATR 1 → stop 101, target 99 − 2×2 = 95
        seq.on_bar(5, &bar(5, 99.5, 101.0, 98.5, 99.0), &bearish(5, 100.0), Some(1.0));
        let events = seq.on_bar(6, &bar(6, 98.0, 98.5, 94.0, 94.5), &SweepSignal::none(), Some(1.0));

        match &events[0] {
            TradeEvent::Closed { exit_price, reason, direction, .. } => {
                assert_eq!(*reason, ExitReason::TakeProfit);
                assert_eq!(*direction, Direction::Bearish);
                assert!((exit_price - 95.0).abs() < 1e-9);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let mut seq = SignalSequencer::new(config());
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        let events = seq.on_bar(6, &bar(6, 96.0, 96.5, 95.0, 95.5), &SweepSignal::none(), Some(2.0));
        match &events[0] {
            TradeEvent::Closed { exit_price, .. } => assert_eq!(*exit_price, 96.0),
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn opposing_sweep_closes_and_reverses() {
        let mut seq = SignalSequencer::new(config());
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));

        // Bar stays inside stop/target but sweeps a high above and closes back under
        let events = seq.on_bar(6, &bar(6, 101.0, 104.0, 100.5, 102.0), &bearish(6, 103.0), Some(2.0));

        match &events[0] {
            TradeEvent::Closed { reason, exit_price, .. } => {
                assert_eq!(*reason, ExitReason::OpposingSweep);
                assert_eq!(*exit_price, 102.0);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(matches!(events[1], TradeEvent::SweepDetected { .. }));
        assert!(matches!(events[2], TradeEvent::Entered { .. }));
        assert_eq!(seq.position(), Some(Direction::Bearish));
    }

    #[test]
    fn trailing_stop_tightens_and_reports_phase() {
        let mut seq = SignalSequencer::new(RiskConfig {
            use_trailing_stop: true,
            risk_reward_ratio: 50.0,
            ..config()
        });
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        assert_eq!(seq.levels().unwrap().stop_loss, 98.0);

        let events = seq.on_bar(6, &bar(6, 101.0, 104.5, 100.8, 104.0), &SweepSignal::none(), Some(2.0));
        assert!(matches!(
            events[0],
            TradeEvent::StopMoved { from, to, .. } if from == 98.0 && to == 102.0
        ));
        assert_eq!(seq.phase(), TradePhase::TrailingActive);

        // Pullback does not loosen the stop
        let events = seq.on_bar(7, &bar(7, 104.0, 104.2, 102.5, 103.0), &SweepSignal::none(), Some(2.0));
        assert!(events.is_empty());
        assert_eq!(seq.levels().unwrap().stop_loss, 102.0);
    }

    #[test]
    fn stop_wins_when_bar_touches_both_levels() {
        let mut seq = SignalSequencer::new(config());
        // Stop 98, target 107
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        let events = seq.on_bar(6, &bar(6, 101.0, 108.0, 97.0, 104.0), &SweepSignal::none(), Some(2.0));

        match &events[0] {
            TradeEvent::Closed { exit_price, reason, .. } => {
                assert_eq!(*reason, ExitReason::StopLoss);
                assert_eq!(*exit_price, 98.0);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn gap_through_target_fills_at_open() {
        let mut seq = SignalSequencer::new(config());
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));
        let events = seq.on_bar(6, &bar(6, 109.0, 110.0, 108.5, 109.5), &SweepSignal::none(), Some(2.0));

        match &events[0] {
            TradeEvent::Closed { exit_price, reason, .. } => {
                assert_eq!(*reason, ExitReason::TakeProfit);
                assert_eq!(*exit_price, 109.0);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn failed_confirmation_bar_can_start_new_sweep() {
        let mut seq = SignalSequencer::new(RiskConfig {
            use_confirmation: true,
            ..config()
        });
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));

        // Closes lower than the sweep bar and sweeps a high of its own
        let events = seq.on_bar(6, &bar(6, 101.0, 103.5, 100.2, 100.4), &bearish(6, 103.0), Some(2.0));

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TradeEvent::ConfirmationFailed { bar_index: 6, .. }));
        assert!(matches!(
            events[1],
            TradeEvent::SweepDetected { sweep } if sweep.direction == Direction::Bearish
        ));
        assert!(matches!(events[2], TradeEvent::AwaitingConfirmation { .. }));
        assert_eq!(seq.phase(), TradePhase::AwaitingConfirmation);
    }

    #[test]
    fn sweep_on_confirmation_entry_bar_is_reported() {
        let mut seq = SignalSequencer::new(RiskConfig {
            use_confirmation: true,
            ..config()
        });
        seq.on_bar(5, &bar(5, 100.5, 102.0, 99.0, 101.0), &bullish(5, 100.0), Some(2.0));

        let events = seq.on_bar(6, &bar(6, 101.0, 103.0, 100.5, 102.5), &bullish(6, 100.8), Some(2.0));

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TradeEvent::Entered { bar_index: 6, .. }));
        assert!(matches!(
            events[1],
            TradeEvent::SweepDetected { sweep } if sweep.bar_index == 6
        ));
        assert_eq!(seq.phase(), TradePhase::Entered);
        assert_eq!(seq.position(), Some(Direction::Bullish));
    }

    #[test]
    fn simultaneous_sweeps_are_ignored_when_flat() {
        let mut seq = SignalSequencer::new(config());
        let both = SweepSignal {
            bullish: Some(sweep(5, Direction::Bullish, 99.5)),
            bearish: Some(sweep(5, Direction::Bearish, 102.5)),
        };
        let events = seq.on_bar(5, &bar(5, 100.0, 103.0, 99.0, 101.0), &both, Some(2.0));
        assert!(events.is_empty());
        assert!(seq.position().is_none());
    }

    #[test]
    fn validate_rejects_non_positive_values() {
        assert!(RiskConfig::default().validate().is_ok());
        for bad in [
            RiskConfig { stop_atr_multiplier: 0.0, ..RiskConfig::default() },
            RiskConfig { trailing_atr_multiplier: -1.0, ..RiskConfig::default() },
            RiskConfig { risk_reward_ratio: 0.0, ..RiskConfig::default() },
            RiskConfig { risk_reward_ratio: f64::NAN, ..RiskConfig::default() },
        ] {
            assert!(matches!(bad.validate(), Err(Error::InvalidConfiguration(_))));
        }
    }
}
