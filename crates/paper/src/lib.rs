use std::collections::HashMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use common::{Bar, Direction, ExitReason, Result, TradeEvent};
use strategy::{StrategyEvent, StrategyRegistry};

/// Side of a simulated fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens a position in `direction`.
    pub fn opening(direction: Direction) -> Self {
        match direction {
            Direction::Bullish => OrderSide::Buy,
            Direction::Bearish => OrderSide::Sell,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A completed round trip.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub id: String,
    pub strategy: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

/// Summary of a backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub bars: usize,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_pnl: f64,
    pub wins: usize,
    pub losses: usize,
    /// Fraction of closed trades with positive PnL; 0 when nothing closed.
    pub win_rate: f64,
    /// Gross profit over gross loss; `None` without losing trades.
    pub profit_factor: Option<f64>,
    /// Largest peak-to-trough fall of the realised balance.
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    /// Positions still open when the bars ran out.
    pub open_positions: usize,
    pub trades: Vec<TradeRecord>,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    id: String,
    symbol: String,
    direction: Direction,
    quantity: f64,
    entry_index: usize,
    entry_time: DateTime<Utc>,
    entry_price: f64,
}

/// Simulated broker for backtests.
///
/// Fills happen at the sequencer's prices with configurable slippage: buys
/// pay more, sells receive less. One position per strategy; PnL is
/// realised on close.
pub struct PaperBroker {
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    initial_balance: f64,
    balance: f64,
    peak_balance: f64,
    max_drawdown: f64,
    max_drawdown_pct: f64,
    /// Open positions, keyed by strategy name.
    positions: HashMap<String, OpenPosition>,
    trades: Vec<TradeRecord>,
}

impl PaperBroker {
    pub fn new(initial_balance: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_balance,
            slippage_bps = slippage_bps,
            "PaperBroker initialized"
        );
        Self {
            slippage_bps,
            initial_balance,
            balance: initial_balance,
            peak_balance: initial_balance,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            positions: HashMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    /// Price after slippage for a fill on `side`.
    pub fn fill_price(&self, price: f64, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    /// Act on one strategy event. Only entries and closes move money.
    pub fn apply(&mut self, ev: &StrategyEvent) {
        match &ev.event {
            TradeEvent::Entered {
                sweep,
                bar_index,
                timestamp,
                entry_price,
                ..
            } => {
                let side = OrderSide::opening(sweep.direction);
                let fill = self.fill_price(*entry_price, side);
                debug!(
                    strategy = %ev.strategy,
                    side = %side,
                    price = entry_price,
                    fill = fill,
                    qty = ev.quantity,
                    "Paper entry filled"
                );
                let position = OpenPosition {
                    id: uuid::Uuid::new_v4().to_string(),
                    symbol: ev.symbol.clone(),
                    direction: sweep.direction,
                    quantity: ev.quantity,
                    entry_index: *bar_index,
                    entry_time: *timestamp,
                    entry_price: fill,
                };
                if self.positions.insert(ev.strategy.clone(), position).is_some() {
                    warn!(strategy = %ev.strategy, "Entry replaced an unclosed paper position");
                }
            }

            TradeEvent::Closed {
                bar_index,
                timestamp,
                exit_price,
                reason,
                ..
            } => {
                let Some(position) = self.positions.remove(&ev.strategy) else {
                    warn!(strategy = %ev.strategy, "Close without an open paper position");
                    return;
                };
                let side = OrderSide::opening(position.direction).opposite();
                let fill = self.fill_price(*exit_price, side);
                let pnl = (fill - position.entry_price)
                    * position.quantity
                    * position.direction.sign();

                self.realise(pnl);
                info!(
                    strategy = %ev.strategy,
                    direction = %position.direction,
                    entry = position.entry_price,
                    exit = fill,
                    pnl = pnl,
                    reason = %reason,
                    "Paper trade closed"
                );

                self.trades.push(TradeRecord {
                    id: position.id,
                    strategy: ev.strategy.clone(),
                    symbol: position.symbol,
                    direction: position.direction,
                    quantity: position.quantity,
                    entry_index: position.entry_index,
                    entry_time: position.entry_time,
                    entry_price: position.entry_price,
                    exit_index: *bar_index,
                    exit_time: *timestamp,
                    exit_price: fill,
                    pnl,
                    exit_reason: *reason,
                });
            }

            _ => {}
        }
    }

    /// Update the balance after a realised P&L, and track the peak for drawdown.
    fn realise(&mut self, pnl: f64) {
        self.balance += pnl;
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        let drawdown = self.peak_balance - self.balance;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        if self.peak_balance > 0.0 {
            self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown / self.peak_balance);
        }
    }

    pub fn report(&self, bars: usize) -> BacktestReport {
        let wins = self.trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = self.trades.iter().filter(|t| t.pnl < 0.0).count();
        let gross_profit: f64 = self.trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let gross_loss: f64 = self.trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();

        BacktestReport {
            bars,
            initial_balance: self.initial_balance,
            final_balance: self.balance,
            total_pnl: self.balance - self.initial_balance,
            wins,
            losses,
            win_rate: if self.trades.is_empty() {
                0.0
            } else {
                wins as f64 / self.trades.len() as f64
            },
            profit_factor: (gross_loss > 0.0).then(|| gross_profit / gross_loss),
            max_drawdown: self.max_drawdown,
            max_drawdown_pct: self.max_drawdown_pct,
            open_positions: self.positions.len(),
            trades: self.trades.clone(),
        }
    }
}

/// Replay `bars` for `symbol` through the registry in causal order and
/// simulate every entry and exit.
pub fn run_backtest(
    registry: &mut StrategyRegistry,
    symbol: &str,
    bars: &[Bar],
    broker: &mut PaperBroker,
) -> BacktestReport {
    info!(symbol, bars = bars.len(), strategies = registry.len(), "Backtest starting");

    for bar in bars {
        for event in registry.process(symbol, *bar) {
            broker.apply(&event);
        }
    }

    let report = broker.report(bars.len());
    info!(
        trades = report.trades.len(),
        total_pnl = report.total_pnl,
        win_rate = report.win_rate,
        max_drawdown = report.max_drawdown,
        open_positions = report.open_positions,
        "Backtest finished"
    );
    report
}

/// Write the report as pretty JSON.
pub fn write_report<W: Write>(report: &BacktestReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::{RiskLevels, SweepEvent};
    use risk::RiskConfig;
    use strategy::{DetectionConfig, DetectionMethod, StrategyConfig, StrategyFileConfig};

    fn at(i: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(4 * i as i64)
    }

    fn entered(strategy: &str, direction: Direction, index: usize, price: f64) -> StrategyEvent {
        StrategyEvent {
            strategy: strategy.into(),
            symbol: "BTCUSD".into(),
            quantity: 2.0,
            event: TradeEvent::Entered {
                sweep: SweepEvent {
                    bar_index: index,
                    timestamp: at(index),
                    direction,
                    swept_level: price,
                    confirmed: true,
                },
                bar_index: index,
                timestamp: at(index),
                entry_price: price,
                levels: RiskLevels {
                    stop_loss: price,
                    take_profit: price,
                },
            },
        }
    }

    fn closed(strategy: &str, direction: Direction, index: usize, price: f64) -> StrategyEvent {
        StrategyEvent {
            strategy: strategy.into(),
            symbol: "BTCUSD".into(),
            quantity: 2.0,
            event: TradeEvent::Closed {
                bar_index: index,
                timestamp: at(index),
                direction,
                entry_price: 0.0,
                exit_price: price,
                reason: ExitReason::TakeProfit,
            },
        }
    }

    #[test]
    fn long_round_trip_applies_slippage_both_ways() {
        let mut broker = PaperBroker::new(10_000.0, 10.0); // 10 bps
        broker.apply(&entered("s", Direction::Bullish, 1, 100.0));
        assert_eq!(broker.open_positions(), 1);
        broker.apply(&closed("s", Direction::Bullish, 4, 110.0));

        let trade = &broker.trades()[0];
        assert!((trade.entry_price - 100.1).abs() < 1e-9);
        assert!((trade.exit_price - 109.89).abs() < 1e-9);
        assert!((trade.pnl - (109.89 - 100.1) * 2.0).abs() < 1e-9);
        assert_eq!(trade.entry_index, 1);
        assert_eq!(trade.exit_index, 4);
        assert_eq!(broker.open_positions(), 0);
    }

    #[test]
    fn short_profits_when_price_falls() {
        let mut broker = PaperBroker::new(10_000.0, 0.0);
        broker.apply(&entered("s", Direction::Bearish, 1, 100.0));
        broker.apply(&closed("s", Direction::Bearish, 2, 90.0));
        assert!((broker.balance() - 10_020.0).abs() < 1e-9);
    }

    #[test]
    fn close_without_position_is_ignored() {
        let mut broker = PaperBroker::new(10_000.0, 0.0);
        broker.apply(&closed("s", Direction::Bullish, 2, 90.0));
        assert!(broker.trades().is_empty());
        assert_eq!(broker.balance(), 10_000.0);
    }

    #[test]
    fn report_tracks_drawdown_and_ratios() {
        let mut broker = PaperBroker::new(1_000.0, 0.0);
        // +20, −30, +10
        broker.apply(&entered("s", Direction::Bullish, 1, 100.0));
        broker.apply(&closed("s", Direction::Bullish, 2, 110.0));
        broker.apply(&entered("s", Direction::Bullish, 3, 100.0));
        broker.apply(&closed("s", Direction::Bullish, 4, 85.0));
        broker.apply(&entered("s", Direction::Bullish, 5, 100.0));
        broker.apply(&closed("s", Direction::Bullish, 6, 105.0));
        broker.apply(&entered("s", Direction::Bullish, 7, 100.0));

        let report = broker.report(8);
        assert_eq!(report.trades.len(), 3);
        assert_eq!((report.wins, report.losses), (2, 1));
        assert!((report.win_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.total_pnl - 0.0).abs() < 1e-9);
        assert!((report.profit_factor.unwrap() - 1.0).abs() < 1e-9);
        assert!((report.max_drawdown - 30.0).abs() < 1e-9);
        assert!((report.max_drawdown_pct - 30.0 / 1_020.0).abs() < 1e-9);
        assert_eq!(report.open_positions, 1);
    }

    #[test]
    fn backtest_replays_sweep_into_take_profit() {
        let file = StrategyFileConfig {
            strategies: vec![StrategyConfig {
                name: "lookback".into(),
                symbol: "BTCUSD".into(),
                quantity: 1.0,
                detection: DetectionConfig {
                    method: DetectionMethod::Lookback,
                    lookback: 3,
                    atr_length: 2,
                    ..DetectionConfig::default()
                },
                risk: RiskConfig {
                    stop_atr_multiplier: 0.5,
                    risk_reward_ratio: 1.0,
                    ..RiskConfig::default()
                },
            }],
        };
        let mut registry = StrategyRegistry::from_config(&file);
        let bars: Vec<Bar> = [
            (10.0, 10.5, 10.0, 10.2),
            (9.5, 10.0, 9.0, 9.4),
            (8.5, 9.0, 8.0, 8.8),
            (9.0, 9.5, 9.0, 9.3),
            (10.0, 10.5, 10.0, 10.1),
            (9.0, 9.8, 7.5, 9.0),
            (9.0, 11.2, 8.9, 11.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: at(i),
            open,
            high,
            low,
            close,
        })
        .collect();

        let mut broker = PaperBroker::new(10_000.0, 0.0);
        let report = run_backtest(&mut registry, "BTCUSD", &bars, &mut broker);

        assert_eq!(report.bars, 7);
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.entry_index, 5);
        assert_eq!(trade.exit_index, 6);
        // Stop 8 − 0.5 × 1.9 = 7.05, risk 1.95 → target 10.95
        assert!((trade.exit_price - 10.95).abs() < 1e-9);
        assert!((report.total_pnl - 1.95).abs() < 1e-9);
        assert_eq!(report.win_rate, 1.0);
        assert!(report.profit_factor.is_none());

        let mut buf = Vec::new();
        write_report(&report, &mut buf).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("\"exit_reason\": \"take_profit\""));
    }
}
