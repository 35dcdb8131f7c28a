use std::collections::HashMap;

use tracing::{debug, info, warn};

use common::{Bar, TradeEvent};
use risk::SignalSequencer;

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::detector::StreamingDetector;
use crate::indicators::AtrIndicator;
use crate::Strategy;

/// A sequencer event tagged with the strategy that produced it.
#[derive(Debug, Clone)]
pub struct StrategyEvent {
    pub strategy: String,
    pub symbol: String,
    pub quantity: f64,
    pub event: TradeEvent,
}

/// Holds all active strategy instances and dispatches closed bars to them.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
    /// Per-symbol append-only bar history. Bar indices in events refer to
    /// positions in these vectors.
    history: HashMap<String, Vec<Bar>>,
}

impl StrategyRegistry {
    /// Build the registry from an already validated config file.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Self {
        let strategies = file_cfg
            .strategies
            .iter()
            .map(|cfg| {
                let strategy: Box<dyn Strategy> = Box::new(SweepStrategy::new(cfg.clone()));
                info!(
                    name = %strategy.name(),
                    symbol = %strategy.symbol(),
                    method = %cfg.detection.method,
                    "Registered strategy"
                );
                strategy
            })
            .collect();

        Self::with_strategies(strategies)
    }

    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self {
            strategies,
            history: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Symbols watched by at least one strategy, in registration order.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        for s in &self.strategies {
            if !symbols.iter().any(|known| known == s.symbol()) {
                symbols.push(s.symbol().to_string());
            }
        }
        symbols
    }

    pub fn history(&self, symbol: &str) -> &[Bar] {
        self.history.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append one closed bar for `symbol` and evaluate every strategy
    /// watching it. Bars older than the last one seen are dropped.
    pub fn process(&mut self, symbol: &str, bar: Bar) -> Vec<StrategyEvent> {
        let history = self.history.entry(symbol.to_string()).or_default();
        if let Some(last) = history.last() {
            if bar.timestamp < last.timestamp {
                warn!(
                    symbol,
                    bar = %bar.timestamp,
                    last = %last.timestamp,
                    "Out-of-order bar dropped"
                );
                return Vec::new();
            }
        }
        history.push(bar);
        let history = history.as_slice();

        let mut out = Vec::new();
        for strategy in self.strategies.iter_mut().filter(|s| s.symbol() == symbol) {
            for event in strategy.evaluate(history) {
                out.push(StrategyEvent {
                    strategy: strategy.name().to_string(),
                    symbol: symbol.to_string(),
                    quantity: strategy.quantity(),
                    event,
                });
            }
        }
        out
    }
}

// ─── Concrete strategy types ──────────────────────────────────────────────────

/// Liquidity-sweep strategy: streaming detector feeding a signal sequencer.
pub struct SweepStrategy {
    cfg: StrategyConfig,
    detector: StreamingDetector,
    atr: AtrIndicator,
    sequencer: SignalSequencer,
}

impl SweepStrategy {
    pub fn new(cfg: StrategyConfig) -> Self {
        Self {
            detector: StreamingDetector::new(cfg.detection.clone()),
            atr: AtrIndicator::new(cfg.detection.atr_length),
            sequencer: SignalSequencer::new(cfg.risk.clone()),
            cfg,
        }
    }

    pub fn sequencer(&self) -> &SignalSequencer {
        &self.sequencer
    }
}

impl Strategy for SweepStrategy {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn symbol(&self) -> &str {
        &self.cfg.symbol
    }

    fn quantity(&self) -> f64 {
        self.cfg.quantity
    }

    fn evaluate(&mut self, history: &[Bar]) -> Vec<TradeEvent> {
        let Some(bar) = history.last() else {
            return Vec::new();
        };
        let index = history.len() - 1;

        let signal = self.detector.next(history);
        let atr = self.atr.compute(history).ok();
        if let Some(level) = signal.sweep_level() {
            debug!(
                strategy = %self.cfg.name,
                bar = index,
                level,
                bullish = signal.bullish.is_some(),
                bearish = signal.bearish.is_some(),
                "Sweep detected"
            );
        }

        self.sequencer.on_bar(index, bar, &signal, atr)
    }
}
