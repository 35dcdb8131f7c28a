use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Error, Result};
use risk::RiskConfig;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// name = "BTC 4h pivot sweeps"
/// symbol = "BTCUSD"
/// quantity = 0.01
///
/// [strategy.detection]
/// method = "pivot_based"
/// left_bars = 10
/// right_bars = 5
/// sweep_threshold = 0.001
///
/// [strategy.risk]
/// risk_reward_ratio = 2.0
/// use_confirmation = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Human-readable name shown in logs and reports.
    pub name: String,
    /// Symbol whose bars this strategy evaluates, e.g. "BTCUSD".
    pub symbol: String,
    /// Position size in base asset units, used by the backtest.
    pub quantity: f64,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

/// Which sweep test the detector runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Pierce-and-reclaim of the lowest low / highest high of the previous
    /// `lookback` bars.
    Lookback,
    /// Pierce (beyond a tolerance) and reclaim of the latest confirmed pivot.
    #[default]
    PivotBased,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::Lookback => write!(f, "lookback"),
            DetectionMethod::PivotBased => write!(f, "pivot_based"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub method: DetectionMethod,
    /// Bars in the prior-extreme window (lookback method).
    pub lookback: usize,
    pub left_bars: usize,
    pub right_bars: usize,
    /// Fractional overshoot beyond a pivot that counts as a breach
    /// (0.001 = 0.1%).
    pub sweep_threshold: f64,
    pub atr_length: usize,
    /// ATR multiple for the stop levels drawn by the annotation adapter.
    pub atr_multiplier: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::PivotBased,
            lookback: 20,
            left_bars: 10,
            right_bars: 5,
            sweep_threshold: 0.001,
            atr_length: 14,
            atr_multiplier: 0.5,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("lookback", self.lookback),
            ("left_bars", self.left_bars),
            ("right_bars", self.right_bars),
            ("atr_length", self.atr_length),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfiguration(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        if !(self.atr_multiplier.is_finite() && self.atr_multiplier > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "atr_multiplier must be positive, got {}",
                self.atr_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.sweep_threshold) {
            return Err(Error::InvalidConfiguration(format!(
                "sweep_threshold must be in [0, 1), got {}",
                self.sweep_threshold
            )));
        }
        Ok(())
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "strategy '{}': quantity must be positive, got {}",
                self.name, self.quantity
            )));
        }
        self.detection
            .validate()
            .and_then(|_| self.risk.validate())
            .map_err(|e| match e {
                Error::InvalidConfiguration(msg) => {
                    Error::InvalidConfiguration(format!("strategy '{}': {msg}", self.name))
                }
                other => other,
            })
    }
}

impl StrategyFileConfig {
    /// Load and validate a TOML file. Any invalid strategy rejects the
    /// whole file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: StrategyFileConfig = toml::from_str(content)?;
        if file.strategies.is_empty() {
            return Err(Error::InvalidConfiguration(
                "no [[strategy]] entries configured".into(),
            ));
        }
        for strategy in &file.strategies {
            strategy.validate()?;
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[strategy]]
name = "pivots"
symbol = "BTCUSD"
quantity = 0.5

[strategy.detection]
method = "pivot_based"
right_bars = 3

[strategy.risk]
use_confirmation = true

[[strategy]]
name = "lookback"
symbol = "ETHUSD"
quantity = 2.0

[strategy.detection]
method = "lookback"
lookback = 30
"#;

    #[test]
    fn parses_with_defaults() {
        let file = StrategyFileConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(file.strategies.len(), 2);

        let pivots = &file.strategies[0];
        assert_eq!(pivots.detection.method, DetectionMethod::PivotBased);
        assert_eq!(pivots.detection.left_bars, 10);
        assert_eq!(pivots.detection.right_bars, 3);
        assert!(pivots.risk.use_confirmation);
        assert_eq!(pivots.risk.stop_atr_multiplier, 1.5);

        let lookback = &file.strategies[1];
        assert_eq!(lookback.detection.method, DetectionMethod::Lookback);
        assert_eq!(lookback.detection.lookback, 30);
        assert_eq!(lookback.risk, RiskConfig::default());
    }

    #[test]
    fn rejects_invalid_detection_values() {
        let bad = [
            DetectionConfig { lookback: 0, ..DetectionConfig::default() },
            DetectionConfig { right_bars: 0, ..DetectionConfig::default() },
            DetectionConfig { atr_length: 0, ..DetectionConfig::default() },
            DetectionConfig { atr_multiplier: 0.0, ..DetectionConfig::default() },
            DetectionConfig { sweep_threshold: 1.0, ..DetectionConfig::default() },
            DetectionConfig { sweep_threshold: -0.01, ..DetectionConfig::default() },
        ];
        for cfg in bad {
            assert!(
                matches!(cfg.validate(), Err(Error::InvalidConfiguration(_))),
                "{cfg:?} should be rejected"
            );
        }
        assert!(DetectionConfig { sweep_threshold: 0.0, ..DetectionConfig::default() }
            .validate()
            .is_ok());
    }

    #[test]
    fn invalid_strategy_rejects_file() {
        let content = SAMPLE.replace("quantity = 2.0", "quantity = 0.0");
        let err = StrategyFileConfig::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("lookback"), "{err}");
    }

    #[test]
    fn unknown_method_is_parse_error() {
        let content = SAMPLE.replace("method = \"lookback\"", "method = \"fractal\"");
        assert!(matches!(
            StrategyFileConfig::from_toml(&content),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(StrategyFileConfig::from_toml("strategy = []").is_err());
    }
}
