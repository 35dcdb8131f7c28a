use std::path::PathBuf;

use crate::{Error, Result};

/// What the binary does with the loaded bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Replay bars through the strategies and simulate fills.
    Backtest,
    /// Emit per-bar sweep annotations as JSON lines.
    Annotate,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Backtest => write!(f, "backtest"),
            RunMode::Annotate => write!(f, "annotate"),
        }
    }
}

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// CSV file of OHLC bars.
    pub bars_path: PathBuf,
    /// Symbol the bars belong to; strategies are matched against it.
    pub symbol: String,
    pub run_mode: RunMode,

    // Backtest
    pub paper_slippage_bps: f64,
    pub initial_balance: f64,
    pub report_path: Option<PathBuf>,

    // Annotations
    pub annotations_path: Option<PathBuf>,

    // Strategy config file path
    pub strategy_config_path: PathBuf,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let run_mode = match optional_env("RUN_MODE")
            .unwrap_or_else(|| "backtest".to_string())
            .to_lowercase()
            .as_str()
        {
            "backtest" => RunMode::Backtest,
            "annotate" => RunMode::Annotate,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "RUN_MODE must be 'backtest' or 'annotate', got: '{other}'"
                )))
            }
        };

        let paper_slippage_bps = parse_env("PAPER_SLIPPAGE_BPS", 0.0)?;
        if paper_slippage_bps < 0.0 {
            return Err(Error::InvalidConfiguration(
                "PAPER_SLIPPAGE_BPS must not be negative".into(),
            ));
        }
        let initial_balance = parse_env("INITIAL_BALANCE", 10_000.0)?;
        if initial_balance <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "INITIAL_BALANCE must be positive".into(),
            ));
        }

        Ok(Config {
            bars_path: required_env("BARS_PATH")?.into(),
            symbol: optional_env("SYMBOL").unwrap_or_else(|| "BTCUSD".to_string()),
            run_mode,
            paper_slippage_bps,
            initial_balance,
            report_path: optional_env("REPORT_PATH").map(PathBuf::from),
            annotations_path: optional_env("ANNOTATIONS_PATH").map(PathBuf::from),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string())
                .into(),
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::InvalidConfiguration(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env(key: &str, default: f64) -> Result<f64> {
    match optional_env(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::InvalidConfiguration(format!("{key} must be a number, got: '{raw}'"))
        }),
        None => Ok(default),
    }
}
