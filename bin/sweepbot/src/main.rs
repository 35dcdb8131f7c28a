use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{feed, Config, RunMode};
use paper::{run_backtest, write_report, PaperBroker};
use strategy::{annotate, write_json_lines, StrategyFileConfig, StrategyRegistry};

fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid environment configuration")?;
    info!(mode = %cfg.run_mode, symbol = %cfg.symbol, "SweepBot starting");

    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path).with_context(|| {
        format!(
            "failed to load strategy config {}",
            cfg.strategy_config_path.display()
        )
    })?;

    // ── Bars ──────────────────────────────────────────────────────────────────
    let bars = feed::load_bars(&cfg.bars_path)
        .with_context(|| format!("failed to load bars from {}", cfg.bars_path.display()))?;
    info!(bars = bars.len(), path = %cfg.bars_path.display(), "Bars loaded");

    match cfg.run_mode {
        RunMode::Backtest => backtest(&cfg, &strategy_file, &bars),
        RunMode::Annotate => annotations(&cfg, &strategy_file, &bars),
    }
}

fn backtest(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    bars: &[common::Bar],
) -> anyhow::Result<()> {
    let mut registry = StrategyRegistry::from_config(strategy_file);
    if !registry.symbols().iter().any(|s| *s == cfg.symbol) {
        warn!(symbol = %cfg.symbol, "No strategy watches this symbol");
    }

    let mut broker = PaperBroker::new(cfg.initial_balance, cfg.paper_slippage_bps);
    let report = run_backtest(&mut registry, &cfg.symbol, bars, &mut broker);
    info!(
        trades = report.trades.len(),
        final_balance = report.final_balance,
        profit_factor = ?report.profit_factor,
        max_drawdown_pct = report.max_drawdown_pct,
        "Backtest report"
    );

    let out = output(cfg.report_path.as_deref())?;
    write_report(&report, out).context("failed to write backtest report")?;
    Ok(())
}

fn annotations(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    bars: &[common::Bar],
) -> anyhow::Result<()> {
    let strategies: Vec<_> = strategy_file
        .strategies
        .iter()
        .filter(|s| s.symbol == cfg.symbol)
        .collect();

    // Annotations describe one detector configuration.
    let Some(strategy_cfg) = strategies.first() else {
        bail!("no strategy configured for symbol {}", cfg.symbol);
    };
    if strategies.len() > 1 {
        warn!(
            symbol = %cfg.symbol,
            using = %strategy_cfg.name,
            "Several strategies watch this symbol; annotating with the first"
        );
    }

    let records = annotate(
        &cfg.symbol,
        bars,
        &strategy_cfg.detection,
        strategy_cfg.risk.risk_reward_ratio,
    );
    for alert in records.iter().filter_map(|r| r.alert.as_deref()) {
        info!(alert, "Sweep alert");
    }

    let out = output(cfg.annotations_path.as_deref())?;
    write_json_lines(&records, out).context("failed to write annotations")?;
    Ok(())
}

/// File at `path`, or stdout when unset.
fn output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    })
}
