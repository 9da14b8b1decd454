//! `run` command: wires config, market data, strategies and the execution loop.

use crate::prompt::ConsolePrompt;
use anyhow::{bail, Context, Result};
use clap::Args;
use rust_decimal::Decimal;
use signal_trader_bybit::{BybitClient, PaperExchange, BYBIT_API};
use signal_trader_core::{
    ConfigLoader, ConfigWatcher, FileConfigSource, KillSwitch, LiveConfigUpdate, SystemClock,
};
use signal_trader_engine::{EngineEvent, EngineParts, ExecutionLoop, RunSummary};
use signal_trader_strategy::StrategyRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Strategy identifier (see `signal-trader strategies`)
    #[arg(long)]
    pub strategy: String,

    /// Trading symbol (e.g., "BTCUSDT")
    #[arg(long)]
    pub symbol: String,

    /// Seconds between trading ticks
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub check_interval: u64,

    /// Directory holding Config.toml and trading_config.json
    #[arg(long, env = "SIGNAL_TRADER_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Candle timeframe (1m, 5m, 15m, 1h, 4h, 1d, ...); keeps the live file's value if omitted
    #[arg(long)]
    pub timeframe: Option<String>,

    /// Bybit REST endpoint for market data
    #[arg(long, env = "BYBIT_API_URL", default_value = BYBIT_API)]
    pub api_url: String,

    /// Paper commission as a fraction of notional
    #[arg(long, default_value = "0.00055")]
    pub commission_rate: Decimal,

    /// Paper slippage on market orders, in basis points
    #[arg(long, default_value = "5")]
    pub slippage_bps: Decimal,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long)]
    pub log_file: Option<String>,
}

impl RunArgs {
    fn live_update(&self) -> LiveConfigUpdate {
        LiveConfigUpdate {
            timeframe: self.timeframe.clone(),
            strategy: Some(self.strategy.clone()),
            symbol: Some(self.symbol.to_uppercase()),
            check_interval: Some(self.check_interval),
            enabled: Some(true),
        }
    }
}

pub fn list_strategies() {
    let registry = StrategyRegistry::default();
    println!("Available strategies:");
    for id in registry.ids() {
        if let Some(strategy) = registry.get(id) {
            println!("  {:<18} needs {} bars", id, strategy.min_bars());
        }
    }
}

/// Runs the trading loop until Ctrl+C, then drains and prints a summary.
///
/// # Errors
/// Returns an error if the config cannot be prepared, the strategy is unknown,
/// or startup reconciliation fails.
pub async fn run_trading(args: RunArgs) -> Result<()> {
    let registry = Arc::new(StrategyRegistry::default());
    if registry.get(&args.strategy).is_none() {
        bail!(
            "Unknown strategy: {}. Available: {}",
            args.strategy,
            registry.ids().join(", ")
        );
    }

    // The command line is written through to the live file so the frontend sees it
    ConfigLoader::update_live_file(&args.config_dir, &args.live_update())?;
    let config = ConfigLoader::load(&args.config_dir)?;

    tracing::info!(
        "Starting {} on {} ({}), checking every {}s",
        config.strategy,
        config.symbol,
        config.timeframe,
        config.check_interval
    );

    let (watcher, config_rx) =
        ConfigWatcher::new(FileConfigSource::new(&args.config_dir), config.clone())
            .context("Initial configuration is invalid")?;

    let market = BybitClient::new(&args.api_url, config.exchange_timeout())
        .context("Failed to create Bybit client")?;
    let exchange = Arc::new(PaperExchange::new(
        market,
        config.risk.total_capital,
        args.commission_rate,
        args.slippage_bps,
    ));

    let (engine, handle) = ExecutionLoop::new(EngineParts {
        exchange,
        signal_source: registry,
        config_rx,
        clock: Arc::new(SystemClock),
        kill_switch: KillSwitch::new(),
    });

    let events = engine.subscribe_events();
    tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_task = tokio::spawn(watcher.run(shutdown_rx));

    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, draining");
            if let Err(e) = ctrl_c_handle.shutdown().await {
                tracing::warn!("Failed to request shutdown: {}", e);
            }
        }
    });

    let result = engine.run(ConsolePrompt::stdin()).await;

    let _ = shutdown_tx.send(true);
    match watcher_task.await {
        Ok(Err(e)) => tracing::warn!("Config watcher stopped with error: {:#}", e),
        Err(e) => tracing::warn!("Config watcher task failed: {}", e),
        Ok(Ok(())) => {}
    }
    drop(handle);

    let summary = result?;
    print_summary(&summary);
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::KillSwitchTripped {
                equity,
                peak,
                drawdown,
            }) => {
                tracing::error!(
                    "KILL SWITCH: equity {} is {:.2}% below peak {}; new entries blocked",
                    equity,
                    drawdown * Decimal::ONE_HUNDRED,
                    peak
                );
            }
            Ok(EngineEvent::TickFailed { message, .. }) => {
                tracing::debug!("Tick failed: {}", message);
            }
            Ok(event) => {
                if let Ok(json) = serde_json::to_string(&event) {
                    tracing::debug!(target: "signal_trader::events", "{}", json);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event log lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Session Summary ===");
    println!("Ticks:              {}", summary.ticks);
    println!("Final equity:       {}", summary.final_equity);
    println!("Realized P&L:       {}", summary.realized_pnl);
    println!("Trades closed:      {}", summary.trades_closed);
    println!("Closed on shutdown: {}", summary.closed_on_shutdown);
    if summary.kill_switch_active {
        println!("Kill switch:        ACTIVE");
    }
    if !summary.left_open.is_empty() {
        println!("Left open:");
        for position in &summary.left_open {
            println!(
                "  {} {} {} @ {} (stop {}, target {})",
                position.side,
                position.size,
                position.symbol,
                position.entry_price,
                position.stop_loss,
                position.take_profit
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            strategy: "Moving_Average".to_string(),
            symbol: "ethusdt".to_string(),
            check_interval: 45,
            config_dir: PathBuf::from("config"),
            timeframe: None,
            api_url: BYBIT_API.to_string(),
            commission_rate: Decimal::ZERO,
            slippage_bps: Decimal::ZERO,
            log_file: None,
        }
    }

    #[test]
    fn test_live_update_from_flags() {
        let update = args().live_update();
        assert_eq!(update.strategy.as_deref(), Some("Moving_Average"));
        assert_eq!(update.symbol.as_deref(), Some("ETHUSDT"));
        assert_eq!(update.check_interval, Some(45));
        assert_eq!(update.enabled, Some(true));
        // Timeframe untouched unless given
        assert!(update.timeframe.is_none());
    }

    #[tokio::test]
    async fn test_unknown_strategy_fails_before_touching_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args();
        args.strategy = "martingale".to_string();
        args.config_dir = dir.path().join("config");

        let err = run_trading(args).await.unwrap_err();
        assert!(err.to_string().contains("Unknown strategy: martingale"));
        assert!(!dir.path().join("config").exists());
    }
}
