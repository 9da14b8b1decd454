use clap::{Parser, Subcommand};

mod commands;
mod prompt;

use commands::RunArgs;

#[derive(Parser)]
#[command(name = "signal-trader")]
#[command(about = "Signal-driven crypto trading engine (paper trading on Bybit market data)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop until Ctrl+C
    Run(RunArgs),
    /// List the available strategies
    Strategies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(RunArgs {
            log_file: Some(path),
            ..
        }) => {
            // Log to file so the shutdown prompt stays readable
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();
        }
    }

    match cli.command {
        Commands::Run(args) => {
            commands::run_trading(args).await?;
        }
        Commands::Strategies => {
            commands::list_strategies();
        }
    }

    Ok(())
}
