mod main_runtime;

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use main_runtime::{init_logging, init_logging_simple};
use vigil::adapters::PaperComponents;
use vigil::cli::{self, Cli, Commands};
use vigil::config::AppConfig;
use vigil::coordination::install_signal_handlers;
use vigil::error::{Result, VigilError};
use vigil::TradingBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, live } => run(config.as_deref(), live).await,
        Commands::Status { state_file } => {
            init_logging_simple();
            let path = cli::status_path(state_file);
            cli::show_status(&path).await
        }
    }
}

async fn run(config_path: Option<&Path>, live: bool) -> Result<()> {
    let config = AppConfig::load_from(config_path)?;
    let _log_guard = init_logging(&config.logging);

    if live {
        error!("live order execution is not available in this build");
        return Err(VigilError::InvalidConfig(vec![
            "live trading is not supported; run without --live for paper trading".to_string(),
        ]));
    }

    info!(
        exchange = %config.exchange.name,
        pairs = ?config.trading.pairs,
        "starting vigil in paper trading mode"
    );

    let factory = Arc::new(PaperComponents::new());
    let bot = TradingBot::new(config, factory, true)?;

    // Signal tasks only request shutdown; the bot performs it
    install_signal_handlers(bot.shutdown_controller());

    // Connections opened before the failing step are already released
    bot.initialize().await?;

    bot.start().await?;
    info!(state = %bot.state(), "vigil exited");
    Ok(())
}
