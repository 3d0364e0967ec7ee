//! Docent - document-assistant chat relay and client
//!
//! Main entry point: initializes tracing, loads configuration, and
//! dispatches to the command handlers.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docent::cli::{Cli, Commands};
use docent::commands;
use docent::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!("Starting relay server");
            commands::serve::run_serve(config, bind).await
        }
        Commands::Chat { message } => {
            tracing::info!("Starting chat client");
            commands::chat::run_chat(config, message).await
        }
        Commands::Threads { json } => commands::threads::run_threads(config, json),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "docent=debug" } else { "docent=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
