mod cli;
mod commands;
mod output;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands, OutputFormat};
use output::print_error;
use ticketreg_cache::ClusterClient;
use ticketreg_registry::config::loader;
use ticketreg_registry::{CacheTicketRegistry, RegistryConfig, observability};

/// Filter used until the configuration has been loaded.
const STARTUP_LOG_LEVEL: &str = "warn";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or(STARTUP_LOG_LEVEL));

    match &cli.command {
        Commands::GenerateKey(args) => commands::config::generate_key(args, format),
        command => {
            let config = loader::load_config(cli.config.as_deref())?;
            if cli.log_level.is_none() {
                observability::apply_logging_config(&config.logging);
            }
            dispatch(command, &config, format).await
        }
    }
}

async fn dispatch(command: &Commands, config: &RegistryConfig, format: OutputFormat) -> Result<()> {
    match command {
        Commands::CheckConfig => commands::config::check_config(config, format)?,
        Commands::GenerateKey(args) => commands::config::generate_key(args, format)?,
        Commands::Locate(args) => {
            let (client, registry) = connect(config)?;
            commands::cluster::locate(&registry, &client, &args.ticket_id, format)?;
        }
        Commands::Ping => {
            let (client, _) = connect(config)?;
            commands::cluster::ping(&client, config.cache.operation_timeout, format).await?;
        }
        Commands::Get(args) => {
            let (_, registry) = connect(config)?;
            commands::ticket::get(&registry, &args.ticket_id, format).await?;
        }
        Commands::Delete(args) => {
            let (_, registry) = connect(config)?;
            commands::ticket::delete(&registry, args).await?;
        }
        Commands::Touch(args) => {
            let (_, registry) = connect(config)?;
            commands::ticket::touch(&registry, &args.ticket_id).await?;
        }
    }
    Ok(())
}

/// Builds the cluster client and a registry sharing it.
fn connect(config: &RegistryConfig) -> Result<(Arc<ClusterClient>, CacheTicketRegistry)> {
    let client = Arc::new(ClusterClient::from_config(&config.cache)?);
    let registry = CacheTicketRegistry::with_client(config, client.clone())?;
    Ok((client, registry))
}
