use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ticketreg")]
#[command(about = "Inspect and manage tickets stored in the cache cluster")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./ticketreg.toml when present)
    #[arg(short, long, global = true, env = "TICKETREG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log filter when RUST_LOG is not set (defaults to logging.level)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    CheckConfig,
    /// Generate a new payload encryption key
    GenerateKey(GenerateKeyArgs),
    /// Show the cache key and node order for a ticket id
    Locate(TicketArgs),
    /// Check that every cache node answers
    Ping,
    /// Read a ticket
    Get(TicketArgs),
    /// Delete a ticket
    Delete(DeleteArgs),
    /// Re-apply the ticket's expiration policy to its cache entry
    Touch(TicketArgs),
}

#[derive(clap::Args)]
pub struct GenerateKeyArgs {
    /// Identifier written into protected payloads
    #[arg(long, default_value = "primary")]
    pub key_id: String,
}

#[derive(clap::Args)]
pub struct TicketArgs {
    /// Ticket id (e.g. TGT-1-...)
    pub ticket_id: String,
}

#[derive(clap::Args)]
pub struct DeleteArgs {
    /// Ticket id (e.g. TGT-1-...)
    pub ticket_id: String,
    /// Also delete every ticket granted from this one
    #[arg(long)]
    pub tree: bool,
}
