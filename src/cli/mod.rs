pub mod commands;
pub mod config;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "sda")]
#[command(about = "SDA portal CLI - audits, edge functions and admin sessions")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Data audits over the hosted tables (requires the service-role key)")]
    Audit {
        #[command(subcommand)]
        cmd: commands::audit::AuditCommands,
    },

    #[command(about = "Invoke and health-check edge functions")]
    Edge {
        #[command(subcommand)]
        cmd: commands::edge::EdgeCommands,
    },

    #[command(about = "Admin sign-in, sign-out and account sign-up")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Audit { cmd } => commands::audit::handle(cmd, output_format).await,
        Commands::Edge { cmd } => commands::edge::handle(cmd, output_format).await,
        Commands::Auth { cmd } => commands::auth::handle(cmd, output_format).await,
    }
}
