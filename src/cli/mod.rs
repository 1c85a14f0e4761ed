pub mod commands;
pub mod context;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use context::CliContext;

#[derive(Parser)]
#[command(name = "tenancyctl")]
#[command(about = "Tenant administration against the configured stores")]
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
    #[command(about = "Create, inspect and change tenants")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Current-period usage counters")]
    Usage {
        #[command(subcommand)]
        cmd: commands::usage::UsageCommands,
    },

    #[command(about = "Show the plan catalogue")]
    Plans,

    #[command(about = "Issue a bearer token")]
    Token(commands::token::TokenArgs),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
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
    let config = crate::config::config();

    match cli.command {
        Commands::Plans => commands::plans::handle(output_format),
        Commands::Token(args) => commands::token::handle(args, config, output_format),
        Commands::Tenant { cmd } => {
            let ctx = CliContext::open(config).await?;
            commands::tenant::handle(cmd, &ctx, output_format).await
        }
        Commands::Usage { cmd } => {
            let ctx = CliContext::open(config).await?;
            commands::usage::handle(cmd, &ctx, output_format).await
        }
    }
}
