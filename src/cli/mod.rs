pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "tienda")]
#[command(about = "Tienda CLI - database, tenant, subscription, audit and backup administration")]
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
    #[command(about = "Database creation and migrations")]
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCommands,
    },

    #[command(about = "Tenant management")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Subscription plan catalogue")]
    Plans {
        #[command(subcommand)]
        cmd: commands::plans::PlanCommands,
    },

    #[command(about = "Tenant subscriptions")]
    Subscriptions {
        #[command(subcommand)]
        cmd: commands::plans::SubscriptionCommands,
    },

    #[command(about = "Sample data")]
    Seed {
        #[command(subcommand)]
        cmd: commands::seed::SeedCommands,
    },

    #[command(about = "Signed audit log files")]
    Audit {
        #[command(subcommand)]
        cmd: commands::audit::AuditCommands,
    },

    #[command(about = "User data backups")]
    Backup {
        #[command(subcommand)]
        cmd: commands::backup::BackupCommands,
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

    let result = match cli.command {
        Commands::Db { cmd } => commands::db::handle(cmd, output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
        Commands::Plans { cmd } => commands::plans::handle_plans(cmd, output_format).await,
        Commands::Subscriptions { cmd } => commands::plans::handle_subscriptions(cmd, output_format).await,
        Commands::Seed { cmd } => commands::seed::handle(cmd, output_format).await,
        Commands::Audit { cmd } => commands::audit::handle(cmd, output_format).await,
        Commands::Backup { cmd } => commands::backup::handle(cmd, output_format).await,
    };
    crate::database::manager::DatabaseManager::close_all().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_output_flags_after_subcommands() {
        let cli = Cli::try_parse_from(["tienda", "tenant", "list", "--json"]).unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));

        let cli = Cli::try_parse_from(["tienda", "audit", "maintain", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit {
                cmd: commands::audit::AuditCommands::Maintain { dry_run: true }
            }
        ));
    }

    #[test]
    fn backup_commands_require_their_ids() {
        assert!(Cli::try_parse_from(["tienda", "backup", "create"]).is_err());
        assert!(Cli::try_parse_from(["tienda", "backup", "restore", "--backup-id", "4"]).is_ok());
    }
}
