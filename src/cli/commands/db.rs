use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::manager::DatabaseManager;

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Create the application database when missing")]
    Create,

    #[command(about = "Apply pending migrations")]
    Migrate,
}

pub async fn handle(cmd: DbCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        DbCommands::Create => {
            let name = DatabaseManager::database_name()?;
            let created = DatabaseManager::create_database().await?;
            let message = if created {
                format!("Database '{}' created", name)
            } else {
                format!("Database '{}' already exists", name)
            };
            output_success(&output_format, &message, Some(json!({ "database": name, "created": created })))
        }
        DbCommands::Migrate => {
            DatabaseManager::run_migrations().await?;
            output_success(&output_format, "Migrations applied", None)
        }
    }
}
