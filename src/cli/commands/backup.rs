use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::BackupType;
use crate::services::backup_service::BackupService;

#[derive(Subcommand)]
pub enum BackupCommands {
    #[command(about = "Export a user's data to a backup archive")]
    Create {
        #[arg(long, help = "User to back up")]
        user_id: i64,
    },

    #[command(about = "Restore a stored backup into its owner's account")]
    Restore {
        #[arg(long, help = "Backup to restore")]
        backup_id: i64,
    },
}

pub async fn handle(cmd: BackupCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let service = BackupService::new().await?;

    match cmd {
        BackupCommands::Create { user_id } => {
            let user = service.find_user(user_id).await?;
            let backup = service
                .create_for(&user, None, BackupType::Automatic, "Backup desde la línea de comandos", "")
                .await?;
            output_success(
                &output_format,
                &format!(
                    "Backup {} of '{}' written to {} ({})",
                    backup.id,
                    user.username,
                    backup.file,
                    format_size(backup.size.max(0) as u64)
                ),
                Some(json!({ "backup": backup })),
            )
        }
        BackupCommands::Restore { backup_id } => {
            let owner = service.restore_by_id(backup_id).await?;
            output_success(
                &output_format,
                &format!("Backup {} restored into '{}'", backup_id, owner.username),
                Some(json!({ "backup_id": backup_id, "user_id": owner.id })),
            )
        }
    }
}
