use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::services::payment_service::PaymentService;

#[derive(Subcommand)]
pub enum SeedCommands {
    #[command(about = "Give every published store the sample payment methods")]
    PaymentMethods,
}

pub async fn handle(cmd: SeedCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SeedCommands::PaymentMethods => {
            let summary = PaymentService::new().await?.seed_payment_methods().await?;
            output_success(
                &output_format,
                &format!(
                    "{} payment methods created, {} already present, across {} stores",
                    summary.created, summary.skipped, summary.stores
                ),
                Some(json!({ "summary": summary })),
            )
        }
    }
}
