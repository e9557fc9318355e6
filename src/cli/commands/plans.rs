use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::services::subscription_service::SubscriptionService;

#[derive(Subcommand)]
pub enum PlanCommands {
    #[command(about = "Create or update the default plan catalogue")]
    Seed,
}

#[derive(Subcommand)]
pub enum SubscriptionCommands {
    #[command(about = "Put tenants on a 30 day trial")]
    AssignTrial {
        #[arg(long, help = "Plan to use instead of the trial plan")]
        plan_id: Option<i64>,

        #[arg(long, help = "Also reset tenants that already have a subscription")]
        all_tenants: bool,
    },
}

pub async fn handle_plans(cmd: PlanCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PlanCommands::Seed => {
            let seeded = SubscriptionService::new().await?.seed_plans().await?;
            if let OutputFormat::Text = output_format {
                for (name, created) in &seeded {
                    println!("  {} {}", if *created { "+" } else { "~" }, name);
                }
            }
            let created = seeded.iter().filter(|(_, created)| *created).count();
            let plans: Vec<_> = seeded
                .iter()
                .map(|(name, created)| json!({ "name": name, "created": created }))
                .collect();
            output_success(
                &output_format,
                &format!("{} plans created, {} updated", created, seeded.len() - created),
                Some(json!({ "plans": plans })),
            )
        }
    }
}

pub async fn handle_subscriptions(cmd: SubscriptionCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SubscriptionCommands::AssignTrial { plan_id, all_tenants } => {
            let summary = SubscriptionService::new().await?.assign_trial(plan_id, all_tenants).await?;
            if let OutputFormat::Text = output_format {
                for (tenant, error) in &summary.failed {
                    eprintln!("  {} failed: {}", tenant, error);
                }
            }
            output_success(
                &output_format,
                &format!(
                    "Plan '{}' assigned: {} created, {} updated, {} unchanged, {} failed of {} tenants",
                    summary.plan_name,
                    summary.created,
                    summary.updated,
                    summary.unchanged,
                    summary.failed.len(),
                    summary.tenants
                ),
                Some(json!({ "summary": summary })),
            )
        }
    }
}
