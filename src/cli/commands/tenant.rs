use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::Tenant;
use crate::services::tenant_service::TenantService;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List all tenants")]
    List,

    #[command(about = "Create new tenant")]
    Create {
        #[arg(help = "Tenant (company) name")]
        name: String,
    },

    #[command(about = "Create the initial tenant living in the public schema")]
    Initial,

    #[command(about = "Give every user without a tenant its own tenant")]
    Assign,

    #[command(about = "Activate tenant")]
    Activate {
        #[arg(help = "Tenant ID")]
        id: i64,
    },

    #[command(about = "Deactivate tenant")]
    Deactivate {
        #[arg(help = "Tenant ID")]
        id: i64,
    },
}

fn tenant_json(tenant: &Tenant) -> serde_json::Value {
    json!({
        "id": tenant.id,
        "name": tenant.name,
        "schema_name": tenant.schema_name,
        "domain": tenant.domain,
        "is_active": tenant.is_active,
    })
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let service = TenantService::new().await?;

    match cmd {
        TenantCommands::List => {
            let tenants = service.list_tenants().await?;
            if tenants.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants found");
            }

            match output_format {
                OutputFormat::Json => {
                    let tenants: Vec<_> = tenants.iter().map(tenant_json).collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "tenants": tenants }))?);
                }
                OutputFormat::Text => {
                    println!("{:<6} {:<30} {:<30} {:<8} {}", "ID", "NAME", "SCHEMA", "ACTIVE", "CREATED");
                    println!("{}", "-".repeat(90));
                    for tenant in &tenants {
                        println!(
                            "{:<6} {:<30} {:<30} {:<8} {}",
                            tenant.id,
                            tenant.name,
                            tenant.schema_name,
                            if tenant.is_active { "yes" } else { "no" },
                            tenant.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }
            Ok(())
        }
        TenantCommands::Create { name } => {
            let tenant = service.create_tenant(&name).await?;
            output_success(
                &output_format,
                &format!("Tenant '{}' created with schema '{}'", tenant.name, tenant.schema_name),
                Some(json!({ "tenant": tenant_json(&tenant) })),
            )
        }
        TenantCommands::Initial => {
            let (tenant, created) = service.create_initial_tenant().await?;
            let message = if created {
                format!("Initial tenant '{}' created", tenant.name)
            } else {
                format!("Initial tenant '{}' already exists", tenant.name)
            };
            output_success(
                &output_format,
                &message,
                Some(json!({ "tenant": tenant_json(&tenant), "created": created })),
            )
        }
        TenantCommands::Assign => {
            let summary = service.assign_tenants().await?;
            if let OutputFormat::Text = output_format {
                for (user, tenant) in &summary.assigned {
                    println!("  {} -> {}", user, tenant);
                }
                for (user, error) in &summary.failed {
                    eprintln!("  {} failed: {}", user, error);
                }
            }
            output_success(
                &output_format,
                &format!(
                    "{} users assigned, {} failed",
                    summary.assigned.len(),
                    summary.failed.len()
                ),
                Some(json!({ "summary": summary })),
            )
        }
        TenantCommands::Activate { id } => set_active(&service, id, true, &output_format).await,
        TenantCommands::Deactivate { id } => set_active(&service, id, false, &output_format).await,
    }
}

async fn set_active(service: &TenantService, id: i64, active: bool, output_format: &OutputFormat) -> anyhow::Result<()> {
    let tenant = service.set_active(id, active).await?;
    output_success(
        output_format,
        &format!(
            "Tenant '{}' {}",
            tenant.name,
            if active { "activated" } else { "deactivated" }
        ),
        Some(json!({ "tenant": tenant_json(&tenant) })),
    )
}
