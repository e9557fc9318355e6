use clap::Subcommand;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config;
use crate::services::audit::maintenance::{self, CheckReport, MaintenanceReport};
use crate::services::audit::SecureAuditLog;

#[derive(Subcommand)]
pub enum AuditCommands {
    #[command(about = "Show the audit log directory, global log tail and recent tenant logs")]
    Check,

    #[command(about = "Compress old logs, apply retention and verify signatures")]
    Maintain {
        #[arg(long, help = "Report what would change without touching files")]
        dry_run: bool,
    },
}

pub async fn handle(cmd: AuditCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let log = SecureAuditLog::from_config();

    match cmd {
        AuditCommands::Check => {
            let report = tokio::task::spawn_blocking(move || maintenance::check(&log)).await?;
            match output_format {
                OutputFormat::Json => output_details(&output_format, "Audit logs", &report),
                OutputFormat::Text => {
                    print_check(&report);
                    Ok(())
                }
            }
        }
        AuditCommands::Maintain { dry_run } => {
            let retention_days = config::config().audit.retention_days;
            let report = tokio::task::spawn_blocking(move || maintenance::maintain(&log, retention_days, dry_run)).await?;
            match output_format {
                OutputFormat::Json => output_details(&output_format, "Audit maintenance", &report)?,
                OutputFormat::Text => print_maintenance(&report),
            }
            if report.errors.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} errors during audit log maintenance", report.errors.len()))
            }
        }
    }
}

fn print_check(report: &CheckReport) {
    println!("Directory: {}", report.directory.display());
    if !report.directory_exists {
        println!("  (does not exist yet)");
        return;
    }
    match &report.global_log {
        Some(info) => {
            println!("Global log: {} ({})", info.path.display(), format_size(info.size));
            for line in &report.global_tail {
                println!("  {}", line);
            }
        }
        None => println!("Global log: not found"),
    }
    println!("Tenant logs: {}", report.tenant_log_count);
    for info in &report.recent_tenant_logs {
        let modified = info
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("  {} {} {}", info.path.display(), format_size(info.size), modified);
    }
}

fn print_maintenance(report: &MaintenanceReport) {
    let verb = if report.dry_run { "Would" } else { "Did" };
    println!("{} compress {} files", verb, report.compressed.len());
    for path in &report.compressed {
        println!("  {}", path.display());
    }
    println!("{} delete {} files", verb, report.deleted.len());
    for path in &report.deleted {
        println!("  {}", path.display());
    }
    for file in &report.verified {
        if file.valid {
            println!("✓ {}", file.path.display());
            continue;
        }
        println!("✗ {} ({} invalid entries)", file.path.display(), file.invalid_entries.len());
        for entry in &file.invalid_entries {
            println!("    line {}: {} [{}]", entry.line, entry.error, entry.content);
        }
    }
    for error in &report.errors {
        eprintln!("Error: {}", error);
    }
}
