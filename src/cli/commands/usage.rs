use clap::Subcommand;
use serde_json::json;

use crate::cli::context::{require_shared_counters, CliContext};
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::{AuditAction, Metric};

#[derive(Subcommand)]
pub enum UsageCommands {
    #[command(about = "Show current-period usage of a tenant")]
    Show {
        #[arg(help = "Tenant ID or subdomain")]
        tenant: String,
    },

    #[command(about = "Reset the current-period counter of one metric")]
    Reset {
        #[arg(help = "Tenant ID or subdomain")]
        tenant: String,

        #[arg(help = "Metric name, e.g. api_calls")]
        metric: Metric,
    },
}

pub async fn handle(cmd: UsageCommands, ctx: &CliContext, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UsageCommands::Show { tenant } => {
            require_shared_counters(ctx.counter_backend, "usage show")?;
            let tenant = ctx.find_tenant(&tenant).await?;
            let report = ctx.quota.usage(&tenant).await?;

            match output_format {
                OutputFormat::Json => output_json(&report)?,
                OutputFormat::Text => {
                    println!(
                        "Tenant {} ({}) on plan {}, period {}",
                        tenant.subdomain, tenant.id, report.plan, report.period.label
                    );
                    println!("{:<22} {:>10} {:>12}", "METRIC", "CURRENT", "LIMIT");
                    println!("{}", "-".repeat(46));
                    for usage in &report.metrics {
                        println!(
                            "{:<22} {:>10} {:>12}",
                            usage.metric.as_str(),
                            usage.current,
                            format_limit(usage.limit)
                        );
                    }
                }
            }
            Ok(())
        }
        UsageCommands::Reset { tenant, metric } => {
            require_shared_counters(ctx.counter_backend, "usage reset")?;
            let tenant = ctx.find_tenant(&tenant).await?;
            ctx.quota.reset(&tenant, &metric).await?;
            ctx.directory
                .audit(tenant.id, &ctx.actor, AuditAction::UsageReset, json!({ "metric": metric }))
                .await;
            output_success(
                output_format,
                &format!("Reset {} for tenant {}", metric, tenant.subdomain),
                Some(json!({ "tenant_id": tenant.id, "metric": metric })),
            )
        }
    }
}
