use clap::Subcommand;
use serde_json::json;

use crate::cli::context::{warn_private_cache, CliContext};
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::{IsolationLevel, Plan, Tenant, TenantStatus};
use crate::services::{CreateTenantInput, TenantSummary};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Onboard a new tenant")]
    Create {
        #[arg(help = "Subdomain label")]
        subdomain: String,

        #[arg(long, help = "Display name")]
        name: String,

        #[arg(long, help = "Owner email, seeded as the first admin")]
        email: String,

        #[arg(long, default_value = "trial")]
        plan: Plan,

        #[arg(long, default_value = "shared")]
        isolation: IsolationLevel,

        #[arg(long, help = "Custom domain")]
        domain: Option<String>,

        #[arg(long = "limit", value_parser = parse_pair::<i64>, help = "Limit override, name=value (repeatable)")]
        limits: Vec<(String, i64)>,

        #[arg(long = "feature", value_parser = parse_pair::<bool>, help = "Feature override, name=true|false (repeatable)")]
        features: Vec<(String, bool)>,
    },

    #[command(about = "Show tenant information")]
    Show {
        #[arg(help = "Tenant ID or subdomain")]
        tenant: String,
    },

    #[command(about = "List tenants")]
    List,

    #[command(about = "Move a tenant to a later lifecycle status")]
    Status {
        #[arg(help = "Tenant ID or subdomain")]
        tenant: String,

        #[arg(help = "trial, active, suspended or deleted")]
        status: TenantStatus,
    },

    #[command(about = "Switch a tenant's plan; limits reset to the plan defaults")]
    Plan {
        #[arg(help = "Tenant ID or subdomain")]
        tenant: String,

        plan: Plan,
    },

    #[command(about = "Show a tenant's audit trail, newest first")]
    Audit {
        #[arg(help = "Tenant ID or subdomain")]
        tenant: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn handle(cmd: TenantCommands, ctx: &CliContext, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::Create { subdomain, name, email, plan, isolation, domain, limits, features } => {
            let mut input = CreateTenantInput::new(subdomain, name, email);
            input.plan = plan;
            input.isolation_level = isolation;
            input.custom_domain = domain;
            input.limit_overrides = limits.into_iter().collect();
            input.features = features.into_iter().collect();

            let tenant = ctx.directory.create(input, &ctx.actor).await?;
            output_tenant(output_format, &tenant)
        }
        TenantCommands::Show { tenant } => {
            let tenant = ctx.find_tenant(&tenant).await?;
            output_tenant(output_format, &tenant)
        }
        TenantCommands::List => {
            let tenants = ctx.directory.list().await?;
            if tenants.is_empty() {
                return output_empty_collection(output_format, "tenants", "No tenants");
            }
            let summaries: Vec<TenantSummary> = tenants.iter().map(TenantSummary::from).collect();

            match output_format {
                OutputFormat::Json => output_json(&json!({ "tenants": summaries }))?,
                OutputFormat::Text => {
                    println!("{:<38} {:<20} {:<10} {:<10} {}", "ID", "SUBDOMAIN", "PLAN", "STATUS", "DISPLAY NAME");
                    println!("{}", "-".repeat(100));
                    for t in &summaries {
                        println!(
                            "{:<38} {:<20} {:<10} {:<10} {}",
                            t.id.to_string(),
                            t.subdomain,
                            t.plan.as_str(),
                            t.status.as_str(),
                            t.display_name
                        );
                    }
                }
            }
            Ok(())
        }
        TenantCommands::Status { tenant, status } => {
            let tenant = ctx.find_tenant(&tenant).await?;
            let updated = ctx.directory.set_status(tenant.id, status, &ctx.actor).await?;
            output_success(
                output_format,
                &format!("Tenant {} is now {}", updated.subdomain, updated.status),
                Some(json!({ "tenant_id": updated.id, "status": updated.status })),
            )
        }
        TenantCommands::Plan { tenant, plan } => {
            let tenant = ctx.find_tenant(&tenant).await?;
            let updated = ctx.directory.change_plan(tenant.id, plan, &ctx.actor).await?;
            warn_private_cache(ctx.counter_backend, ctx.directory.cache_ttl().as_secs());
            output_success(
                output_format,
                &format!("Tenant {} moved to plan {}", updated.subdomain, updated.plan),
                Some(json!({ "tenant_id": updated.id, "plan": updated.plan, "limits": updated.limits })),
            )
        }
        TenantCommands::Audit { tenant, limit } => {
            let tenant = ctx.find_tenant(&tenant).await?;
            let entries = ctx.directory.audit_log(tenant.id, limit).await?;
            if entries.is_empty() {
                return output_empty_collection(output_format, "entries", "No audit entries");
            }

            match output_format {
                OutputFormat::Json => output_json(&json!({ "entries": entries }))?,
                OutputFormat::Text => {
                    println!("{:<17} {:<16} {:<24} {}", "TIME", "ACTION", "ACTOR", "DETAILS");
                    println!("{}", "-".repeat(90));
                    for e in &entries {
                        println!(
                            "{:<17} {:<16} {:<24} {}",
                            e.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                            e.action.as_str(),
                            e.user_id,
                            e.details
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn output_tenant(output_format: OutputFormat, tenant: &Tenant) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => output_json(tenant),
        OutputFormat::Text => {
            output_fields(&[
                ("id", tenant.id.to_string()),
                ("subdomain", tenant.subdomain.clone()),
                ("display name", tenant.display_name.clone()),
                ("custom domain", tenant.custom_domain.clone().unwrap_or_else(|| "-".to_string())),
                ("plan", tenant.plan.to_string()),
                ("status", tenant.status.to_string()),
                ("isolation", format!("{:?}", tenant.config.isolation_level).to_lowercase()),
                ("users", format_limit(Some(tenant.limits.max_users))),
                ("api calls / month", format_limit(Some(tenant.limits.max_api_calls_monthly))),
                ("mcp agents", format_limit(Some(tenant.limits.max_mcp_agents))),
                ("whatsapp messages", format_limit(Some(tenant.limits.max_whatsapp_messages))),
                ("created", tenant.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
            Ok(())
        }
    }
}
