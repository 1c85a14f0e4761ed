use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::catalogue;

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let plans = catalogue();

    match output_format {
        OutputFormat::Json => output_json(&plans)?,
        OutputFormat::Text => {
            println!(
                "{:<10} {:<14} {:>12} {:>10} {:>12} {:>8} {:>10}",
                "PLAN", "NAME", "COP/MONTH", "USERS", "API CALLS", "AGENTS", "WHATSAPP"
            );
            println!("{}", "-".repeat(82));
            for plan in &plans {
                println!(
                    "{:<10} {:<14} {:>12} {:>10} {:>12} {:>8} {:>10}",
                    plan.name.as_str(),
                    plan.display_name,
                    plan.monthly_price_cop,
                    format_limit(Some(plan.limits.max_users)),
                    format_limit(Some(plan.limits.max_api_calls_monthly)),
                    format_limit(Some(plan.limits.max_mcp_agents)),
                    format_limit(Some(plan.limits.max_whatsapp_messages)),
                );
                println!("{:<10} features: {}", "", plan.features.join(", "));
            }
        }
    }
    Ok(())
}
