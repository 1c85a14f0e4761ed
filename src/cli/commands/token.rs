use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Claims, JwtVerifier, ROOT_ACCESS};
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::AppConfig;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, default_value = "operator", help = "Token subject")]
    pub sub: String,

    #[arg(long, help = "Tenant the token is scoped to")]
    pub tenant: Option<Uuid>,

    #[arg(long, help = "Grant root access to the administration routes")]
    pub root: bool,

    #[arg(long, help = "Lifetime in hours (defaults to the configured expiry)")]
    pub hours: Option<u64>,
}

pub fn handle(args: TokenArgs, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let verifier = JwtVerifier::new(config.security.jwt_secret.clone())?;
    let access = if args.root { ROOT_ACCESS } else { "user" };
    let hours = args.hours.unwrap_or(config.security.jwt_expiry_hours);
    let claims = Claims::new(args.sub, args.tenant, access, hours);
    let token = verifier.issue(&claims)?;

    match output_format {
        OutputFormat::Json => output_json(&json!({ "token": token, "claims": claims }))?,
        OutputFormat::Text => println!("{}", token),
    }
    Ok(())
}
