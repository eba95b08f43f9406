//! Auth commands - Check tenant credentials
//!
//! `spsync auth test --tenant T` reads the client secret from the tenant's
//! environment variable and requests an app-only token.

use anyhow::{bail, Result};
use clap::Subcommand;

use spsync_core::ports::IAuthenticator;

use super::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Request a token for a tenant
    Test {
        #[arg(long)]
        tenant: String,
    },
}

impl AuthCommand {
    pub async fn execute(&self, context: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        match self {
            AuthCommand::Test { tenant } => {
                let tenant = context.tenant(tenant)?;
                let auth = context.authenticator()?;

                match auth.get_token(tenant).await {
                    Ok(token) => {
                        if format.is_json() {
                            fmt.print_json(&serde_json::json!({
                                "tenant": tenant.id.as_str(),
                                "success": true,
                                "expires_at": token.expires_at().to_rfc3339(),
                            }));
                        } else {
                            fmt.success(&format!(
                                "Authenticated as app {} in {}",
                                tenant.client_id,
                                tenant.display_name()
                            ));
                            fmt.info(&format!(
                                "Token valid until {}",
                                token.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
                            ));
                        }
                        Ok(())
                    }
                    Err(e) => {
                        if format.is_json() {
                            fmt.print_json(&serde_json::json!({
                                "tenant": tenant.id.as_str(),
                                "success": false,
                                "error": e.to_string(),
                            }));
                        }
                        bail!("Authentication failed for tenant {}: {e}", tenant.id)
                    }
                }
            }
        }
    }
}
