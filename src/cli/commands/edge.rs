use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::{output_error, output_report};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::edge::{EdgeFunctions, HealthStatus};

#[derive(Subcommand)]
pub enum EdgeCommands {
    #[command(about = "Invoke an edge function (POST with --data, GET otherwise)")]
    Invoke {
        #[arg(help = "Function name, e.g. admin-dashboard")]
        name: String,
        #[arg(long, help = "JSON payload")]
        data: Option<String>,
        #[arg(long, help = "Value of the action query parameter")]
        action: Option<String>,
    },

    #[command(about = "Probe edge functions with action=health")]
    Health {
        #[arg(help = "Function names (defaults to EDGE_HEALTH_FUNCTIONS)")]
        functions: Vec<String>,
    },
}

fn gateway() -> anyhow::Result<EdgeFunctions> {
    let backend = &config().backend;
    let bearer = backend
        .service_role_key
        .clone()
        .unwrap_or_else(|| backend.anon_key.clone());
    Ok(EdgeFunctions::with_bearer(backend, bearer)?)
}

pub async fn handle(cmd: EdgeCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let edge = gateway()?;

    match cmd {
        EdgeCommands::Invoke { name, data, action } => {
            let payload = data
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {}", e))?;

            let response = edge.invoke(&name, payload.as_ref(), action.as_deref()).await;
            if !response.success {
                let message = response.error.unwrap_or_else(|| "edge function failed".to_string());
                output_error(&output_format, &message, Some("EDGE_FUNCTION_FAILED"))?;
                anyhow::bail!("edge function {} failed", name);
            }

            let text = format!(
                "{}\n",
                serde_json::to_string_pretty(&response.data.clone().unwrap_or(Value::Null))?
            );
            output_report(&output_format, &response, &text)
        }
        EdgeCommands::Health { functions } => {
            let functions = if functions.is_empty() {
                config().edge.health_functions.clone()
            } else {
                functions
            };

            let report = edge.health_check(&functions).await;

            let mut text = format!(
                "Edge functions: {:?} ({}/{} up)\n",
                report.status, report.succeeded, report.checked
            );
            for result in &report.results {
                let mark = if result.success { "✓" } else { "✗" };
                text.push_str(&format!("  {} {}", mark, result.function));
                if let Some(error) = &result.error {
                    text.push_str(&format!(" ({})", error));
                }
                text.push('\n');
            }
            output_report(&output_format, &report, &text)?;

            if report.status == HealthStatus::Unhealthy {
                anyhow::bail!("edge functions are unhealthy");
            }
            Ok(())
        }
    }
}
