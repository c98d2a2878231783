use std::path::PathBuf;

use clap::Subcommand;
use serde_json::json;

use crate::audit::report::{
    render_property_audit, render_table_audit, today, write_report, PropertyAuditReport, PROPERTY_REPORT_PREFIX,
    TABLE_REPORT_PREFIX,
};
use crate::audit::{run_property_audit, run_table_audit};
use crate::backend::RestBackend;
use crate::cli::utils::{output_report, output_success};
use crate::cli::OutputFormat;
use crate::config::{config, split_list};

#[derive(Subcommand)]
pub enum AuditCommands {
    #[command(about = "Aggregate the properties table and score its data quality")]
    Properties {
        #[arg(long, help = "Directory for the report file (defaults to AUDIT_OUTPUT_DIR)")]
        output_dir: Option<PathBuf>,
    },

    #[command(about = "Count and sample every known table")]
    Tables {
        #[arg(long, help = "Comma-separated table names (defaults to AUDIT_TABLES)")]
        tables: Option<String>,
        #[arg(long, help = "Directory for the report file (defaults to AUDIT_OUTPUT_DIR)")]
        output_dir: Option<PathBuf>,
    },
}

pub async fn handle(cmd: AuditCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    let backend = RestBackend::with_service_role(&config.backend)?;

    match cmd {
        AuditCommands::Properties { output_dir } => {
            let dir = output_dir.unwrap_or_else(|| config.audit.output_dir.clone());
            let result = run_property_audit(&backend).await?;

            let date = today();
            let report = PropertyAuditReport::new(&result, date);
            let path = write_report(&dir, PROPERTY_REPORT_PREFIX, date, &report)?;

            output_report(&output_format, &report, &render_property_audit(&result))?;
            output_success(
                &output_format,
                &format!("Property audit written to {}", path.display()),
                Some(json!({ "path": path })),
            )
        }
        AuditCommands::Tables { tables, output_dir } => {
            let dir = output_dir.unwrap_or_else(|| config.audit.output_dir.clone());
            let names = match tables {
                Some(list) => split_list(&list),
                None => config.audit.tables.clone(),
            };

            let summary = run_table_audit(&backend, &names).await;
            let path = write_report(&dir, TABLE_REPORT_PREFIX, today(), &summary.entries)?;

            output_report(&output_format, &summary, &render_table_audit(&summary))?;
            output_success(
                &output_format,
                &format!(
                    "Audited {} tables ({} failed), results written to {}",
                    summary.entries.len(),
                    summary.failed().count(),
                    path.display()
                ),
                Some(json!({ "path": path, "total_records": summary.total_records })),
            )
        }
    }
}
