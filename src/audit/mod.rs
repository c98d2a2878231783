//! Batch data audits over the hosted tables.
//!
//! - [`property`]: one-pass aggregation of the `properties` table into an
//!   [`AuditResult`] with a data-quality score.
//! - [`table`]: row counts and a sample row for each known table, tolerant
//!   of per-table failures.
//! - [`report`]: date-stamped JSON artifacts and the text rendering the CLI prints.

pub mod property;
pub mod report;
pub mod table;

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;

pub use property::{aggregate, percentage, run_property_audit, AuditResult, DataQuality, QualityBand, Visibility};
pub use table::{run_table_audit, TableAuditEntry, TableAuditSummary};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to fetch {table}: {source}")]
    Fetch {
        table: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
