use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{Query, TableApi};

pub const SAMPLE_MAX_LINES: usize = 10;

/// One table's audit outcome. `error` is present only when a query failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAuditEntry {
    pub table: String,
    pub count: u64,
    pub sample: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAuditSummary {
    pub entries: Vec<TableAuditEntry>,
    pub total_records: u64,
}

impl TableAuditSummary {
    /// Up to `n` tables with the highest counts, ties broken by table order
    pub fn top_tables(&self, n: usize) -> Vec<&TableAuditEntry> {
        let mut ranked: Vec<&TableAuditEntry> = self.entries.iter().filter(|e| e.count > 0).collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(n);
        ranked
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableAuditEntry> {
        self.entries.iter().filter(|e| e.error.is_some())
    }
}

/// Count and sample each table in turn. A failing table is recorded and the
/// scan moves on.
pub async fn run_table_audit(tables: &dyn TableApi, names: &[String]) -> TableAuditSummary {
    let mut entries = Vec::with_capacity(names.len());

    for name in names {
        let entry = audit_table(tables, name).await;
        match &entry.error {
            Some(error) => warn!("Table {} audit failed: {}", name, error),
            None => info!("Table {}: {} records", name, entry.count),
        }
        entries.push(entry);
    }

    let total_records = entries.iter().map(|e| e.count).sum();
    TableAuditSummary { entries, total_records }
}

async fn audit_table(tables: &dyn TableApi, name: &str) -> TableAuditEntry {
    let count = match tables.select(&Query::from(name).count_only()).await {
        Ok(result) => result.count.unwrap_or(0),
        Err(e) => {
            return TableAuditEntry {
                table: name.to_string(),
                count: 0,
                sample: None,
                error: Some(e.to_string()),
            }
        }
    };

    let (sample, error) = match tables.select(&Query::from(name).limit(1)).await {
        Ok(result) => (result.rows.into_iter().next(), None),
        Err(e) => (None, Some(e.to_string())),
    };

    TableAuditEntry {
        table: name.to_string(),
        count,
        sample,
        error,
    }
}

/// Pretty JSON cut to at most `max_lines` lines; a cut ends with a `...` line
pub fn truncate_sample(sample: &Value, max_lines: usize) -> String {
    let pretty = serde_json::to_string_pretty(sample).unwrap_or_else(|_| sample.to_string());
    let lines: Vec<&str> = pretty.lines().collect();
    if lines.len() <= max_lines {
        return pretty;
    }

    let mut kept = lines[..max_lines.saturating_sub(1)].join("\n");
    kept.push_str("\n...");
    kept
}
