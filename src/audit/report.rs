use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use super::property::{AuditResult, QualityBand};
use super::table::{truncate_sample, TableAuditSummary, SAMPLE_MAX_LINES};
use super::AuditError;

pub const PROPERTY_REPORT_PREFIX: &str = "property-audit";
pub const TABLE_REPORT_PREFIX: &str = "audit-results";

/// Persisted form of the property audit
#[derive(Debug, Clone, Serialize)]
pub struct PropertyAuditReport<'a> {
    pub generated_on: NaiveDate,
    pub data_quality_score: f64,
    pub quality_band: QualityBand,
    #[serde(flatten)]
    pub result: &'a AuditResult,
}

impl<'a> PropertyAuditReport<'a> {
    pub fn new(result: &'a AuditResult, generated_on: NaiveDate) -> Self {
        Self {
            generated_on,
            data_quality_score: result.data_quality_score(),
            quality_band: result.quality_band(),
            result,
        }
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `{prefix}-YYYY-MM-DD.json`
pub fn report_filename(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.json", prefix, date.format("%Y-%m-%d"))
}

/// Write `value` as pretty JSON to `dir/{prefix}-{date}.json`, replacing any
/// report from earlier the same day
pub fn write_report<T: Serialize>(dir: &Path, prefix: &str, date: NaiveDate, value: &T) -> Result<PathBuf, AuditError> {
    let path = dir.join(report_filename(prefix, date));
    let content = serde_json::to_string_pretty(value)?;

    fs::write(&path, content).map_err(|source| AuditError::Write {
        path: path.clone(),
        source,
    })?;

    info!("Wrote audit report {}", path.display());
    Ok(path)
}

fn write_breakdown(out: &mut String, title: &str, counts: &BTreeMap<String, u64>, result: &AuditResult) {
    let _ = writeln!(out, "\n{}", title);
    let mut rows: Vec<(&String, &u64)> = counts.iter().collect();
    // Largest groups first; BTreeMap order breaks ties
    rows.sort_by(|a, b| b.1.cmp(a.1));
    for (key, count) in rows {
        let _ = writeln!(out, "  {:<36} {:>6} ({:.1}%)", key, count, result.share(*count));
    }
}

pub fn render_property_audit(result: &AuditResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PROPERTY AUDIT");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "Total properties: {}", result.total);

    if result.total == 0 {
        let _ = writeln!(out, "No properties found.");
        return out;
    }

    write_breakdown(&mut out, "By organization", &result.by_organization, result);
    write_breakdown(&mut out, "By audience", &result.by_audience, result);
    write_breakdown(&mut out, "By status", &result.by_status, result);

    let v = &result.visibility;
    let _ = writeln!(out, "\nVisibility");
    for (label, count) in [
        ("participant only", v.participant_only),
        ("investor only", v.investor_only),
        ("both", v.both),
        ("neither", v.neither),
    ] {
        let _ = writeln!(out, "  {:<36} {:>6} ({:.1}%)", label, count, result.share(count));
    }

    let q = &result.quality;
    let _ = writeln!(out, "\nData quality");
    let _ = writeln!(out, "  missing organization: {}", q.missing_organization);
    let _ = writeln!(out, "  missing audience:     {}", q.missing_audience);
    let _ = writeln!(out, "  missing images:       {}", q.missing_images);
    let _ = writeln!(out, "  complete profiles:    {}", q.complete_profiles);
    let _ = writeln!(
        out,
        "  score: {:.1}% ({})",
        result.data_quality_score(),
        result.quality_band().label()
    );

    out
}

pub fn render_table_audit(summary: &TableAuditSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TABLE AUDIT");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "{:<32} {:>10}  {}", "TABLE", "RECORDS", "STATUS");

    for entry in &summary.entries {
        let status = match &entry.error {
            Some(error) => format!("error: {}", error),
            None => "ok".to_string(),
        };
        let _ = writeln!(out, "{:<32} {:>10}  {}", entry.table, entry.count, status);
    }
    let _ = writeln!(out, "{}", "-".repeat(60));
    let _ = writeln!(out, "{:<32} {:>10}", "TOTAL", summary.total_records);

    for entry in summary.top_tables(3) {
        if let Some(sample) = &entry.sample {
            let _ = writeln!(out, "\nSample from {} ({} records):", entry.table, entry.count);
            let _ = writeln!(out, "{}", truncate_sample(sample, SAMPLE_MAX_LINES));
        }
    }

    out
}
