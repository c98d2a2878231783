use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::AuditError;
use crate::backend::{BackendError, Query, TableApi};
use crate::models::Property;

pub const UNASSIGNED_ORGANIZATION: &str = "unassigned";
pub const UNSPECIFIED_AUDIENCE: &str = "unspecified";
pub const UNKNOWN_STATUS: &str = "unknown";

/// Four-way split on the two visibility flags; every property lands in exactly one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    pub participant_only: u64,
    pub investor_only: u64,
    pub both: u64,
    pub neither: u64,
}

impl Visibility {
    pub fn total(&self) -> u64 {
        self.participant_only + self.investor_only + self.both + self.neither
    }

    fn record(&mut self, property: &Property) {
        match (property.participant_visible(), property.investor_visible()) {
            (true, false) => self.participant_only += 1,
            (false, true) => self.investor_only += 1,
            (true, true) => self.both += 1,
            (false, false) => self.neither += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    pub missing_organization: u64,
    pub missing_audience: u64,
    pub missing_images: u64,
    pub complete_profiles: u64,
}

/// Aggregate over the whole `properties` table. Maps are ordered so that
/// unchanged data always serializes identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub total: u64,
    pub by_organization: BTreeMap<String, u64>,
    pub by_audience: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub visibility: Visibility,
    pub quality: DataQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Critical,
    NeedsImprovement,
    Good,
}

impl QualityBand {
    pub fn from_score(score: f64) -> Self {
        if score < 50.0 {
            QualityBand::Critical
        } else if score < 80.0 {
            QualityBand::NeedsImprovement
        } else {
            QualityBand::Good
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityBand::Critical => "critical",
            QualityBand::NeedsImprovement => "needs improvement",
            QualityBand::Good => "good",
        }
    }
}

/// `count / total * 100` to one decimal place; `0.0` for an empty table
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

impl AuditResult {
    fn record(&mut self, property: &Property) {
        self.total += 1;

        let organization = property.organization().unwrap_or(UNASSIGNED_ORGANIZATION);
        *self.by_organization.entry(organization.to_string()).or_insert(0) += 1;

        let audience = property.audience().unwrap_or(UNSPECIFIED_AUDIENCE);
        *self.by_audience.entry(audience.to_string()).or_insert(0) += 1;

        let status = property.status().unwrap_or(UNKNOWN_STATUS);
        *self.by_status.entry(status.to_string()).or_insert(0) += 1;

        self.visibility.record(property);

        if property.organization().is_none() {
            self.quality.missing_organization += 1;
        }
        if property.audience().is_none() {
            self.quality.missing_audience += 1;
        }
        if property.image_count() == 0 {
            self.quality.missing_images += 1;
        }
        if property.is_complete() {
            self.quality.complete_profiles += 1;
        }
    }

    /// Complete-profile share of all properties, one decimal
    pub fn data_quality_score(&self) -> f64 {
        percentage(self.quality.complete_profiles, self.total)
    }

    /// Unrounded complete-profile share; banding uses this
    pub fn raw_quality_score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.quality.complete_profiles as f64 / self.total as f64 * 100.0
    }

    pub fn quality_band(&self) -> QualityBand {
        QualityBand::from_score(self.raw_quality_score())
    }

    pub fn share(&self, count: u64) -> f64 {
        percentage(count, self.total)
    }
}

/// Single pass over the rows; each row contributes independently
pub fn aggregate(properties: &[Property]) -> AuditResult {
    properties.iter().fold(AuditResult::default(), |mut result, property| {
        result.record(property);
        result
    })
}

/// Fetch every property in one request and aggregate. A failed fetch is fatal.
pub async fn run_property_audit(tables: &dyn TableApi) -> Result<AuditResult, AuditError> {
    let fetch_error = |source: BackendError| AuditError::Fetch {
        table: "properties".to_string(),
        source,
    };

    let rows = tables
        .select(&Query::from("properties"))
        .await
        .map_err(|e| {
            error!("Property fetch failed: {}", e);
            fetch_error(e)
        })?;

    if rows.rows.is_empty() {
        info!("No properties found; audit result is empty");
        return Ok(AuditResult::default());
    }

    let properties: Vec<Property> = rows.decode().map_err(fetch_error)?;
    let result = aggregate(&properties);

    info!(
        "Audited {} properties, data quality {:.1}% ({})",
        result.total,
        result.data_quality_score(),
        result.quality_band().label()
    );
    Ok(result)
}
