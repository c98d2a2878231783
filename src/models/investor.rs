use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investor {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Investor row joined with the number of jobs it is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorSummary {
    #[serde(flatten)]
    pub investor: Investor,
    pub job_count: u64,
}
