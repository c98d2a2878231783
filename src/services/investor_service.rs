use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{BackendError, Query, TableApi};
use crate::models::{Investor, InvestorSummary};

pub const INVESTORS_TABLE: &str = "investors";
pub const JOB_INVESTORS_TABLE: &str = "job_investors";

pub struct InvestorService {
    tables: Arc<dyn TableApi>,
}

impl InvestorService {
    pub fn new(tables: Arc<dyn TableApi>) -> Self {
        Self { tables }
    }

    pub async fn list(&self) -> Result<Vec<Investor>, BackendError> {
        let result = self
            .tables
            .select(&Query::from(INVESTORS_TABLE).order("created_at", false))
            .await?;
        result.decode()
    }

    /// Every investor with the number of jobs it is linked to. Counts are
    /// fetched together and joined back by investor id; a failed count
    /// reads as zero.
    pub async fn list_with_job_counts(&self) -> Result<Vec<InvestorSummary>, BackendError> {
        let investors = self.list().await?;

        let counts = join_all(investors.iter().map(|investor| self.job_count(investor.id))).await;
        let counts: HashMap<Uuid, u64> = counts.into_iter().collect();

        debug!("Fetched job counts for {} investors", counts.len());
        Ok(investors
            .into_iter()
            .map(|investor| {
                let job_count = counts.get(&investor.id).copied().unwrap_or(0);
                InvestorSummary { investor, job_count }
            })
            .collect())
    }

    async fn job_count(&self, investor_id: Uuid) -> (Uuid, u64) {
        let query = Query::from(JOB_INVESTORS_TABLE)
            .eq("investor_id", investor_id)
            .count_only();

        match self.tables.select(&query).await {
            Ok(result) => (investor_id, result.count.unwrap_or(0)),
            Err(e) => {
                warn!("Job count for investor {} failed: {}", investor_id, e);
                (investor_id, 0)
            }
        }
    }
}
