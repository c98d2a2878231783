use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, Query, TableApi};
use crate::models::Property;

pub const PROPERTIES_TABLE: &str = "properties";
pub const DEFAULT_PER_PAGE: u64 = 20;
pub const MAX_PER_PAGE: u64 = 100;

/// 1-based page request, `?page=&per_page=`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageRequest {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    /// Inclusive row range; `None` when the page lies past `u64` rows
    pub fn bounds(&self) -> Option<(u64, u64)> {
        let from = (self.page() - 1).checked_mul(self.per_page())?;
        let to = from.checked_add(self.per_page() - 1)?;
        Some((from, to))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

pub struct PropertyService {
    tables: Arc<dyn TableApi>,
}

impl PropertyService {
    pub fn new(tables: Arc<dyn TableApi>) -> Self {
        Self { tables }
    }

    /// Admin listing, newest first, with the exact total
    pub async fn list_page(&self, request: PageRequest) -> Result<Page<Property>, BackendError> {
        let Some((from, to)) = request.bounds() else {
            let total = self
                .tables
                .select(&Query::from(PROPERTIES_TABLE).count_only())
                .await?
                .count
                .unwrap_or(0);
            return Ok(Page {
                items: Vec::new(),
                page: request.page(),
                per_page: request.per_page(),
                total,
            });
        };
        let query = Query::from(PROPERTIES_TABLE)
            .order("created_at", false)
            .range(from, to)
            .with_count();

        let result = self.tables.select(&query).await?;
        let total = result.count.unwrap_or(result.rows.len() as u64);
        let items: Vec<Property> = result.decode()?;
        debug!("Property page {} holds {} of {}", request.page(), items.len(), total);

        Ok(Page {
            items,
            page: request.page(),
            per_page: request.per_page(),
            total,
        })
    }

    pub async fn list_for_participants(&self) -> Result<Vec<Property>, BackendError> {
        let query = Query::from(PROPERTIES_TABLE)
            .eq("visible_to_participants", true)
            .order("created_at", false);
        self.tables.select(&query).await?.decode()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Property>, BackendError> {
        let query = Query::from(PROPERTIES_TABLE).eq("id", id).limit(1);
        self.tables.select(&query).await?.first()
    }

    /// A property a participant may open; hidden ones read as absent
    pub async fn get_for_participant(&self, id: Uuid) -> Result<Option<Property>, BackendError> {
        Ok(self.get(id).await?.filter(Property::participant_visible))
    }
}
