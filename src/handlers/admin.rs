use axum::extract::{Extension, Query};

use sda_portal::models::{InvestorSummary, Property};
use sda_portal::services::{InvestorService, Page, PageRequest, PropertyService};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, RequestBackend};

/// GET /api/admin/investors
pub async fn investors(Extension(RequestBackend(backend)): Extension<RequestBackend>) -> ApiResult<Vec<InvestorSummary>> {
    let investors = InvestorService::new(backend).list_with_job_counts().await?;
    Ok(ApiResponse::success(investors))
}

/// GET /api/admin/properties?page=&per_page=
pub async fn properties(
    Extension(RequestBackend(backend)): Extension<RequestBackend>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Page<Property>> {
    if page.bounds().is_none() {
        return Err(ApiError::bad_request("page is out of range"));
    }
    let page = PropertyService::new(backend).list_page(page).await?;
    Ok(ApiResponse::success(page))
}
