use axum::extract::{Extension, Path};
use tracing::warn;
use uuid::Uuid;

use sda_portal::models::{Participant, Property};
use sda_portal::security::log_property_access;
use sda_portal::services::PropertyService;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Authorized, RequestBackend};

/// GET /api/participant/properties
pub async fn properties(Extension(RequestBackend(backend)): Extension<RequestBackend>) -> ApiResult<Vec<Property>> {
    let properties = PropertyService::new(backend).list_for_participants().await?;
    Ok(ApiResponse::success(properties))
}

/// GET /api/participant/properties/:id - records the view
pub async fn property_show(
    Extension(RequestBackend(backend)): Extension<RequestBackend>,
    Extension(Authorized(participant)): Extension<Authorized<Participant>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Property> {
    let property = PropertyService::new(backend.clone())
        .get_for_participant(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Property {} not found", id)))?;

    if let Err(e) = log_property_access(backend.as_ref(), participant.user_id, id, "view").await {
        warn!("Property access log for {} failed: {}", id, e);
    }

    Ok(ApiResponse::success(property))
}
