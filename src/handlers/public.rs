use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use sda_portal::edge::HealthStatus;

use crate::context::AppContext;

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "SDA Portal back-office",
            "version": version,
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/auth/login, /auth/signup (public)",
                "admin": "/api/admin/investors, /api/admin/properties (active admin)",
                "participant": "/api/participant/properties[/:id] (participant)",
            }
        }
    }))
}

/// Edge-function health; only `unhealthy` answers 503
pub async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let report = ctx.edge.health_check(&ctx.config.edge.health_functions).await;

    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        status,
        Json(json!({
            "success": status == StatusCode::OK,
            "data": report,
        })),
    )
}
