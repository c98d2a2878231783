use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use sda_portal::backend::{AuthApi, BackendError};
use sda_portal::security::{device_fingerprint, record_security_event, DeviceTraits, SecurityEvent, Severity};
use sda_portal::services::{AccountType, SignupForm, SignupService};

use crate::context::AppContext;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(flatten)]
    pub form: SignupForm,
    pub account_type: AccountType,
}

fn client_event(event: SecurityEvent, headers: &HeaderMap) -> SecurityEvent {
    let traits = DeviceTraits::from_headers(headers);
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = Some(traits.user_agent.clone()).filter(|ua| !ua.is_empty());
    event.client(ip, user_agent, Some(device_fingerprint(&traits)))
}

/// POST /auth/login - password sign-in, rate limited per email
pub async fn login(State(ctx): State<AppContext>, headers: HeaderMap, Json(body): Json<LoginRequest>) -> ApiResult<Value> {
    let email = body.email.trim().to_lowercase();
    let key = format!("login:{}", email);

    if !ctx.rate_limiter.check(&key) {
        let event = SecurityEvent::new("login_rate_limited", Severity::High).details(json!({ "email": email }));
        record_security_event(ctx.backend.as_ref(), client_event(event, &headers)).await;
        return Err(ApiError::too_many_requests("Too many login attempts, try again later"));
    }

    let backend = ctx.backend.fork(None);
    match backend.sign_in_with_password(&email, &body.password).await {
        Ok(session) => {
            ctx.rate_limiter.reset(&key);
            let event = SecurityEvent::new("login_success", Severity::Low).user(session.user_id());
            record_security_event(&backend, client_event(event, &headers)).await;

            Ok(ApiResponse::success(json!({
                "access_token": session.access_token,
                "refresh_token": session.refresh_token,
                "expires_at": session.expires_at,
                "user": session.user,
            })))
        }
        Err(BackendError::Status { status: 400 | 401, .. }) => {
            let event = SecurityEvent::new("login_failed", Severity::Medium).details(json!({ "email": email }));
            record_security_event(ctx.backend.as_ref(), client_event(event, &headers)).await;
            Err(ApiError::unauthorized("Invalid login credentials"))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /auth/signup - participant or investor account
pub async fn signup(State(ctx): State<AppContext>, Json(body): Json<SignupRequest>) -> ApiResult<Value> {
    let backend = Arc::new(ctx.backend.fork(None));
    let outcome = SignupService::from_backend(backend)
        .register(&body.form, body.account_type)
        .await?;

    Ok(ApiResponse::created(json!({
        "user_id": outcome.user.id,
        "account_type": body.account_type,
        "confirmation_required": outcome.session.is_none(),
    })))
}
