use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use sda_portal::auth::{AuthResolver, GuardKind};
use sda_portal::backend::RestBackend;

use crate::context::AppContext;

/// Backend client acting as the caller, for handlers behind a guard
#[derive(Clone)]
pub struct RequestBackend(pub Arc<RestBackend>);

/// The record that let the caller through
#[derive(Clone, Debug)]
pub struct Authorized<R>(pub R);

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolve the caller against guard `K`. Unauthorized callers are sent to
/// the kind's login path; authorized ones reach the handler with their
/// record and a per-request backend in the extensions.
pub async fn require_guard<K: GuardKind>(State(ctx): State<AppContext>, mut request: Request, next: Next) -> Response {
    let backend = Arc::new(ctx.backend.fork(bearer_token(request.headers())));
    let resolution = AuthResolver::from_backend(backend.clone()).resolve::<K>().await;

    let record = match resolution.profile {
        Some(record) if resolution.authorized => record,
        _ => return Redirect::to(K::LOGIN_PATH).into_response(),
    };

    request.extensions_mut().insert(Authorized(record));
    request.extensions_mut().insert(RequestBackend(backend));
    next.run(request).await
}
