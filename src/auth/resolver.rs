use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::GuardKind;
use crate::backend::{AuthApi, BackendError, Query, TableApi};

/// Why a user was not authorized. Never surfaced as an error, only logged
/// and carried on the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoSession,
    SessionLookupFailed,
    RecordMissing,
    RecordLookupFailed,
    RoleNotAdmin,
    Inactive,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NoSession => "no_session",
            DenialReason::SessionLookupFailed => "session_lookup_failed",
            DenialReason::RecordMissing => "record_missing",
            DenialReason::RecordLookupFailed => "record_lookup_failed",
            DenialReason::RoleNotAdmin => "role_not_admin",
            DenialReason::Inactive => "inactive",
        }
    }
}

/// `{authorized, profile}`; `profile` is `None` whenever the record could not
/// be loaded, and present (but unauthorized) when it loaded and failed the check
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<R> {
    pub authorized: bool,
    pub profile: Option<R>,
    pub denial: Option<DenialReason>,
}

impl<R> Resolution<R> {
    fn denied(reason: DenialReason) -> Self {
        Self {
            authorized: false,
            profile: None,
            denial: Some(reason),
        }
    }

    fn rejected(record: R, reason: DenialReason) -> Self {
        Self {
            authorized: false,
            profile: Some(record),
            denial: Some(reason),
        }
    }

    fn granted(record: R) -> Self {
        Self {
            authorized: true,
            profile: Some(record),
            denial: None,
        }
    }
}

#[derive(Clone)]
pub struct AuthResolver {
    auth: Arc<dyn AuthApi>,
    tables: Arc<dyn TableApi>,
}

impl AuthResolver {
    pub fn new(auth: Arc<dyn AuthApi>, tables: Arc<dyn TableApi>) -> Self {
        Self { auth, tables }
    }

    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AuthApi + TableApi + 'static,
    {
        Self {
            auth: backend.clone(),
            tables: backend,
        }
    }

    /// Session check then record lookup. Every failure collapses to "not
    /// authorized"; the cause goes to the log.
    pub async fn resolve<K: GuardKind>(&self) -> Resolution<K::Record> {
        let session = match self.auth.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return deny::<K, _>(DenialReason::NoSession, None, None),
            Err(e) => return deny::<K, _>(DenialReason::SessionLookupFailed, None, Some(&e)),
        };

        let user_id = session.user_id();
        let query = Query::from(K::TABLE).eq(K::KEY_COLUMN, user_id).limit(1);

        let record = match self.tables.select(&query).await.and_then(|r| r.first::<K::Record>()) {
            Ok(Some(record)) => record,
            Ok(None) => return deny::<K, _>(DenialReason::RecordMissing, Some(user_id), None),
            Err(e) => return deny::<K, _>(DenialReason::RecordLookupFailed, Some(user_id), Some(&e)),
        };

        match K::authorize(&record) {
            Ok(()) => {
                debug!(guard = K::NAME, %user_id, "authorized");
                Resolution::granted(record)
            }
            Err(reason) => {
                warn!(guard = K::NAME, %user_id, reason = reason.as_str(), "access denied");
                Resolution::rejected(record, reason)
            }
        }
    }
}

fn deny<K: GuardKind, R>(
    reason: DenialReason,
    user_id: Option<Uuid>,
    cause: Option<&BackendError>,
) -> Resolution<R> {
    match (cause, user_id) {
        (Some(e), Some(user_id)) => {
            warn!(guard = K::NAME, %user_id, reason = reason.as_str(), error = %e, "access denied")
        }
        (Some(e), None) => warn!(guard = K::NAME, reason = reason.as_str(), error = %e, "access denied"),
        (None, Some(user_id)) => debug!(guard = K::NAME, %user_id, reason = reason.as_str(), "access denied"),
        (None, None) => debug!(guard = K::NAME, reason = reason.as_str(), "access denied"),
    }
    Resolution::denied(reason)
}
