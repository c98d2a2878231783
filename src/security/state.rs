use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{Session, User};
use crate::config::SecurityConfig;

/// What the CLI keeps about the signed-in admin between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSessionMeta {
    pub user_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub signed_in_at: DateTime<Utc>,
}

impl AdminSessionMeta {
    pub fn from_session(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            user_id: session.user.id,
            email: session.user.email.clone(),
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at,
            signed_in_at: now,
        }
    }

    /// Rebuild a session the backend client can adopt
    pub fn to_session(&self) -> Session {
        Session {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
            user: User {
                id: self.user_id,
                email: self.email.clone(),
                user_metadata: serde_json::Value::Null,
            },
        }
    }
}

/// Locally persisted session state: the `admin_session` and
/// `last_activity` keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityState {
    #[serde(default)]
    pub admin_session: Option<AdminSessionMeta>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityViolation {
    #[error("No admin session")]
    MissingSession,
    #[error("Admin session expired")]
    Expired,
    #[error("Admin session exceeded its maximum age")]
    TooOld,
    #[error("Admin session idle for too long")]
    Idle,
}

#[derive(Debug, Clone, Copy)]
pub struct SecurityPolicy {
    pub idle_timeout: Duration,
    pub max_age: Duration,
}

impl SecurityPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            idle_timeout: Duration::seconds(config.session_idle_timeout_secs as i64),
            max_age: Duration::hours(config.session_max_age_hours as i64),
        }
    }
}

impl SecurityState {
    pub fn signed_in(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            admin_session: Some(AdminSessionMeta::from_session(session, now)),
            last_activity: Some(now),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self, policy: &SecurityPolicy) -> Result<(), SecurityViolation> {
        self.validate_at(policy, Utc::now())
    }

    /// First failing check wins: presence, expiry, age, then idleness. A
    /// missing `last_activity` counts from sign-in.
    pub fn validate_at(&self, policy: &SecurityPolicy, now: DateTime<Utc>) -> Result<(), SecurityViolation> {
        let session = self.admin_session.as_ref().ok_or(SecurityViolation::MissingSession)?;

        if session.expires_at <= now {
            return Err(SecurityViolation::Expired);
        }
        if now - session.signed_in_at > policy.max_age {
            return Err(SecurityViolation::TooOld);
        }

        let last_activity = self.last_activity.unwrap_or(session.signed_in_at);
        if now - last_activity > policy.idle_timeout {
            return Err(SecurityViolation::Idle);
        }
        Ok(())
    }
}
