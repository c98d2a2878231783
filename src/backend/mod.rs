//! Client side of the hosted data platform: table queries, user
//! authentication and the auth-state event stream.
//!
//! Everything above this layer talks to the platform through the
//! [`AuthApi`] and [`TableApi`] traits so the resolver, audits and
//! services can run against [`RestBackend`] or an in-memory double.

pub mod events;
pub mod query;
pub mod rest;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use events::{AuthEvent, AuthEventKind, AuthEvents, Subscription};
pub use query::{Filter, Query, QueryResult};
pub use rest::RestBackend;
pub use session::{Session, SessionError, User};

/// Errors from the backend client
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Backend returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl BackendError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sign-up request forwarded to the auth service; `metadata` lands in the
/// user's `user_metadata`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub metadata: Value,
}

/// A sign-up yields a session only when the platform auto-confirms accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpOutcome {
    pub user: User,
    pub session: Option<Session>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Current session, `None` when signed out or expired
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    async fn get_user(&self) -> Result<Option<User>, BackendError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn refresh_session(&self) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Stream of `SIGNED_IN | SIGNED_OUT | TOKEN_REFRESHED` transitions
    fn events(&self) -> &AuthEvents;
}

#[async_trait]
pub trait TableApi: Send + Sync {
    async fn select(&self, query: &Query) -> Result<QueryResult, BackendError>;

    /// Insert one row (object) or many (array); returns the inserted rows
    async fn insert(&self, table: &str, rows: Value) -> Result<QueryResult, BackendError>;

    /// Call a database function; `FunctionNotFound` when it does not exist
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError>;
}
