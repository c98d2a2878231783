use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::query::parse_content_range;
use super::session::{read_claims_unverified, verify_access_token, TokenResponse};
use super::{
    AuthApi, AuthEvent, AuthEvents, BackendError, Query, QueryResult, Session, SignUpOutcome, SignUpRequest,
    TableApi, User,
};
use crate::config::BackendConfig;

/// Error body shape returned by the table and auth services
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default, alias = "msg", alias = "error_description")]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the hosted platform's REST, auth and RPC endpoints
pub struct RestBackend {
    http: reqwest::Client,
    base: Url,
    api_key: String,
    jwt_secret: Option<String>,
    /// Bearer token handed in by a caller, verified lazily on first use
    pending_token: Option<String>,
    session: RwLock<Option<Session>>,
    events: AuthEvents,
}

impl RestBackend {
    /// Client authenticated with the public anon key
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::with_key(config, config.anon_key.clone())
    }

    /// Client authenticated with the service-role key, for batch scripts
    pub fn with_service_role(config: &BackendConfig) -> Result<Self, BackendError> {
        let key = config
            .service_role_key
            .clone()
            .ok_or(BackendError::ConfigMissing("BACKEND_SERVICE_ROLE_KEY"))?;
        Self::with_key(config, key)
    }

    fn with_key(config: &BackendConfig, api_key: String) -> Result<Self, BackendError> {
        if config.url.is_empty() {
            return Err(BackendError::ConfigMissing("BACKEND_URL"));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            base: base_url(&config.url)?,
            api_key,
            jwt_secret: config.jwt_secret.clone(),
            pending_token: None,
            session: RwLock::new(None),
            events: AuthEvents::new(),
        })
    }

    /// Independent client sharing the connection pool, optionally acting
    /// on behalf of the holder of `access_token`
    pub fn fork(&self, access_token: Option<String>) -> Self {
        Self {
            http: self.http.clone(),
            base: self.base.clone(),
            api_key: self.api_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            pending_token: access_token,
            session: RwLock::new(None),
            events: AuthEvents::new(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Adopt a previously persisted session without emitting an event
    pub async fn restore_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    async fn bearer(&self) -> String {
        if let Some(session) = self.session.read().await.as_ref() {
            return session.access_token.clone();
        }
        self.pending_token.clone().unwrap_or_else(|| self.api_key.clone())
    }

    async fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self.bearer().await;
        builder.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    async fn store_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Turn a pending bearer token into a session, either by verifying it
    /// locally or by asking the auth service who it belongs to
    async fn session_from_token(&self, token: &str) -> Result<Option<Session>, BackendError> {
        let session = match &self.jwt_secret {
            Some(secret) => Session::from_claims(token.to_string(), verify_access_token(token, secret)?)?,
            None => {
                let Some(user) = self.fetch_user(token).await? else {
                    return Ok(None);
                };
                // The auth service just vouched for the token, so its exp can be read as-is
                let claims = read_claims_unverified(token)?;
                let mut session = Session::from_claims(token.to_string(), claims)?;
                session.user = user;
                session
            }
        };

        if session.is_expired() {
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn fetch_user(&self, token: &str) -> Result<Option<User>, BackendError> {
        let response = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        Ok(Some(response.json::<User>().await?))
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let tokens: TokenResponse = ensure_success(response).await?.json().await?;
        Ok(tokens.into_session(Utc::now()))
    }
}

#[async_trait]
impl AuthApi for RestBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(session) = self.session.read().await.clone() {
            if session.is_expired() {
                debug!("Stored session for {} has expired", session.user_id());
                return Ok(None);
            }
            return Ok(Some(session));
        }

        let Some(token) = self.pending_token.as_deref() else {
            return Ok(None);
        };

        let session = self.session_from_token(token).await?;
        if let Some(session) = &session {
            self.store_session(session.clone()).await;
        }
        Ok(session)
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        match self.get_session().await? {
            Some(session) => self.fetch_user(&session.access_token).await,
            None => Ok(None),
        }
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, BackendError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/signup")?)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "email": request.email,
                "password": request.password,
                "data": request.metadata,
            }))
            .send()
            .await?;

        let body: Value = ensure_success(response).await?.json().await?;

        // Auto-confirmed projects answer with a full token response,
        // otherwise with the bare (unconfirmed) user
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(body)?.into_session(Utc::now());
            self.store_session(session.clone()).await;
            self.events.publish(AuthEvent::signed_in(session.clone()));
            info!("Signed up and signed in {}", session.user_id());
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: User = serde_json::from_value(user_value)?;
        info!("Signed up {} (confirmation pending)", user.id);
        Ok(SignUpOutcome { user, session: None })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;

        self.store_session(session.clone()).await;
        self.events.publish(AuthEvent::signed_in(session.clone()));
        info!("Signed in {}", session.user_id());
        Ok(session)
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or(BackendError::NotAuthenticated)?;

        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;

        self.store_session(session.clone()).await;
        self.events.publish(AuthEvent::token_refreshed(session.clone()));
        debug!("Refreshed session for {}", session.user_id());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.write().await.take();

        // Local state is cleared regardless of what the server says
        self.events.publish(AuthEvent::signed_out());

        let Some(session) = previous else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if let Err(e) = ensure_success(response).await {
            warn!("Remote sign-out for {} failed: {}", session.user_id(), e);
            return Err(e);
        }
        info!("Signed out {}", session.user_id());
        Ok(())
    }

    fn events(&self) -> &AuthEvents {
        &self.events
    }
}

#[async_trait]
impl TableApi for RestBackend {
    async fn select(&self, query: &Query) -> Result<QueryResult, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{}", query.table))?;
        let method = if query.head { Method::HEAD } else { Method::GET };

        let mut builder = self.http.request(method, url).query(&query.to_params());
        if query.count {
            builder = builder.header("Prefer", "count=exact");
        }

        let response = self.authorized(builder).await.send().await?;
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let response = ensure_success(response).await?;
        let rows = if query.head {
            Vec::new()
        } else {
            response.json::<Vec<Value>>().await?
        };

        debug!("select {} -> {} rows (count {:?})", query.table, rows.len(), count);
        Ok(QueryResult { rows, count })
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<QueryResult, BackendError> {
        let builder = self
            .http
            .post(self.endpoint(&format!("rest/v1/{}", table))?)
            .header("Prefer", "return=representation")
            .json(&rows);

        let response = ensure_success(self.authorized(builder).await.send().await?).await?;
        let text = response.text().await?;
        let rows = if text.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Value>(&text)? {
                Value::Array(rows) => rows,
                Value::Null => Vec::new(),
                row => vec![row],
            }
        };

        debug!("insert {} -> {} rows", table, rows.len());
        Ok(QueryResult::new(rows))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
        let builder = self
            .http
            .post(self.endpoint(&format!("rest/v1/rpc/{}", function))?)
            .json(&args);

        let response = self.authorized(builder).await.send().await?;
        let text = match ensure_success(response).await {
            Ok(response) => response.text().await?,
            Err(BackendError::Status { status, code, .. })
                if status == 404 || code.as_deref() == Some("PGRST202") =>
            {
                return Err(BackendError::FunctionNotFound(function.to_string()));
            }
            Err(e) => return Err(e),
        };

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Normalise the configured address so `Url::join` appends rather than replaces
fn base_url(raw: &str) -> Result<Url, BackendError> {
    Ok(Url::parse(&format!("{}/", raw.trim_end_matches('/')))?)
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let code = body.code.map(|c| match c {
        Value::String(s) => s,
        other => other.to_string(),
    });
    let message = body
        .message
        .or(body.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    Err(BackendError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}
