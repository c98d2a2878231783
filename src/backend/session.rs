use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    #[error("Access token expired")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Session issued by the platform's auth service. Observed, never minted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Token endpoint response (`/auth/v1/token`, auto-confirmed `/auth/v1/signup`)
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl TokenResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| self.expires_in.map(|secs| now + chrono::Duration::seconds(secs)))
            .unwrap_or_else(|| {
                read_claims_unverified(&self.access_token)
                    .ok()
                    .and_then(|c| Utc.timestamp_opt(c.exp, 0).single())
                    .unwrap_or(now)
            });

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Claims carried by platform access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Verify an HS256 access token against the project's JWT secret
pub fn verify_access_token(token: &str, secret: &str) -> Result<AccessClaims, SessionError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Platform tokens carry `aud: authenticated`; audience is not part of the check
    validation.validate_aud = false;

    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::InvalidToken(e.to_string()),
        })
}

/// Read claims without checking the signature. Only for tokens the auth
/// service has already vouched for.
pub(crate) fn read_claims_unverified(token: &str) -> Result<AccessClaims, SessionError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.validate_exp = false;

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| SessionError::InvalidToken(e.to_string()))
}

impl Session {
    pub fn from_claims(access_token: String, claims: AccessClaims) -> Result<Self, SessionError> {
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| SessionError::InvalidToken("exp out of range".to_string()))?;

        Ok(Self {
            access_token,
            refresh_token: None,
            expires_at,
            user: User {
                id: claims.sub,
                email: claims.email,
                user_metadata: claims.user_metadata,
            },
        })
    }
}
