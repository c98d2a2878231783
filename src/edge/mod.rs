//! Gateway to the platform's named edge functions.
//!
//! Every call resolves to an [`EdgeResponse`] envelope; transport and
//! decoding failures are folded into `success: false` rather than surfaced
//! as `Err`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::BackendError;
use crate::config::BackendConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EdgeResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// All succeed is healthy, at least half is degraded. No functions at all
    /// counts as healthy.
    pub fn classify(succeeded: usize, checked: usize) -> Self {
        if succeeded == checked {
            HealthStatus::Healthy
        } else if succeeded * 2 >= checked {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionHealth {
    pub function: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked: usize,
    pub succeeded: usize,
    pub results: Vec<FunctionHealth>,
    pub checked_at: DateTime<Utc>,
}

/// Client for `{base}/functions/v1/{name}`, authenticated with one static
/// bearer credential
#[derive(Debug, Clone)]
pub struct EdgeFunctions {
    http: reqwest::Client,
    base: Url,
    bearer: String,
}

impl EdgeFunctions {
    /// Gateway using the anon key as bearer
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::with_bearer(config, config.anon_key.clone())
    }

    pub fn with_bearer(config: &BackendConfig, bearer: String) -> Result<Self, BackendError> {
        if config.url.is_empty() {
            return Err(BackendError::ConfigMissing("BACKEND_URL"));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Self::with_client(builder.build()?, &config.url, bearer)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, bearer: String) -> Result<Self, BackendError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        Ok(Self {
            http,
            base: Url::parse(&base)?,
            bearer,
        })
    }

    pub fn function_url(&self, name: &str, action: Option<&str>) -> Result<Url, BackendError> {
        let mut url = self.base.join(&format!("functions/v1/{}", name))?;
        if let Some(action) = action {
            url.query_pairs_mut().append_pair("action", action);
        }
        Ok(url)
    }

    /// POST when a payload is given, GET otherwise
    pub async fn invoke(&self, name: &str, payload: Option<&Value>, action: Option<&str>) -> EdgeResponse {
        match self.call(name, payload, action).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Edge function {} failed: {}", name, e);
                EdgeResponse::failed(e.to_string())
            }
        }
    }

    async fn call(&self, name: &str, payload: Option<&Value>, action: Option<&str>) -> Result<EdgeResponse, BackendError> {
        let url = self.function_url(name, action)?;
        debug!("Invoking edge function {}", url);

        let method = if payload.is_some() { Method::POST } else { Method::GET };
        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(&self.bearer)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = payload {
            builder = builder.json(body);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("");
            return Ok(EdgeResponse::failed(
                format!("Edge Function error: {} {}", status.as_u16(), reason).trim_end().to_string(),
            ));
        }

        let text = response.text().await?;
        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok(EdgeResponse::ok(data))
    }

    /// Probe each function with `action=health`, one after another
    pub async fn health_check(&self, functions: &[String]) -> HealthReport {
        let mut results = Vec::with_capacity(functions.len());

        for function in functions {
            let response = self.invoke(function, None, Some("health")).await;
            results.push(FunctionHealth {
                function: function.clone(),
                success: response.success,
                error: response.error,
            });
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let status = HealthStatus::classify(succeeded, results.len());
        info!("Edge health: {:?} ({}/{} functions up)", status, succeeded, results.len());

        HealthReport {
            status,
            checked: results.len(),
            succeeded,
            results,
            checked_at: Utc::now(),
        }
    }
}
