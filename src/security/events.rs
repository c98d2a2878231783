use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{BackendError, TableApi};

pub const SECURITY_EVENT_FUNCTION: &str = "log_security_event";
pub const SECURITY_EVENTS_TABLE: &str = "security_events_enhanced";
pub const PROPERTY_ACCESS_TABLE: &str = "property_access_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: String,
    pub severity: Severity,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
}

impl SecurityEvent {
    pub fn new(event_type: impl Into<String>, severity: Severity) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            user_id: None,
            details: json!({}),
            ip_address: None,
            user_agent: None,
            device_fingerprint: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>, fingerprint: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self.device_fingerprint = fingerprint;
        self
    }

    fn rpc_args(&self) -> Value {
        json!({
            "p_event_type": self.event_type,
            "p_severity": self.severity,
            "p_user_id": self.user_id,
            "p_details": self.details,
            "p_ip_address": self.ip_address,
            "p_user_agent": self.user_agent,
            "p_device_fingerprint": self.device_fingerprint,
        })
    }
}

/// Record through the `log_security_event` function. Only a missing function
/// falls back to a direct insert; any other failure is returned.
pub async fn log_security_event(tables: &dyn TableApi, event: &SecurityEvent) -> Result<(), BackendError> {
    match tables.rpc(SECURITY_EVENT_FUNCTION, event.rpc_args()).await {
        Ok(_) => {
            debug!("Security event {} logged", event.event_type);
            Ok(())
        }
        Err(BackendError::FunctionNotFound(_)) => {
            warn!(
                "{} is not deployed, inserting {} into {} directly",
                SECURITY_EVENT_FUNCTION, event.event_type, SECURITY_EVENTS_TABLE
            );
            let mut row = serde_json::to_value(event)?;
            row["created_at"] = json!(Utc::now());
            tables.insert(SECURITY_EVENTS_TABLE, row).await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Log and move on; callers never fail because the audit trail did
pub async fn record_security_event(tables: &dyn TableApi, event: SecurityEvent) {
    if let Err(e) = log_security_event(tables, &event).await {
        warn!("Could not record security event {}: {}", event.event_type, e);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAccess {
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub action: String,
    pub accessed_at: DateTime<Utc>,
}

pub async fn log_property_access(
    tables: &dyn TableApi,
    user_id: Uuid,
    property_id: Uuid,
    action: &str,
) -> Result<(), BackendError> {
    let access = PropertyAccess {
        user_id,
        property_id,
        action: action.to_string(),
        accessed_at: Utc::now(),
    };
    tables.insert(PROPERTY_ACCESS_TABLE, serde_json::to_value(&access)?).await?;
    debug!("Property {} {} by {}", property_id, action, user_id);
    Ok(())
}
