use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub audit: AuditConfig,
    pub edge: EdgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base address of the hosted platform, without a trailing slash
    pub url: String,
    /// Public (anon) key, sent as `apikey` and as the static edge-function bearer
    pub anon_key: String,
    /// Privileged key for batch scripts; never exposed to the server routes
    pub service_role_key: Option<String>,
    /// When set, access tokens are verified locally instead of via `/auth/v1/user`
    pub jwt_secret: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub rate_limit_max_attempts: usize,
    pub rate_limit_window_secs: u64,
    pub session_idle_timeout_secs: u64,
    pub session_max_age_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub output_dir: PathBuf,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub health_functions: Vec<String>,
}

pub const DEFAULT_AUDIT_TABLES: &[&str] = &[
    "properties",
    "participants",
    "investors",
    "jobs",
    "job_investors",
    "profiles",
    "organizations",
    "property_access_logs",
    "security_events_enhanced",
];

pub const DEFAULT_HEALTH_FUNCTIONS: &[&str] = &[
    "admin-dashboard",
    "property-management",
    "investor-management",
    "security-monitor",
];

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Backend overrides
        if let Ok(v) = env::var("BACKEND_URL") {
            self.backend.url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("BACKEND_ANON_KEY") {
            self.backend.anon_key = v;
        }
        if let Ok(v) = env::var("BACKEND_SERVICE_ROLE_KEY") {
            self.backend.service_role_key = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("BACKEND_JWT_SECRET") {
            self.backend.jwt_secret = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("BACKEND_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = v.parse().ok();
        }

        // Server overrides
        if let Some(port) = env::var("SDA_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_RATE_LIMIT_MAX_ATTEMPTS") {
            self.security.rate_limit_max_attempts = v.parse().unwrap_or(self.security.rate_limit_max_attempts);
        }
        if let Ok(v) = env::var("SECURITY_RATE_LIMIT_WINDOW_SECS") {
            self.security.rate_limit_window_secs = v.parse().unwrap_or(self.security.rate_limit_window_secs);
        }
        if let Ok(v) = env::var("SECURITY_SESSION_IDLE_TIMEOUT_SECS") {
            self.security.session_idle_timeout_secs = v.parse().unwrap_or(self.security.session_idle_timeout_secs);
        }
        if let Ok(v) = env::var("SECURITY_SESSION_MAX_AGE_HOURS") {
            self.security.session_max_age_hours = v.parse().unwrap_or(self.security.session_max_age_hours);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_OUTPUT_DIR") {
            self.audit.output_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("AUDIT_TABLES") {
            self.audit.tables = split_list(&v);
        }

        // Edge function overrides
        if let Ok(v) = env::var("EDGE_HEALTH_FUNCTIONS") {
            self.edge.health_functions = split_list(&v);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            backend: BackendConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                service_role_key: None,
                jwt_secret: None,
                request_timeout_secs: None,
            },
            server: ServerConfig { port: 3000 },
            security: SecurityConfig {
                rate_limit_max_attempts: 20,
                rate_limit_window_secs: 60,
                session_idle_timeout_secs: 8 * 60 * 60,
                session_max_age_hours: 24 * 7,
            },
            audit: AuditConfig::default(),
            edge: EdgeConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            backend: BackendConfig {
                url: String::new(),
                anon_key: String::new(),
                service_role_key: None,
                jwt_secret: None,
                request_timeout_secs: Some(30),
            },
            server: ServerConfig { port: 3000 },
            security: SecurityConfig {
                rate_limit_max_attempts: 10,
                rate_limit_window_secs: 300,
                session_idle_timeout_secs: 60 * 60,
                session_max_age_hours: 24,
            },
            audit: AuditConfig::default(),
            edge: EdgeConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            backend: BackendConfig {
                url: String::new(),
                anon_key: String::new(),
                service_role_key: None,
                jwt_secret: None,
                request_timeout_secs: Some(15),
            },
            server: ServerConfig { port: 8080 },
            security: SecurityConfig {
                rate_limit_max_attempts: 5,
                rate_limit_window_secs: 900,
                session_idle_timeout_secs: 30 * 60,
                session_max_age_hours: 8,
            },
            audit: AuditConfig::default(),
            edge: EdgeConfig::default(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            tables: DEFAULT_AUDIT_TABLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            health_functions: DEFAULT_HEALTH_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
