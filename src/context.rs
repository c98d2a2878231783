use std::sync::Arc;

use sda_portal::backend::{BackendError, RestBackend};
use sda_portal::config::AppConfig;
use sda_portal::edge::EdgeFunctions;
use sda_portal::security::RateLimiter;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    /// Anon-key client; guarded routes fork it per request
    pub backend: Arc<RestBackend>,
    pub edge: Arc<EdgeFunctions>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self, BackendError> {
        Ok(Self {
            backend: Arc::new(RestBackend::new(&config.backend)?),
            edge: Arc::new(EdgeFunctions::new(&config.backend)?),
            rate_limiter: Arc::new(RateLimiter::from_config(&config.security)),
            config: Arc::new(config),
        })
    }
}
