use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Client traits that go into a device fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTraits {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen: String,
    pub timezone: String,
}

impl DeviceTraits {
    /// Traits a server can observe from request headers; screen and timezone
    /// stay empty
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            user_agent: header("user-agent"),
            language: header("accept-language"),
            platform: header("sec-ch-ua-platform").trim_matches('"').to_string(),
            screen: String::new(),
            timezone: String::new(),
        }
    }
}

/// Hex SHA-256 over the `|`-joined traits
pub fn device_fingerprint(traits: &DeviceTraits) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        [
            traits.user_agent.as_str(),
            traits.language.as_str(),
            traits.platform.as_str(),
            traits.screen.as_str(),
            traits.timezone.as_str(),
        ]
        .join("|")
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}
