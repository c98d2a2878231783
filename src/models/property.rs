use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Row of the `properties` table. Everything except the id is optional in
/// practice, so every column the audits look at is nullable here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub visible_to_participants: Option<bool>,
    #[serde(default)]
    pub visible_to_investors: Option<bool>,
    #[serde(default)]
    pub images: Option<Vec<Value>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Property {
    pub fn organization(&self) -> Option<&str> {
        non_blank(self.organization_id.as_deref())
    }

    pub fn audience(&self) -> Option<&str> {
        non_blank(self.audience.as_deref())
    }

    pub fn status(&self) -> Option<&str> {
        non_blank(self.status.as_deref())
    }

    pub fn participant_visible(&self) -> bool {
        self.visible_to_participants.unwrap_or(false)
    }

    pub fn investor_visible(&self) -> bool {
        self.visible_to_investors.unwrap_or(false)
    }

    pub fn image_count(&self) -> usize {
        self.images
            .as_ref()
            .map(|images| images.iter().filter(|v| !v.is_null()).count())
            .unwrap_or(0)
    }

    /// Organization, audience and at least one image
    pub fn is_complete(&self) -> bool {
        self.organization().is_some() && self.audience().is_some() && self.image_count() > 0
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
