use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient_id;
use super::user::default_true;

/// Logged-in end user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub application_id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub app_user_id: String,
    pub session_token: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub hwid: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now <= self.expires_at
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    pub application_id: String,
    pub app_user_id: String,
    /// Generated when absent
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub hwid: Option<String>,
    /// Defaults to 24 hours from creation
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}
