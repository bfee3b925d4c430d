use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_id, lenient_opt_id, null_as_default};

/// Most recent entries kept per application.
pub const ACTIVITY_LOG_CAP: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub application_id: String,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub app_user_id: Option<String>,
    pub event: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityLog {
    pub application_id: String,
    #[serde(default)]
    pub app_user_id: Option<String>,
    pub event: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
