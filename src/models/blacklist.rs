use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::{lenient_id, lenient_opt_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlacklistType {
    Ip,
    Username,
    Hwid,
}

/// Blocked value. Entries without an application apply everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub application_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: BlacklistType,
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn is_global(&self) -> bool {
        self.application_id.is_none()
    }

    /// Whether this entry blocks `value` of `kind` within `application_id`.
    pub fn blocks(&self, application_id: &str, kind: BlacklistType, value: &str) -> bool {
        self.kind == kind
            && self.value == value
            && self
                .application_id
                .as_deref()
                .is_none_or(|scope| scope == application_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlacklistEntry {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: BlacklistType,
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlacklistEntry {
    pub value: Option<String>,
    pub reason: Option<Option<String>>,
}
