use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::default_true;
use super::{CustomMessages, MessageKind, lenient_id};

/// A piece of software gated by this service. Owned by one tenant user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Generated once at creation, never rotated in place.
    pub api_key: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_mismatch_message: Option<String>,
    #[serde(default)]
    pub login_success_message: Option<String>,
    #[serde(default)]
    pub login_failed_message: Option<String>,
    #[serde(default)]
    pub account_disabled_message: Option<String>,
    #[serde(default)]
    pub account_expired_message: Option<String>,
    #[serde(default)]
    pub hwid_mismatch_message: Option<String>,
    #[serde(default = "default_true")]
    pub hwid_lock_enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_APPLICATION_VERSION: &str = "1.0";

impl Application {
    fn override_for(&self, kind: MessageKind) -> Option<&str> {
        let value = match kind {
            MessageKind::LoginSuccess => &self.login_success_message,
            MessageKind::LoginFailed => &self.login_failed_message,
            MessageKind::AccountDisabled => &self.account_disabled_message,
            MessageKind::AccountExpired => &self.account_expired_message,
            MessageKind::VersionMismatch => &self.version_mismatch_message,
            MessageKind::HwidMismatch => &self.hwid_mismatch_message,
        };
        value.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Message shown to an end user, preferring this application's override.
    pub fn message_for<'a>(&'a self, kind: MessageKind, global: &'a CustomMessages) -> &'a str {
        self.override_for(kind).unwrap_or_else(|| global.get(kind))
    }

    pub fn version_or_default(&self) -> &str {
        self.version
            .as_deref()
            .unwrap_or(DEFAULT_APPLICATION_VERSION)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplication {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_mismatch_message: Option<String>,
    #[serde(default)]
    pub login_success_message: Option<String>,
    #[serde(default)]
    pub login_failed_message: Option<String>,
    #[serde(default)]
    pub account_disabled_message: Option<String>,
    #[serde(default)]
    pub account_expired_message: Option<String>,
    #[serde(default)]
    pub hwid_mismatch_message: Option<String>,
    #[serde(default)]
    pub hwid_lock_enabled: Option<bool>,
}

/// Partial update. There is deliberately no `api_key` field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplication {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub version: Option<Option<String>>,
    pub version_mismatch_message: Option<Option<String>>,
    pub login_success_message: Option<Option<String>>,
    pub login_failed_message: Option<Option<String>>,
    pub account_disabled_message: Option<Option<String>>,
    pub account_expired_message: Option<Option<String>>,
    pub hwid_mismatch_message: Option<Option<String>>,
    pub hwid_lock_enabled: Option<bool>,
}
