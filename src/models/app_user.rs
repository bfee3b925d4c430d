use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use super::user::default_true;
use super::{lenient_id, null_as_default};

/// End user of one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub application_id: String,
    pub username: String,
    /// Password hash
    pub password: String,
    #[serde(default)]
    pub hwid: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hwid_lock_enabled: bool,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_paused: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_banned: bool,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub login_attempts: u32,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login_attempt: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Derived lifecycle state. Banned takes precedence over paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppUserStatus {
    Active,
    Paused,
    Banned,
}

impl AppUser {
    pub fn status(&self) -> AppUserStatus {
        if self.is_banned {
            AppUserStatus::Banned
        } else if self.is_paused {
            AppUserStatus::Paused
        } else {
            AppUserStatus::Active
        }
    }

    /// Recompute `is_active` from the independent pause and ban flags.
    pub(crate) fn sync_active_flag(&mut self) {
        self.is_active = !self.is_paused && !self.is_banned;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppUser {
    pub username: String,
    /// Plaintext, hashed before storage
    pub password: String,
    #[serde(default)]
    pub hwid: Option<String>,
    #[serde(default)]
    pub hwid_lock_enabled: Option<bool>,
    /// License key (general store) this user consumes a slot of
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_paused: Option<bool>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppUser {
    pub username: Option<String>,
    /// Plaintext; when absent the stored hash is left untouched
    pub password: Option<String>,
    pub hwid: Option<Option<String>>,
    pub hwid_lock_enabled: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub ip: Option<Option<String>>,
}

/// Details of a login attempt, for bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct LoginAttempt {
    pub success: bool,
    pub hwid: Option<String>,
    pub ip: Option<String>,
}
