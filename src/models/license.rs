use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::license_key::{DEFAULT_LICENSE_MAX_USERS, DEFAULT_LICENSE_VALIDITY_DAYS};
use super::user::default_true;
use super::{Application, LicenseFacts, lenient_id, null_as_default};

/// Copy of the owning application's fields, stored inside each license so
/// the license store can answer API-key validation on its own.
///
/// The copy is taken at creation time and is not kept in sync with the
/// general store; see `resync_application_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSnapshot {
    pub name: String,
    pub api_key: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl From<&Application> for ApplicationSnapshot {
    fn from(app: &Application) -> Self {
        Self {
            name: app.name.clone(),
            api_key: app.api_key.clone(),
            version: Some(app.version_or_default().to_string()),
            is_active: app.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub license_key: String,
    #[serde(deserialize_with = "lenient_id")]
    pub application_id: String,
    #[serde(default = "default_max_users")]
    pub max_users: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_users: u32,
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_banned: bool,
    #[serde(default)]
    pub hwid: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hwid_lock_enabled: bool,
    /// Required on write. Documents from older writers may lack it.
    #[serde(default)]
    pub application_data: Option<ApplicationSnapshot>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_max_users() -> u32 {
    DEFAULT_LICENSE_MAX_USERS
}

fn default_validity_days() -> u32 {
    DEFAULT_LICENSE_VALIDITY_DAYS
}

impl License {
    pub fn facts(&self) -> LicenseFacts<'_> {
        LicenseFacts {
            is_active: self.is_active,
            is_banned: self.is_banned,
            expires_at: self.expires_at,
            current_users: self.current_users,
            max_users: self.max_users,
            hwid_lock_enabled: self.hwid_lock_enabled,
            bound_hwid: self.hwid.as_deref(),
        }
    }

    /// Whether the embedded snapshot carries `api_key`.
    pub fn matches_api_key(&self, api_key: &str) -> bool {
        self.application_data
            .as_ref()
            .is_some_and(|snapshot| snapshot.api_key == api_key)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicense {
    pub application_id: String,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub max_users: Option<u32>,
    #[serde(default)]
    pub validity_days: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hwid_lock_enabled: Option<bool>,
    #[serde(default)]
    pub hwid: Option<String>,
    /// Required. Creation fails without it.
    #[serde(default)]
    pub application_data: Option<ApplicationSnapshot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicense {
    pub max_users: Option<u32>,
    pub validity_days: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_banned: Option<bool>,
    /// Disabling the lock also clears the bound HWID.
    pub hwid_lock_enabled: Option<bool>,
}
