use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::default_true;
use super::{LicenseFacts, lenient_id, null_as_default};

pub const DEFAULT_LICENSE_MAX_USERS: u32 = 1;
pub const DEFAULT_LICENSE_VALIDITY_DAYS: u32 = 30;

pub const DEFAULT_SUBSCRIPTION_NAME: &str = "default";
pub const DEFAULT_SUBSCRIPTION_MAX_USERS: u32 = 1000;
pub const DEFAULT_SUBSCRIPTION_VALIDITY_DAYS: u32 = 365;

/// License key kept in the general document, scoped to one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKey {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub application_id: String,
    pub license_key: String,
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

impl LicenseKey {
    /// License keys carry no HWID binding of their own.
    pub fn facts(&self) -> LicenseFacts<'_> {
        LicenseFacts {
            is_active: self.is_active,
            is_banned: self.is_banned,
            expires_at: self.expires_at,
            current_users: self.current_users,
            max_users: self.max_users,
            hwid_lock_enabled: false,
            bound_hwid: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseKey {
    pub application_id: String,
    /// Generated when absent
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub max_users: Option<u32>,
    #[serde(default)]
    pub validity_days: Option<u32>,
    /// Overrides `validity_days` when given
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseStatus {
    pub is_active: Option<bool>,
    pub is_banned: Option<bool>,
    pub max_users: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
}

/// User pool of an application. Creating an app user takes one slot of the
/// application's default pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub application_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_pool_size")]
    pub max_users: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_users: u32,
    #[serde(default = "default_pool_days")]
    pub validity_days: u32,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_pool_size() -> u32 {
    DEFAULT_SUBSCRIPTION_MAX_USERS
}

fn default_pool_days() -> u32 {
    DEFAULT_SUBSCRIPTION_VALIDITY_DAYS
}

impl Subscription {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_SUBSCRIPTION_NAME
    }

    pub fn has_capacity(&self) -> bool {
        self.is_active && self.current_users < self.max_users
    }
}
