use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ActiveSession, ActivityLog, AppUser, Application, BlacklistEntry, CustomMessages, License,
    LicenseKey, Subscription, User, Webhook,
};
use crate::codec::Document;
use crate::error::{AppError, Result};

pub const DOCUMENT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    DOCUMENT_SCHEMA_VERSION.to_string()
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
            version: default_version(),
        }
    }
}

/// Everything except licenses: tenants, applications and their end users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralDocument {
    pub users: Vec<User>,
    pub applications: Vec<Application>,
    pub app_users: Vec<AppUser>,
    pub license_keys: Vec<LicenseKey>,
    pub subscriptions: Vec<Subscription>,
    pub webhooks: Vec<Webhook>,
    pub blacklist_entries: Vec<BlacklistEntry>,
    pub activity_logs: Vec<ActivityLog>,
    pub active_sessions: Vec<ActiveSession>,
    pub credits: BTreeMap<String, i64>,
    pub custom_messages: CustomMessages,
    /// Legacy collections, carried through untouched.
    pub admin: Vec<serde_json::Value>,
    pub licenses: Vec<serde_json::Value>,
    #[serde(rename = "owner_id")]
    pub owner_id: Option<String>,
    pub metadata: Metadata,
}

impl Document for GeneralDocument {
    const ARRAYS: &'static [&'static str] = &[
        "users",
        "applications",
        "appUsers",
        "licenseKeys",
        "subscriptions",
        "webhooks",
        "blacklistEntries",
        "activityLogs",
        "activeSessions",
        "admin",
        "licenses",
    ];
    const OBJECTS: &'static [&'static str] = &["credits", "customMessages", "metadata"];

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LicenseDocument {
    pub licenses: Vec<License>,
    pub metadata: Metadata,
}

impl Document for LicenseDocument {
    const ARRAYS: &'static [&'static str] = &["licenses"];
    const OBJECTS: &'static [&'static str] = &["metadata"];

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Only licenses added or changed since `previous` must carry an
    /// application snapshot. Untouched legacy records are left alone.
    fn check_invariants(&self, previous: &Self) -> Result<()> {
        match self
            .licenses
            .iter()
            .filter(|license| license.application_data.is_none())
            .find(|license| !previous.licenses.contains(license))
        {
            Some(license) => Err(AppError::Invariant(format!(
                "license {} has no applicationData",
                license.id
            ))),
            None => Ok(()),
        }
    }
}
