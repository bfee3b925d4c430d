//! Licenses kept in the license document.
//!
//! Each license embeds a snapshot of its application so that API-key
//! validation can be answered from this document alone.

use std::collections::HashMap;

use chrono::Utc;

use super::{LicenseStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{
    Application, ApplicationSnapshot, CreateLicense, DEFAULT_LICENSE_MAX_USERS,
    DEFAULT_LICENSE_VALIDITY_DAYS, InvalidReason, License, LicenseDocument, UpdateLicense,
    Validation, new_id,
};
use crate::store::Outcome;
use crate::util::{KEY_LENGTH, expiry_after_days, generate_key};

pub async fn list_licenses(store: &LicenseStore) -> Result<Vec<License>> {
    Ok(store.document().await?.licenses.clone())
}

pub async fn list_licenses_for_application(
    store: &LicenseStore,
    application_id: &str,
) -> Result<Vec<License>> {
    let doc = store.document().await?;
    Ok(doc
        .licenses
        .iter()
        .filter(|l| l.application_id == application_id)
        .cloned()
        .collect())
}

pub async fn get_license(store: &LicenseStore, id: &str) -> Result<Option<License>> {
    let doc = store.document().await?;
    Ok(doc.licenses.iter().find(|l| l.id == id).cloned())
}

pub async fn get_license_by_key(store: &LicenseStore, key: &str) -> Result<Option<License>> {
    let doc = store.document().await?;
    Ok(doc.licenses.iter().find(|l| l.license_key == key).cloned())
}

pub async fn create_license(store: &LicenseStore, input: &CreateLicense) -> Result<License> {
    let Some(snapshot) = input.application_data.clone() else {
        return Err(AppError::Invariant(
            "applicationData is required when creating a license".into(),
        ));
    };
    if input.max_users == Some(0) {
        return Err(AppError::BadRequest("maxUsers must be at least 1".into()));
    }
    let requested = input
        .license_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let license = store
        .transact("Create license", |doc| {
            let key = match requested {
                Some(key) => {
                    if doc.licenses.iter().any(|l| l.license_key == key) {
                        return Err(AppError::BadRequest(format!(
                            "License key {} already exists",
                            key
                        )));
                    }
                    key.to_string()
                }
                None => generate_key(KEY_LENGTH),
            };

            let now = Utc::now();
            let validity_days = input.validity_days.unwrap_or(DEFAULT_LICENSE_VALIDITY_DAYS);
            let license = License {
                id: new_id(),
                license_key: key,
                application_id: input.application_id.clone(),
                max_users: input.max_users.unwrap_or(DEFAULT_LICENSE_MAX_USERS),
                current_users: 0,
                validity_days,
                expires_at: input
                    .expires_at
                    .unwrap_or_else(|| expiry_after_days(now, validity_days)),
                description: input.description.clone(),
                is_active: true,
                is_banned: false,
                hwid: input.hwid.clone(),
                hwid_lock_enabled: input.hwid_lock_enabled.unwrap_or(false),
                application_data: Some(snapshot.clone()),
                created_at: now,
                updated_at: now,
            };
            doc.licenses.push(license.clone());
            Ok(Outcome::Commit(license))
        })
        .await?;

    tracing::info!(
        license = %license.license_key,
        application = %license.application_id,
        "License created"
    );
    Ok(license)
}

pub async fn update_license(
    store: &LicenseStore,
    id: &str,
    input: &UpdateLicense,
) -> Result<License> {
    modify(store, id, "Update license", |license| {
        if let Some(max_users) = input.max_users {
            license.max_users = max_users;
        }
        if let Some(validity_days) = input.validity_days {
            license.validity_days = validity_days;
        }
        if let Some(expires_at) = input.expires_at {
            license.expires_at = expires_at;
        }
        if let Some(description) = &input.description {
            license.description = description.clone();
        }
        if let Some(is_active) = input.is_active {
            license.is_active = is_active;
        }
        if let Some(is_banned) = input.is_banned {
            license.is_banned = is_banned;
        }
        if let Some(enabled) = input.hwid_lock_enabled {
            license.hwid_lock_enabled = enabled;
            if !enabled {
                license.hwid = None;
            }
        }
    })
    .await
}

pub async fn delete_license(store: &LicenseStore, id: &str) -> Result<()> {
    store
        .transact(&format!("Delete license: {}", id), |doc| {
            let index = doc
                .licenses
                .iter()
                .position(|l| l.id == id)
                .ok_or_else(|| not_found("License", id))?;
            doc.licenses.remove(index);
            Ok(Outcome::Commit(()))
        })
        .await
}

fn find_for_application<'a>(
    doc: &'a LicenseDocument,
    key: &str,
    application_id: Option<&str>,
) -> Option<&'a License> {
    doc.licenses.iter().find(|l| {
        l.license_key == key && application_id.is_none_or(|app| l.application_id == app)
    })
}

fn check(license: &License, hwid: Option<&str>) -> Validation<License> {
    match license.facts().evaluate(Utc::now(), hwid) {
        Some(reason) => Validation::invalid(reason, Some(license.clone())),
        None => Validation::valid(license.clone()),
    }
}

fn evaluate_with_api_key(
    doc: &LicenseDocument,
    api_key: &str,
    key: &str,
    hwid: Option<&str>,
) -> Validation<License> {
    let Some(license) = doc
        .licenses
        .iter()
        .find(|l| l.license_key == key && l.matches_api_key(api_key))
    else {
        return Validation::invalid(InvalidReason::InvalidCredentials, None);
    };
    if license
        .application_data
        .as_ref()
        .is_some_and(|app| !app.is_active)
    {
        return Validation::invalid(InvalidReason::ApplicationInactive, Some(license.clone()));
    }
    check(license, hwid)
}

/// Validate a key, optionally scoped to one application.
pub async fn validate_license(
    store: &LicenseStore,
    key: &str,
    application_id: Option<&str>,
    hwid: Option<&str>,
) -> Result<Validation<License>> {
    let doc = store.document().await?;
    Ok(match find_for_application(&doc, key, application_id) {
        Some(license) => check(license, hwid),
        None => Validation::invalid(InvalidReason::InvalidKey, None),
    })
}

/// Validate a key presented together with an application API key.
///
/// Only the API key embedded in the license is consulted, so a rotated key
/// in the general store has no effect until the snapshot is resynced.
pub async fn validate_license_with_api_key(
    store: &LicenseStore,
    api_key: &str,
    key: &str,
    hwid: Option<&str>,
) -> Result<Validation<License>> {
    let doc = store.document().await?;
    let validation = evaluate_with_api_key(&doc, api_key, key, hwid);
    if let Some(reason) = validation.reason {
        tracing::debug!(license = %key, reason = reason.code(), "License validation failed");
    }
    Ok(validation)
}

async fn modify(
    store: &LicenseStore,
    id: &str,
    action: &str,
    change: impl Fn(&mut License) + Send + Sync,
) -> Result<License> {
    store
        .transact(&format!("{}: {}", action, id), |doc| {
            let license = doc
                .licenses
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| not_found("License", id))?;
            change(license);
            license.updated_at = Utc::now();
            Ok(Outcome::Commit(license.clone()))
        })
        .await
}

pub async fn reset_hwid(store: &LicenseStore, id: &str) -> Result<License> {
    modify(store, id, "Reset HWID for license", |l| l.hwid = None).await
}

/// Bind `hwid` and turn the lock on.
pub async fn lock_hwid(store: &LicenseStore, id: &str, hwid: &str) -> Result<License> {
    modify(store, id, "Lock HWID for license", |l| {
        l.hwid = Some(hwid.to_string());
        l.hwid_lock_enabled = true;
    })
    .await
}

pub async fn unlock_hwid(store: &LicenseStore, id: &str) -> Result<License> {
    modify(store, id, "Unlock HWID for license", |l| {
        l.hwid = None;
        l.hwid_lock_enabled = false;
    })
    .await
}

/// Ban and deactivate.
pub async fn ban(store: &LicenseStore, id: &str) -> Result<License> {
    modify(store, id, "Ban license", |l| {
        l.is_banned = true;
        l.is_active = false;
    })
    .await
}

/// Lift a ban and reactivate.
pub async fn unban(store: &LicenseStore, id: &str) -> Result<License> {
    modify(store, id, "Unban license", |l| {
        l.is_banned = false;
        l.is_active = true;
    })
    .await
}

async fn adjust_usage(
    store: &LicenseStore,
    key: &str,
    action: &str,
    delta: i32,
) -> Result<License> {
    store
        .transact(&format!("{} usage for license: {}", action, key), |doc| {
            let license = doc
                .licenses
                .iter_mut()
                .find(|l| l.license_key == key)
                .ok_or_else(|| not_found("License", key))?;
            license.current_users = license.current_users.saturating_add_signed(delta);
            license.updated_at = Utc::now();
            Ok(Outcome::Commit(license.clone()))
        })
        .await
}

pub async fn increment_usage(store: &LicenseStore, key: &str) -> Result<License> {
    adjust_usage(store, key, "Increment", 1).await
}

/// Never goes below zero.
pub async fn decrement_usage(store: &LicenseStore, key: &str) -> Result<License> {
    adjust_usage(store, key, "Decrement", -1).await
}

/// Validate with an API key and take a user slot in the same write.
pub async fn consume_slot(
    store: &LicenseStore,
    api_key: &str,
    key: &str,
    hwid: Option<&str>,
) -> Result<Validation<License>> {
    store
        .transact(&format!("Consume slot for license: {}", key), |doc| {
            let validation = evaluate_with_api_key(doc, api_key, key, hwid);
            if !validation.valid {
                return Ok(Outcome::Skip(validation));
            }
            let Some(license) = doc
                .licenses
                .iter_mut()
                .find(|l| l.license_key == key && l.matches_api_key(api_key))
            else {
                return Ok(Outcome::Skip(validation));
            };
            license.current_users += 1;
            license.updated_at = Utc::now();
            Ok(Outcome::Commit(Validation::valid(license.clone())))
        })
        .await
}

/// Copy the application's current fields into every license of it.
/// Returns how many licenses changed.
pub async fn resync_application_snapshot(
    store: &LicenseStore,
    application: &Application,
) -> Result<usize> {
    let updated = resync(
        store,
        std::slice::from_ref(application),
        &format!("Resync application data for: {}", application.id),
    )
    .await?;
    tracing::info!(application = %application.id, updated, "Application snapshot resynced");
    Ok(updated)
}

/// Resync every license whose application is in `applications`, in one
/// write. Licenses of unknown applications are left as they are.
pub async fn resync_all_snapshots(
    store: &LicenseStore,
    applications: &[Application],
) -> Result<usize> {
    let updated = resync(
        store,
        applications,
        &format!("Resync application data for {} applications", applications.len()),
    )
    .await?;
    tracing::info!(applications = applications.len(), updated, "Application snapshots resynced");
    Ok(updated)
}

async fn resync(store: &LicenseStore, applications: &[Application], message: &str) -> Result<usize> {
    let snapshots: HashMap<&str, ApplicationSnapshot> = applications
        .iter()
        .map(|app| (app.id.as_str(), ApplicationSnapshot::from(app)))
        .collect();
    store
        .transact(message, |doc| {
            let now = Utc::now();
            let mut updated = 0;
            for license in doc.licenses.iter_mut() {
                let Some(snapshot) = snapshots.get(license.application_id.as_str()) else {
                    continue;
                };
                if license.application_data.as_ref() != Some(snapshot) {
                    license.application_data = Some(snapshot.clone());
                    license.updated_at = now;
                    updated += 1;
                }
            }
            if updated == 0 {
                Ok(Outcome::Skip(0))
            } else {
                Ok(Outcome::Commit(updated))
            }
        })
        .await
}
