//! License keys kept in the general document.

use chrono::Utc;

use super::{GeneralStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{
    CreateLicenseKey, DEFAULT_LICENSE_MAX_USERS, DEFAULT_LICENSE_VALIDITY_DAYS, GeneralDocument,
    InvalidReason, LicenseKey, UpdateLicenseStatus, Validation, new_id,
};
use crate::store::Outcome;
use crate::util::{KEY_LENGTH, expiry_after_days, generate_key};

pub async fn list_license_keys(
    store: &GeneralStore,
    application_id: &str,
) -> Result<Vec<LicenseKey>> {
    let doc = store.document().await?;
    Ok(doc
        .license_keys
        .iter()
        .filter(|k| k.application_id == application_id)
        .cloned()
        .collect())
}

pub async fn get_license_key(store: &GeneralStore, id: &str) -> Result<Option<LicenseKey>> {
    let doc = store.document().await?;
    Ok(doc.license_keys.iter().find(|k| k.id == id).cloned())
}

pub async fn get_license_key_by_key(
    store: &GeneralStore,
    key: &str,
) -> Result<Option<LicenseKey>> {
    let doc = store.document().await?;
    Ok(doc.license_keys.iter().find(|k| k.license_key == key).cloned())
}

pub async fn create_license_key(
    store: &GeneralStore,
    input: &CreateLicenseKey,
) -> Result<LicenseKey> {
    if input.max_users == Some(0) {
        return Err(AppError::BadRequest("maxUsers must be at least 1".into()));
    }
    let requested = input
        .license_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    store
        .transact("Create license key", |doc| {
            let application_id = input.application_id.as_str();
            if !doc.applications.iter().any(|a| a.id == application_id) {
                return Err(not_found("Application", application_id));
            }

            let key = match requested {
                Some(key) => {
                    if doc.license_keys.iter().any(|k| k.license_key == key) {
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
            let license = LicenseKey {
                id: new_id(),
                application_id: application_id.to_string(),
                license_key: key,
                max_users: input.max_users.unwrap_or(DEFAULT_LICENSE_MAX_USERS),
                current_users: 0,
                validity_days,
                expires_at: input
                    .expires_at
                    .unwrap_or_else(|| expiry_after_days(now, validity_days)),
                description: input.description.clone(),
                is_active: true,
                is_banned: false,
                created_at: now,
                updated_at: now,
            };
            doc.license_keys.push(license.clone());
            Ok(Outcome::Commit(license))
        })
        .await
}

pub async fn update_license_status(
    store: &GeneralStore,
    id: &str,
    input: &UpdateLicenseStatus,
) -> Result<LicenseKey> {
    store
        .transact(&format!("Update license {}", id), |doc| {
            let license = doc
                .license_keys
                .iter_mut()
                .find(|k| k.id == id)
                .ok_or_else(|| not_found("License key", id))?;
            if let Some(is_active) = input.is_active {
                license.is_active = is_active;
            }
            if let Some(is_banned) = input.is_banned {
                license.is_banned = is_banned;
            }
            if let Some(max_users) = input.max_users {
                license.max_users = max_users;
            }
            if let Some(expires_at) = input.expires_at {
                license.expires_at = expires_at;
            }
            if let Some(description) = &input.description {
                license.description = description.clone();
            }
            license.updated_at = Utc::now();
            Ok(Outcome::Commit(license.clone()))
        })
        .await
}

pub async fn delete_license_key(store: &GeneralStore, id: &str) -> Result<()> {
    store
        .transact(&format!("Delete license key: {}", id), |doc| {
            let index = doc
                .license_keys
                .iter()
                .position(|k| k.id == id)
                .ok_or_else(|| not_found("License key", id))?;
            doc.license_keys.remove(index);
            Ok(Outcome::Commit(()))
        })
        .await
}

fn evaluate(doc: &GeneralDocument, key: &str, application_id: &str) -> Validation<LicenseKey> {
    let Some(license) = doc
        .license_keys
        .iter()
        .find(|k| k.license_key == key && k.application_id == application_id)
    else {
        return Validation::invalid(InvalidReason::InvalidKey, None);
    };
    match license.facts().evaluate(Utc::now(), None) {
        Some(reason) => Validation::invalid(reason, Some(license.clone())),
        None => Validation::valid(license.clone()),
    }
}

/// Check a key of `application_id` without changing it.
pub async fn validate_license_key(
    store: &GeneralStore,
    key: &str,
    application_id: &str,
) -> Result<Validation<LicenseKey>> {
    let doc = store.document().await?;
    Ok(evaluate(&doc, key, application_id))
}

/// Add `delta` to the key's user count. The count never goes below zero.
pub async fn adjust_usage(store: &GeneralStore, key: &str, delta: i32) -> Result<LicenseKey> {
    store
        .transact(&format!("Update license key usage: {}", key), |doc| {
            let license = doc
                .license_keys
                .iter_mut()
                .find(|k| k.license_key == key)
                .ok_or_else(|| not_found("License key", key))?;
            license.current_users = license.current_users.saturating_add_signed(delta);
            license.updated_at = Utc::now();
            Ok(Outcome::Commit(license.clone()))
        })
        .await
}

/// Validate the key and, if it passes, take one user slot in the same write.
pub async fn consume_slot(
    store: &GeneralStore,
    key: &str,
    application_id: &str,
) -> Result<Validation<LicenseKey>> {
    store
        .transact(&format!("Consume license key slot: {}", key), |doc| {
            let validation = evaluate(doc, key, application_id);
            if !validation.valid {
                return Ok(Outcome::Skip(validation));
            }
            let Some(license) = doc
                .license_keys
                .iter_mut()
                .find(|k| k.license_key == key && k.application_id == application_id)
            else {
                return Ok(Outcome::Skip(validation));
            };
            license.current_users += 1;
            license.updated_at = Utc::now();
            Ok(Outcome::Commit(Validation::valid(license.clone())))
        })
        .await
}
