use chrono::{Duration, Utc};

use super::{GeneralStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{
    AppUser, CreateAppUser, GeneralDocument, InvalidReason, LoginAttempt, UpdateAppUser, new_id,
};
use crate::store::Outcome;
use crate::util::hash_password;

/// Expiry given to new users of an application that has a subscription pool.
const DEFAULT_APP_USER_DAYS: i64 = 30;

pub async fn list_app_users(store: &GeneralStore, application_id: &str) -> Result<Vec<AppUser>> {
    let doc = store.document().await?;
    Ok(doc
        .app_users
        .iter()
        .filter(|u| u.application_id == application_id)
        .cloned()
        .collect())
}

pub async fn get_app_user(store: &GeneralStore, id: &str) -> Result<Option<AppUser>> {
    let doc = store.document().await?;
    Ok(doc.app_users.iter().find(|u| u.id == id).cloned())
}

pub async fn get_app_user_by_username(
    store: &GeneralStore,
    application_id: &str,
    username: &str,
) -> Result<Option<AppUser>> {
    let doc = store.document().await?;
    Ok(doc
        .app_users
        .iter()
        .find(|u| u.application_id == application_id && u.username == username)
        .cloned())
}

fn username_taken(
    doc: &GeneralDocument,
    application_id: &str,
    username: &str,
    except: Option<&str>,
) -> bool {
    doc.app_users.iter().any(|u| {
        u.application_id == application_id
            && u.username == username
            && except.is_none_or(|id| u.id != id)
    })
}

/// Create an end user.
///
/// Takes one slot of the application's default subscription and, when a
/// license key is supplied, one slot of that key. Both checks and both
/// increments happen in the same write as the new user.
pub async fn create_app_user(
    store: &GeneralStore,
    application_id: &str,
    input: &CreateAppUser,
) -> Result<AppUser> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".into()));
    }
    if input.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    let password_hash = hash_password(&input.password)?;

    store
        .transact(&format!("Create app user: {}", username), |doc| {
            if !doc.applications.iter().any(|a| a.id == application_id) {
                return Err(not_found("Application", application_id));
            }
            if username_taken(doc, application_id, username, None) {
                return Err(AppError::BadRequest(format!(
                    "Username {} already exists",
                    username
                )));
            }

            let now = Utc::now();

            if let Some(key) = input.license_key.as_deref() {
                let license = doc
                    .license_keys
                    .iter_mut()
                    .find(|k| k.license_key == key && k.application_id == application_id)
                    .ok_or_else(|| {
                        AppError::BadRequest(InvalidReason::InvalidKey.message().into())
                    })?;
                if let Some(reason) = license.facts().evaluate(now, None) {
                    return Err(AppError::BadRequest(reason.message().into()));
                }
                license.current_users += 1;
                license.updated_at = now;
            }

            let pool = doc
                .subscriptions
                .iter_mut()
                .find(|s| s.application_id == application_id && s.is_default());
            let has_pool = pool.is_some();
            if let Some(pool) = pool {
                if !pool.has_capacity() {
                    return Err(AppError::BadRequest(
                        "Subscription has reached maximum user limit".into(),
                    ));
                }
                pool.current_users += 1;
                pool.updated_at = now;
            }

            let expires_at = input.expires_at.or_else(|| {
                has_pool.then(|| now + Duration::days(DEFAULT_APP_USER_DAYS))
            });

            let mut user = AppUser {
                id: new_id(),
                application_id: application_id.to_string(),
                username: username.to_string(),
                password: password_hash.clone(),
                hwid: input.hwid.clone(),
                hwid_lock_enabled: input.hwid_lock_enabled.unwrap_or(false),
                license_key: input.license_key.clone(),
                expires_at,
                is_active: true,
                is_paused: input.is_paused.unwrap_or(false),
                is_banned: false,
                ip: input.ip.clone(),
                login_attempts: 0,
                last_login: None,
                last_login_attempt: None,
                created_at: now,
                updated_at: now,
            };
            user.sync_active_flag();
            doc.app_users.push(user.clone());
            Ok(Outcome::Commit(user))
        })
        .await
}

pub async fn update_app_user(
    store: &GeneralStore,
    id: &str,
    input: &UpdateAppUser,
) -> Result<AppUser> {
    if input.username.as_deref().is_some_and(|u| u.trim().is_empty()) {
        return Err(AppError::BadRequest("Username cannot be empty".into()));
    }
    let password_hash = match input.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    store
        .transact(&format!("Update app user: {}", id), |doc| {
            let index = doc
                .app_users
                .iter()
                .position(|u| u.id == id)
                .ok_or_else(|| not_found("App user", id))?;

            if let Some(username) = input.username.as_deref().map(str::trim) {
                let application_id = doc.app_users[index].application_id.clone();
                if username_taken(doc, &application_id, username, Some(id)) {
                    return Err(AppError::BadRequest(format!(
                        "Username {} already exists",
                        username
                    )));
                }
            }

            let user = &mut doc.app_users[index];
            if let Some(username) = &input.username {
                user.username = username.trim().to_string();
            }
            if let Some(hash) = &password_hash {
                user.password = hash.clone();
            }
            if let Some(hwid) = &input.hwid {
                user.hwid = hwid.clone();
            }
            if let Some(enabled) = input.hwid_lock_enabled {
                user.hwid_lock_enabled = enabled;
            }
            if let Some(expires_at) = input.expires_at {
                user.expires_at = expires_at;
            }
            if let Some(ip) = &input.ip {
                user.ip = ip.clone();
            }
            user.updated_at = Utc::now();
            Ok(Outcome::Commit(user.clone()))
        })
        .await
}

/// Apply `change` to one app user and persist it.
async fn modify(
    store: &GeneralStore,
    id: &str,
    action: &str,
    change: impl Fn(&mut AppUser) + Send + Sync,
) -> Result<AppUser> {
    store
        .transact(&format!("{} app user: {}", action, id), |doc| {
            let user = doc
                .app_users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| not_found("App user", id))?;
            change(user);
            user.sync_active_flag();
            user.updated_at = Utc::now();
            Ok(Outcome::Commit(user.clone()))
        })
        .await
}

pub async fn pause(store: &GeneralStore, id: &str) -> Result<AppUser> {
    modify(store, id, "Pause", |u| u.is_paused = true).await
}

pub async fn unpause(store: &GeneralStore, id: &str) -> Result<AppUser> {
    modify(store, id, "Unpause", |u| u.is_paused = false).await
}

pub async fn ban(store: &GeneralStore, id: &str) -> Result<AppUser> {
    modify(store, id, "Ban", |u| u.is_banned = true).await
}

pub async fn unban(store: &GeneralStore, id: &str) -> Result<AppUser> {
    modify(store, id, "Unban", |u| u.is_banned = false).await
}

pub async fn reset_hwid(store: &GeneralStore, id: &str) -> Result<AppUser> {
    modify(store, id, "Reset HWID for", |u| u.hwid = None).await
}

/// Delete an end user, giving back the license-key and subscription slots
/// it held.
pub async fn delete_app_user(store: &GeneralStore, id: &str) -> Result<()> {
    store
        .transact(&format!("Delete app user: {}", id), |doc| {
            let index = doc
                .app_users
                .iter()
                .position(|u| u.id == id)
                .ok_or_else(|| not_found("App user", id))?;
            let user = doc.app_users.remove(index);
            let now = Utc::now();

            if let Some(key) = user.license_key.as_deref()
                && let Some(license) = doc
                    .license_keys
                    .iter_mut()
                    .find(|k| k.license_key == key && k.application_id == user.application_id)
            {
                license.current_users = license.current_users.saturating_sub(1);
                license.updated_at = now;
            }
            if let Some(pool) = doc
                .subscriptions
                .iter_mut()
                .find(|s| s.application_id == user.application_id && s.is_default())
            {
                pool.current_users = pool.current_users.saturating_sub(1);
                pool.updated_at = now;
            }
            Ok(Outcome::Commit(()))
        })
        .await
}

/// Check an end user's password against the stored hash.
pub fn verify_password(user: &AppUser, password: &str) -> bool {
    crate::util::verify_password(password, &user.password)
}

/// Record a login attempt.
///
/// Failures bump the attempt counter; a success resets it, stores the
/// client address and binds the presented HWID when the user has the lock
/// enabled and no HWID yet.
pub async fn record_login(
    store: &GeneralStore,
    id: &str,
    attempt: &LoginAttempt,
) -> Result<AppUser> {
    let action = if attempt.success { "Login" } else { "Failed login" };
    store
        .transact(&format!("{} for app user: {}", action, id), |doc| {
            let user = doc
                .app_users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| not_found("App user", id))?;
            let now = Utc::now();
            user.last_login_attempt = Some(now);

            if attempt.success {
                user.login_attempts = 0;
                user.last_login = Some(now);
                if attempt.ip.is_some() {
                    user.ip = attempt.ip.clone();
                }
                if user.hwid_lock_enabled && user.hwid.is_none() && attempt.hwid.is_some() {
                    tracing::info!(app_user = %user.id, "Binding HWID on first login");
                    user.hwid = attempt.hwid.clone();
                }
            } else {
                user.login_attempts = user.login_attempts.saturating_add(1);
            }
            user.updated_at = now;
            Ok(Outcome::Commit(user.clone()))
        })
        .await
}
