use chrono::Utc;

use super::cascade::cascade_application;
use super::{GeneralStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{
    Application, CreateApplication, DEFAULT_APPLICATION_VERSION, DEFAULT_SUBSCRIPTION_MAX_USERS,
    DEFAULT_SUBSCRIPTION_NAME, DEFAULT_SUBSCRIPTION_VALIDITY_DAYS, Subscription,
    UpdateApplication, new_id,
};
use crate::store::Outcome;
use crate::util::{KEY_LENGTH, expiry_after_days, generate_key};

/// All applications, or only those owned by `owner`.
pub async fn list_applications(
    store: &GeneralStore,
    owner: Option<&str>,
) -> Result<Vec<Application>> {
    let doc = store.document().await?;
    Ok(doc
        .applications
        .iter()
        .filter(|app| owner.is_none_or(|owner| app.user_id == owner))
        .cloned()
        .collect())
}

pub async fn get_application(store: &GeneralStore, id: &str) -> Result<Option<Application>> {
    let doc = store.document().await?;
    Ok(doc.applications.iter().find(|app| app.id == id).cloned())
}

pub async fn get_application_by_api_key(
    store: &GeneralStore,
    api_key: &str,
) -> Result<Option<Application>> {
    let doc = store.document().await?;
    Ok(doc
        .applications
        .iter()
        .find(|app| app.api_key == api_key)
        .cloned())
}

/// Create an application with a fresh API key, together with its default
/// subscription pool.
pub async fn create_application(
    store: &GeneralStore,
    owner: &str,
    input: &CreateApplication,
) -> Result<Application> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Application name is required".into()));
    }

    store
        .transact(
            &format!("Create application: {} with default subscription", name),
            |doc| {
                let now = Utc::now();
                let app = Application {
                    id: new_id(),
                    user_id: owner.to_string(),
                    name: name.to_string(),
                    description: input.description.clone(),
                    api_key: generate_key(KEY_LENGTH),
                    is_active: input.is_active.unwrap_or(true),
                    version: Some(
                        input
                            .version
                            .clone()
                            .unwrap_or_else(|| DEFAULT_APPLICATION_VERSION.to_string()),
                    ),
                    version_mismatch_message: input.version_mismatch_message.clone(),
                    login_success_message: input.login_success_message.clone(),
                    login_failed_message: input.login_failed_message.clone(),
                    account_disabled_message: input.account_disabled_message.clone(),
                    account_expired_message: input.account_expired_message.clone(),
                    hwid_mismatch_message: input.hwid_mismatch_message.clone(),
                    hwid_lock_enabled: input.hwid_lock_enabled.unwrap_or(true),
                    created_at: now,
                    updated_at: now,
                };

                doc.subscriptions.push(Subscription {
                    id: new_id(),
                    application_id: app.id.clone(),
                    name: DEFAULT_SUBSCRIPTION_NAME.to_string(),
                    description: Some(format!("Default subscription for {}", app.name)),
                    max_users: DEFAULT_SUBSCRIPTION_MAX_USERS,
                    current_users: 0,
                    validity_days: DEFAULT_SUBSCRIPTION_VALIDITY_DAYS,
                    expires_at: expiry_after_days(now, DEFAULT_SUBSCRIPTION_VALIDITY_DAYS),
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                });
                doc.applications.push(app.clone());
                Ok(Outcome::Commit(app))
            },
        )
        .await
}

pub async fn update_application(
    store: &GeneralStore,
    id: &str,
    input: &UpdateApplication,
) -> Result<Application> {
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Application name cannot be empty".into()));
    }

    store
        .transact(&format!("Update application: {}", id), |doc| {
            let app = doc
                .applications
                .iter_mut()
                .find(|app| app.id == id)
                .ok_or_else(|| not_found("Application", id))?;

            if let Some(name) = &input.name {
                app.name = name.trim().to_string();
            }
            if let Some(description) = &input.description {
                app.description = description.clone();
            }
            if let Some(is_active) = input.is_active {
                app.is_active = is_active;
            }
            if let Some(version) = &input.version {
                app.version = version.clone();
            }
            let messages = [
                (&mut app.version_mismatch_message, &input.version_mismatch_message),
                (&mut app.login_success_message, &input.login_success_message),
                (&mut app.login_failed_message, &input.login_failed_message),
                (&mut app.account_disabled_message, &input.account_disabled_message),
                (&mut app.account_expired_message, &input.account_expired_message),
                (&mut app.hwid_mismatch_message, &input.hwid_mismatch_message),
            ];
            for (target, value) in messages {
                if let Some(value) = value {
                    *target = value.clone();
                }
            }
            if let Some(enabled) = input.hwid_lock_enabled {
                app.hwid_lock_enabled = enabled;
            }
            app.updated_at = Utc::now();
            Ok(Outcome::Commit(app.clone()))
        })
        .await
}

/// Toggle whether the application accepts logins.
pub async fn set_active(store: &GeneralStore, id: &str, active: bool) -> Result<Application> {
    let verb = if active { "Activate" } else { "Deactivate" };
    store
        .transact(&format!("{} application: {}", verb, id), |doc| {
            let app = doc
                .applications
                .iter_mut()
                .find(|app| app.id == id)
                .ok_or_else(|| not_found("Application", id))?;
            if app.is_active == active {
                return Ok(Outcome::Skip(app.clone()));
            }
            app.is_active = active;
            app.updated_at = Utc::now();
            Ok(Outcome::Commit(app.clone()))
        })
        .await
}

/// Delete an application and everything that hangs off it.
pub async fn delete_application(store: &GeneralStore, id: &str) -> Result<()> {
    store
        .transact(
            &format!("Delete application: {} with cascade delete", id),
            |doc| {
                let index = doc
                    .applications
                    .iter()
                    .position(|app| app.id == id)
                    .ok_or_else(|| not_found("Application", id))?;
                let app = doc.applications.remove(index);
                let removed = cascade_application(doc, &app);
                tracing::info!(
                    application = %app.id,
                    name = %app.name,
                    removed = removed.total(),
                    "Application deleted"
                );
                Ok(Outcome::Commit(()))
            },
        )
        .await
}
