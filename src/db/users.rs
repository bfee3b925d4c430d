use chrono::Utc;

use super::{GeneralStore, not_found};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{CreateUserWithCredentials, UpdateUser, UpsertUser, User, default_role};
use crate::store::Outcome;
use crate::util::{hash_password, verify_password};

pub async fn get_user(store: &GeneralStore, id: &str) -> Result<Option<User>> {
    let doc = store.document().await?;
    Ok(doc.users.iter().find(|u| u.id == id).cloned())
}

pub async fn list_users(store: &GeneralStore) -> Result<Vec<User>> {
    Ok(store.document().await?.users.clone())
}

/// Create the user, or merge the supplied fields into an existing one.
/// The id defaults to the email address.
pub async fn upsert_user(store: &GeneralStore, input: &UpsertUser) -> Result<User> {
    let id = input
        .id
        .clone()
        .or_else(|| input.email.clone())
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("User id or email is required".into()))?;

    store
        .transact(&format!("Update user: {}", id), |doc| {
            let now = Utc::now();
            if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                if let Some(email) = &input.email {
                    user.email = email.clone();
                }
                if let Some(first_name) = &input.first_name {
                    user.first_name = first_name.clone();
                }
                if let Some(last_name) = &input.last_name {
                    user.last_name = last_name.clone();
                }
                if let Some(url) = &input.profile_image_url {
                    user.profile_image_url = url.clone();
                }
                if let Some(role) = &input.role {
                    user.role = role.clone();
                }
                if let Some(permissions) = &input.permissions {
                    user.permissions = permissions.clone();
                }
                if let Some(is_active) = input.is_active {
                    user.is_active = is_active;
                }
                user.updated_at = now;
                return Ok(Outcome::Commit(user.clone()));
            }

            let user = User {
                id: id.clone(),
                email: input.email.clone().unwrap_or_default(),
                first_name: input.first_name.clone().unwrap_or_default(),
                last_name: input.last_name.clone().unwrap_or_default(),
                profile_image_url: input.profile_image_url.clone().flatten(),
                role: input.role.clone().unwrap_or_else(default_role),
                permissions: input.permissions.clone().unwrap_or_default(),
                is_active: input.is_active.unwrap_or(true),
                created_at: now,
                updated_at: now,
                password_hash: None,
            };
            doc.users.push(user.clone());
            Ok(Outcome::Commit(user))
        })
        .await
}

pub async fn update_user(store: &GeneralStore, id: &str, input: &UpdateUser) -> Result<User> {
    store
        .transact(&format!("Update user: {}", id), |doc| {
            let user = doc
                .users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| not_found("User", id))?;

            if let Some(email) = &input.email {
                user.email = email.clone();
            }
            if let Some(first_name) = &input.first_name {
                user.first_name = first_name.clone();
            }
            if let Some(last_name) = &input.last_name {
                user.last_name = last_name.clone();
            }
            if let Some(url) = &input.profile_image_url {
                user.profile_image_url = url.clone();
            }
            if let Some(role) = &input.role {
                user.role = role.clone();
            }
            if let Some(permissions) = &input.permissions {
                user.permissions = permissions.clone();
            }
            if let Some(is_active) = input.is_active {
                user.is_active = is_active;
            }
            user.updated_at = Utc::now();
            Ok(Outcome::Commit(user.clone()))
        })
        .await
}

/// Create a user that can log in with a password, or reset the
/// credentials (and supplied profile fields) of an existing one.
pub async fn create_user_with_credentials(
    store: &GeneralStore,
    input: &CreateUserWithCredentials,
) -> Result<User> {
    let email = input.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".into()));
    }
    if input.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    let password_hash = hash_password(&input.password)?;

    store
        .transact(&format!("Create/Update user credentials: {}", email), |doc| {
            let now = Utc::now();
            if let Some(user) = doc.users.iter_mut().find(|u| u.id == email) {
                user.email = email.to_string();
                if let Some(first_name) = &input.first_name {
                    user.first_name = first_name.clone();
                }
                if let Some(last_name) = &input.last_name {
                    user.last_name = last_name.clone();
                }
                if let Some(role) = &input.role {
                    user.role = role.clone();
                }
                if let Some(permissions) = &input.permissions {
                    user.permissions = permissions.clone();
                }
                if let Some(is_active) = input.is_active {
                    user.is_active = is_active;
                }
                user.password_hash = Some(password_hash.clone());
                user.updated_at = now;
                return Ok(Outcome::Commit(user.clone()));
            }

            let user = User {
                id: email.to_string(),
                email: email.to_string(),
                first_name: input.first_name.clone().unwrap_or_default(),
                last_name: input.last_name.clone().unwrap_or_default(),
                profile_image_url: None,
                role: input.role.clone().unwrap_or_else(default_role),
                permissions: input.permissions.clone().unwrap_or_default(),
                is_active: input.is_active.unwrap_or(true),
                created_at: now,
                updated_at: now,
                password_hash: Some(password_hash.clone()),
            };
            doc.users.push(user.clone());
            Ok(Outcome::Commit(user))
        })
        .await
}

pub async fn set_user_password(store: &GeneralStore, id: &str, password: &str) -> Result<User> {
    if password.is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    let password_hash = hash_password(password)?;

    store
        .transact(&format!("Update user password: {}", id), |doc| {
            let user = doc
                .users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| not_found("User", id))?;
            user.password_hash = Some(password_hash.clone());
            user.updated_at = Utc::now();
            Ok(Outcome::Commit(user.clone()))
        })
        .await
}

pub async fn delete_user(store: &GeneralStore, id: &str) -> Result<()> {
    store
        .transact(&format!("Delete user: {}", id), |doc| {
            let index = doc
                .users
                .iter()
                .position(|u| u.id == id)
                .ok_or_else(|| not_found("User", id))?;
            doc.users.remove(index);
            Ok(Outcome::Commit(()))
        })
        .await
}

/// Check a dashboard login. `None` for unknown, inactive or password-less
/// users as well as for a wrong password.
pub async fn authenticate_user(
    store: &GeneralStore,
    email: &str,
    password: &str,
) -> Result<Option<User>> {
    let doc = store.document().await?;
    let Some(user) = doc
        .users
        .iter()
        .find(|u| u.id == email || u.email.eq_ignore_ascii_case(email))
    else {
        return Ok(None);
    };

    if !user.is_active {
        tracing::info!(user = %user.id, "Login refused for inactive user");
        return Ok(None);
    }
    let Some(hash) = user.password_hash.as_deref() else {
        return Ok(None);
    };
    if !verify_password(password, hash) {
        return Ok(None);
    }
    Ok(Some(user.clone()))
}

/// Create the configured admin account when it does not exist yet.
/// Returns the user only when one was created.
pub async fn ensure_bootstrap_user(store: &GeneralStore, config: &Config) -> Result<Option<User>> {
    let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        tracing::debug!("No bootstrap admin configured");
        return Ok(None);
    };

    if store
        .document()
        .await?
        .users
        .iter()
        .any(|u| u.id == email || u.email == email)
    {
        return Ok(None);
    }

    let password_hash = hash_password(password)?;
    let created = store
        .transact("Initialize admin user", |doc| {
            if doc.users.iter().any(|u| u.id == email || u.email == email) {
                return Ok(Outcome::Skip(None));
            }
            let now = Utc::now();
            let user = User {
                id: email.to_string(),
                email: email.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                profile_image_url: None,
                role: "admin".into(),
                permissions: vec!["admin".into()],
                is_active: true,
                created_at: now,
                updated_at: now,
                password_hash: Some(password_hash.clone()),
            };
            doc.users.push(user.clone());
            Ok(Outcome::Commit(Some(user)))
        })
        .await?;

    if created.is_some() {
        tracing::info!(email = %email, "Bootstrap admin user created");
    }
    Ok(created)
}
