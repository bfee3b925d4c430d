use chrono::{Duration, Utc};

use super::{GeneralStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{ActiveSession, CreateSession, new_id};
use crate::store::Outcome;
use crate::util::generate_session_token;

const DEFAULT_SESSION_HOURS: i64 = 24;

/// Active, unexpired sessions of one application.
pub async fn list_active(store: &GeneralStore, application_id: &str) -> Result<Vec<ActiveSession>> {
    let doc = store.document().await?;
    let now = Utc::now();
    Ok(doc
        .active_sessions
        .iter()
        .filter(|s| s.application_id == application_id && s.is_live(now))
        .cloned()
        .collect())
}

pub async fn get_session(store: &GeneralStore, token: &str) -> Result<Option<ActiveSession>> {
    let doc = store.document().await?;
    Ok(doc
        .active_sessions
        .iter()
        .find(|s| s.session_token == token)
        .cloned())
}

pub async fn create_session(store: &GeneralStore, input: &CreateSession) -> Result<ActiveSession> {
    let token = input
        .session_token
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(generate_session_token);

    store
        .transact("Create active session", |doc| {
            if doc.active_sessions.iter().any(|s| s.session_token == token) {
                return Err(AppError::BadRequest("Session token already in use".into()));
            }
            let now = Utc::now();
            let session = ActiveSession {
                id: new_id(),
                application_id: input.application_id.clone(),
                app_user_id: input.app_user_id.clone(),
                session_token: token.clone(),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                location: input.location.clone(),
                hwid: input.hwid.clone(),
                expires_at: input
                    .expires_at
                    .unwrap_or_else(|| now + Duration::hours(DEFAULT_SESSION_HOURS)),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            doc.active_sessions.push(session.clone());
            Ok(Outcome::Commit(session))
        })
        .await
}

/// Record activity on a session.
pub async fn touch_session(store: &GeneralStore, token: &str) -> Result<ActiveSession> {
    store
        .transact("Update session activity", |doc| {
            let session = doc
                .active_sessions
                .iter_mut()
                .find(|s| s.session_token == token)
                .ok_or_else(|| not_found("Session", token))?;
            session.updated_at = Utc::now();
            Ok(Outcome::Commit(session.clone()))
        })
        .await
}

pub async fn end_session(store: &GeneralStore, token: &str) -> Result<ActiveSession> {
    store
        .transact("End session", |doc| {
            let session = doc
                .active_sessions
                .iter_mut()
                .find(|s| s.session_token == token)
                .ok_or_else(|| not_found("Session", token))?;
            if !session.is_active {
                return Ok(Outcome::Skip(session.clone()));
            }
            session.is_active = false;
            session.updated_at = Utc::now();
            Ok(Outcome::Commit(session.clone()))
        })
        .await
}

/// Remove ended and expired sessions of one application.
pub async fn prune_sessions(store: &GeneralStore, application_id: &str) -> Result<usize> {
    store
        .transact(
            &format!("Prune sessions for application: {}", application_id),
            |doc| {
                let now = Utc::now();
                let before = doc.active_sessions.len();
                doc.active_sessions
                    .retain(|s| s.application_id != application_id || s.is_live(now));
                match before - doc.active_sessions.len() {
                    0 => Ok(Outcome::Skip(0)),
                    removed => Ok(Outcome::Commit(removed)),
                }
            },
        )
        .await
}
