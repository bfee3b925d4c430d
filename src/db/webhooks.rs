use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{GeneralStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{CreateWebhook, UpdateWebhook, Webhook, new_id};
use crate::store::Outcome;

type HmacSha256 = Hmac<Sha256>;

pub async fn list_webhooks(store: &GeneralStore, user_id: &str) -> Result<Vec<Webhook>> {
    let doc = store.document().await?;
    Ok(doc
        .webhooks
        .iter()
        .filter(|w| w.user_id == user_id)
        .cloned()
        .collect())
}

pub async fn get_webhook(store: &GeneralStore, id: &str) -> Result<Option<Webhook>> {
    let doc = store.document().await?;
    Ok(doc.webhooks.iter().find(|w| w.id == id).cloned())
}

fn check_url(url: &str) -> Result<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid webhook URL: {}", url)))
    }
}

pub async fn create_webhook(
    store: &GeneralStore,
    user_id: &str,
    input: &CreateWebhook,
) -> Result<Webhook> {
    let url = input.url.trim();
    check_url(url)?;

    store
        .transact(&format!("Create webhook: {}", url), |doc| {
            let now = Utc::now();
            let webhook = Webhook {
                id: new_id(),
                user_id: user_id.to_string(),
                url: url.to_string(),
                events: input.events.clone(),
                is_active: input.is_active.unwrap_or(true),
                secret: input.secret.clone(),
                created_at: now,
                updated_at: now,
            };
            doc.webhooks.push(webhook.clone());
            Ok(Outcome::Commit(webhook))
        })
        .await
}

pub async fn update_webhook(
    store: &GeneralStore,
    id: &str,
    input: &UpdateWebhook,
) -> Result<Webhook> {
    if let Some(url) = &input.url {
        check_url(url.trim())?;
    }

    store
        .transact(&format!("Update webhook: {}", id), |doc| {
            let webhook = doc
                .webhooks
                .iter_mut()
                .find(|w| w.id == id)
                .ok_or_else(|| not_found("Webhook", id))?;
            if let Some(url) = &input.url {
                webhook.url = url.trim().to_string();
            }
            if let Some(events) = &input.events {
                webhook.events = events.clone();
            }
            if let Some(secret) = &input.secret {
                webhook.secret = secret.clone();
            }
            if let Some(is_active) = input.is_active {
                webhook.is_active = is_active;
            }
            webhook.updated_at = Utc::now();
            Ok(Outcome::Commit(webhook.clone()))
        })
        .await
}

pub async fn delete_webhook(store: &GeneralStore, id: &str) -> Result<()> {
    store
        .transact(&format!("Delete webhook: {}", id), |doc| {
            let index = doc
                .webhooks
                .iter()
                .position(|w| w.id == id)
                .ok_or_else(|| not_found("Webhook", id))?;
            doc.webhooks.remove(index);
            Ok(Outcome::Commit(()))
        })
        .await
}

/// Active webhooks of `user_id` subscribed to `event`.
pub async fn webhooks_for_event(
    store: &GeneralStore,
    user_id: &str,
    event: &str,
) -> Result<Vec<Webhook>> {
    let doc = store.document().await?;
    Ok(doc
        .webhooks
        .iter()
        .filter(|w| w.user_id == user_id && w.is_active && w.subscribes_to(event))
        .cloned()
        .collect())
}

/// HMAC-SHA256 of `body` under `secret`, hex encoded.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature produced by `sign_payload`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    match sign_payload(secret, body) {
        Ok(expected) => expected.as_bytes().ct_eq(signature.trim().as_bytes()).into(),
        Err(_) => false,
    }
}
