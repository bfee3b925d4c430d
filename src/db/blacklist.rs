use chrono::Utc;

use super::{GeneralStore, not_found};
use crate::error::{AppError, Result};
use crate::models::{
    BlacklistEntry, BlacklistType, CreateBlacklistEntry, UpdateBlacklistEntry, new_id,
};
use crate::store::Outcome;

pub async fn list_entries(store: &GeneralStore) -> Result<Vec<BlacklistEntry>> {
    Ok(store.document().await?.blacklist_entries.clone())
}

pub async fn get_entry(store: &GeneralStore, id: &str) -> Result<Option<BlacklistEntry>> {
    let doc = store.document().await?;
    Ok(doc.blacklist_entries.iter().find(|e| e.id == id).cloned())
}

fn required_value(value: &str) -> Result<&str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest("Blacklist value is required".into()));
    }
    Ok(value)
}

pub async fn create_entry(
    store: &GeneralStore,
    input: &CreateBlacklistEntry,
) -> Result<BlacklistEntry> {
    let value = required_value(&input.value)?;

    store
        .transact(
            &format!("Create blacklist entry: {}:{}", input.kind.as_ref(), value),
            |doc| {
                let now = Utc::now();
                let entry = BlacklistEntry {
                    id: new_id(),
                    application_id: input.application_id.clone(),
                    kind: input.kind,
                    value: value.to_string(),
                    reason: input.reason.clone(),
                    created_at: now,
                    updated_at: now,
                };
                doc.blacklist_entries.push(entry.clone());
                Ok(Outcome::Commit(entry))
            },
        )
        .await
}

pub async fn update_entry(
    store: &GeneralStore,
    id: &str,
    input: &UpdateBlacklistEntry,
) -> Result<BlacklistEntry> {
    let value = input.value.as_deref().map(required_value).transpose()?;
    store
        .transact(&format!("Update blacklist entry: {}", id), |doc| {
            let entry = doc
                .blacklist_entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| not_found("Blacklist entry", id))?;
            if let Some(value) = value {
                entry.value = value.to_string();
            }
            if let Some(reason) = &input.reason {
                entry.reason = reason.clone();
            }
            entry.updated_at = Utc::now();
            Ok(Outcome::Commit(entry.clone()))
        })
        .await
}

pub async fn delete_entry(store: &GeneralStore, id: &str) -> Result<()> {
    store
        .transact(&format!("Delete blacklist entry: {}", id), |doc| {
            let index = doc
                .blacklist_entries
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| not_found("Blacklist entry", id))?;
            doc.blacklist_entries.remove(index);
            Ok(Outcome::Commit(()))
        })
        .await
}

/// The first entry blocking `value`, scoped to `application_id` or global.
pub async fn check(
    store: &GeneralStore,
    application_id: &str,
    kind: BlacklistType,
    value: &str,
) -> Result<Option<BlacklistEntry>> {
    let doc = store.document().await?;
    Ok(doc
        .blacklist_entries
        .iter()
        .find(|e| e.blocks(application_id, kind, value))
        .cloned())
}
