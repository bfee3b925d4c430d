use std::collections::HashSet;

use chrono::Utc;

use super::GeneralStore;
use crate::error::Result;
use crate::models::{ACTIVITY_LOG_CAP, ActivityLog, CreateActivityLog, new_id};
use crate::store::Outcome;

fn newest_first(logs: &mut [ActivityLog]) {
    logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Logs of one application, newest first, at most `limit` of them.
pub async fn list_for_application(
    store: &GeneralStore,
    application_id: &str,
    limit: Option<usize>,
) -> Result<Vec<ActivityLog>> {
    let doc = store.document().await?;
    let mut logs: Vec<ActivityLog> = doc
        .activity_logs
        .iter()
        .filter(|l| l.application_id == application_id)
        .cloned()
        .collect();
    newest_first(&mut logs);
    if let Some(limit) = limit {
        logs.truncate(limit);
    }
    Ok(logs)
}

pub async fn list_for_app_user(store: &GeneralStore, app_user_id: &str) -> Result<Vec<ActivityLog>> {
    let doc = store.document().await?;
    let mut logs: Vec<ActivityLog> = doc
        .activity_logs
        .iter()
        .filter(|l| l.app_user_id.as_deref() == Some(app_user_id))
        .cloned()
        .collect();
    newest_first(&mut logs);
    Ok(logs)
}

pub async fn get_log(store: &GeneralStore, id: &str) -> Result<Option<ActivityLog>> {
    let doc = store.document().await?;
    Ok(doc.activity_logs.iter().find(|l| l.id == id).cloned())
}

/// Append a log entry. Only the newest entries per application are kept.
pub async fn create_log(store: &GeneralStore, input: &CreateActivityLog) -> Result<ActivityLog> {
    store
        .transact(&format!("Add activity log: {}", input.event), |doc| {
            let log = ActivityLog {
                id: new_id(),
                application_id: input.application_id.clone(),
                app_user_id: input.app_user_id.clone(),
                event: input.event.clone(),
                success: input.success,
                error_message: input.error_message.clone(),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                metadata: input.metadata.clone(),
                created_at: Utc::now(),
            };
            doc.activity_logs.push(log.clone());

            let count = doc
                .activity_logs
                .iter()
                .filter(|l| l.application_id == log.application_id)
                .count();
            if count > ACTIVITY_LOG_CAP {
                let mut ours: Vec<&ActivityLog> = doc
                    .activity_logs
                    .iter()
                    .filter(|l| l.application_id == log.application_id)
                    .collect();
                ours.sort_by_key(|l| l.created_at);
                let pruned: HashSet<String> = ours[..count - ACTIVITY_LOG_CAP]
                    .iter()
                    .map(|l| l.id.clone())
                    .collect();
                doc.activity_logs.retain(|l| !pruned.contains(&l.id));
                tracing::debug!(
                    application = %log.application_id,
                    pruned = pruned.len(),
                    "Pruned activity logs"
                );
            }
            Ok(Outcome::Commit(log))
        })
        .await
}
