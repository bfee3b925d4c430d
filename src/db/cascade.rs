//! Removal of an application's dependent records.
//!
//! ```text
//! applications
//! ├── appUsers
//! ├── subscriptions
//! ├── licenseKeys
//! ├── activityLogs
//! ├── activeSessions
//! └── webhooks (by the application's owner)
//! ```
//!
//! Licenses live in the license document and are not touched.

use crate::models::{Application, GeneralDocument};

/// Number of records removed per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeCounts {
    pub app_users: usize,
    pub subscriptions: usize,
    pub license_keys: usize,
    pub activity_logs: usize,
    pub active_sessions: usize,
    pub webhooks: usize,
}

impl CascadeCounts {
    pub fn total(&self) -> usize {
        self.app_users
            + self.subscriptions
            + self.license_keys
            + self.activity_logs
            + self.active_sessions
            + self.webhooks
    }
}

/// Drop the records matching `remove`, returning how many went.
fn remove_where<T>(items: &mut Vec<T>, remove: impl Fn(&T) -> bool) -> usize {
    let before = items.len();
    items.retain(|item| !remove(item));
    before - items.len()
}

/// Remove everything that belongs to `app`. The application record itself
/// is left for the caller.
pub fn cascade_application(doc: &mut GeneralDocument, app: &Application) -> CascadeCounts {
    let id = app.id.as_str();
    CascadeCounts {
        app_users: remove_where(&mut doc.app_users, |u| u.application_id == id),
        subscriptions: remove_where(&mut doc.subscriptions, |s| s.application_id == id),
        license_keys: remove_where(&mut doc.license_keys, |k| k.application_id == id),
        activity_logs: remove_where(&mut doc.activity_logs, |l| l.application_id == id),
        active_sessions: remove_where(&mut doc.active_sessions, |s| s.application_id == id),
        webhooks: remove_where(&mut doc.webhooks, |w| w.user_id == app.user_id),
    }
}
