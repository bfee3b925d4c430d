//! Domain operations over the general and license documents.
//!
//! Every function takes the store it works on. Lookups return `Option`;
//! mutations of a record that does not exist fail with `AppError::NotFound`.

pub mod activity;
pub mod app_users;
pub mod applications;
pub mod blacklist;
mod cascade;
pub mod license_keys;
pub mod licenses;
pub mod messages;
pub mod sessions;
pub mod users;
pub mod webhooks;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::cache::CachePolicy;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{GeneralDocument, LicenseDocument};
use crate::remote::{GitHubContents, MemoryRemote, RemoteStore};
use crate::store::DocumentStore;

pub type GeneralStore = DocumentStore<GeneralDocument>;
pub type LicenseStore = DocumentStore<LicenseDocument>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The two store instances the service runs on.
#[derive(Clone)]
pub struct Stores {
    pub general: Arc<GeneralStore>,
    pub licenses: Arc<LicenseStore>,
}

impl Stores {
    pub fn new(
        general: Arc<dyn RemoteStore>,
        licenses: Arc<dyn RemoteStore>,
        policy: CachePolicy,
        conflict_retries: u32,
    ) -> Self {
        Self {
            general: Arc::new(DocumentStore::new(general, policy, conflict_retries)),
            licenses: Arc::new(DocumentStore::new(licenses, policy, conflict_retries)),
        }
    }

    /// Both stores backed by the configured repository, sharing one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let general = GitHubContents::from_config(config, client.clone(), &config.data_file)?;
        let licenses = GitHubContents::from_config(config, client, &config.license_file)?;
        tracing::info!(
            repository = %config.repository(),
            general = %general.url(),
            licenses = %licenses.url(),
            "Using repository storage"
        );

        Ok(Self::new(
            Arc::new(general),
            Arc::new(licenses),
            config.cache_policy,
            config.conflict_retries,
        ))
    }

    /// Both stores backed by fresh in-process remotes.
    pub fn in_memory(policy: CachePolicy, conflict_retries: u32) -> Self {
        Self::new(
            Arc::new(MemoryRemote::new()),
            Arc::new(MemoryRemote::new()),
            policy,
            conflict_retries,
        )
    }
}

fn not_found(kind: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} {}", kind, id))
}
