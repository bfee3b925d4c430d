use std::env;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::error::{AppError, Result};
use crate::remote::RetryPolicy;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    /// Repository owner (user or organization)
    pub github_owner: Option<String>,
    pub github_repo: Option<String>,
    pub api_url: String,
    /// Path of the general tenant-data document inside the repository
    pub data_file: String,
    /// Path of the license document inside the repository
    pub license_file: String,
    pub production: bool,
    pub cache_policy: CachePolicy,
    pub retry_policy: RetryPolicy,
    /// How many times a read-mutate-write transaction is re-run after a conflict
    pub conflict_retries: u32,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

fn env_millis(name: &str, default: u64) -> Duration {
    let millis = env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(millis)
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let production = env::var("AUTHSTORE_ENV")
            .map(|v| v == "prod" || v == "production")
            .unwrap_or(false);

        let cache_policy = CachePolicy {
            ttl: env_millis("CACHE_TTL_MS", 3_000),
            write_grace: env_millis("WRITE_GRACE_MS", 10_000),
            settle_delay: env_millis("WRITE_SETTLE_MS", 800),
        };

        let retry_policy = RetryPolicy {
            max_attempts: env::var("REMOTE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            base_delay: env_millis("REMOTE_BASE_DELAY_MS", 1_000),
        };

        let conflict_retries: u32 = env::var("CONFLICT_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        Self {
            github_token: env_non_empty("GITHUB_TOKEN"),
            github_owner: env_non_empty("GITHUB_USER"),
            github_repo: env_non_empty("GITHUB_REPO"),
            api_url: env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            data_file: env_non_empty("DATA_FILE").unwrap_or_else(|| "data.json".to_string()),
            license_file: env_non_empty("LICENSE_FILE")
                .unwrap_or_else(|| "License.json".to_string()),
            production,
            cache_policy,
            retry_policy,
            conflict_retries,
            bootstrap_admin_email: env_non_empty("BOOTSTRAP_ADMIN_EMAIL"),
            bootstrap_admin_password: env_non_empty("BOOTSTRAP_ADMIN_PASSWORD"),
        }
    }

    /// Names of required settings that are not set.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.github_token.is_none() {
            missing.push("GITHUB_TOKEN");
        }
        if self.github_owner.is_none() {
            missing.push("GITHUB_USER");
        }
        if self.github_repo.is_none() {
            missing.push("GITHUB_REPO");
        }
        missing
    }

    /// Check the repository settings.
    ///
    /// Missing settings are a warning in development and a hard failure in
    /// production.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_settings();
        if missing.is_empty() {
            tracing::info!(
                owner = self.github_owner.as_deref().unwrap_or_default(),
                repo = self.github_repo.as_deref().unwrap_or_default(),
                data_file = %self.data_file,
                license_file = %self.license_file,
                "Repository storage configured"
            );
            return Ok(());
        }

        let joined = missing.join(", ");
        if self.production {
            return Err(AppError::Config(format!(
                "Required repository settings missing: {}",
                joined
            )));
        }
        tracing::warn!(missing = %joined, "Missing repository settings");
        Ok(())
    }

    /// `owner/repo`, for log lines.
    pub fn repository(&self) -> String {
        format!(
            "{}/{}",
            self.github_owner.as_deref().unwrap_or("?"),
            self.github_repo.as_deref().unwrap_or("?")
        )
    }
}
