use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteObject, RemoteStore, RetryPolicy, WriteReceipt};
use crate::config::Config;
use crate::error::{AppError, Result};

const USER_AGENT: &str = concat!("authstore/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Contents API response for a single file.
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    #[serde(default)]
    content: Option<PutContentsFile>,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// One file in a repository, accessed through the hosting provider's
/// contents API.
#[derive(Debug, Clone)]
pub struct GitHubContents {
    client: Client,
    url: String,
    token: String,
    retry: RetryPolicy,
}

/// Percent-encode each segment of a repository path, keeping the separators.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse a `Retry-After` header given in seconds.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Pull the `message` field out of an API error body, falling back to the raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());
    if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {} - {}", status, message)
    }
}

impl GitHubContents {
    pub fn new(
        client: Client,
        api_url: &str,
        owner: &str,
        repo: &str,
        path: &str,
        token: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            api_url.trim_end_matches('/'),
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            encode_path(path)
        );
        Self {
            client,
            url,
            token: token.into(),
            retry,
        }
    }

    /// Build a client for `path` from the repository settings in `config`.
    pub fn from_config(config: &Config, client: Client, path: &str) -> Result<Self> {
        let missing = config.missing_settings();
        let (Some(token), Some(owner), Some(repo)) = (
            config.github_token.as_deref(),
            config.github_owner.as_deref(),
            config.github_repo.as_deref(),
        ) else {
            return Err(AppError::Config(format!(
                "Cannot reach repository storage, missing: {}",
                missing.join(", ")
            )));
        };
        Ok(Self::new(
            client,
            &config.api_url,
            owner,
            repo,
            path,
            token,
            config.retry_policy,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
    }

    /// Send a request, retrying rate limits, server errors and network
    /// failures according to the retry policy.
    ///
    /// Any other response, successful or not, is returned to the caller.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;
            match build().send().await {
                Ok(response) if is_transient(response.status()) => {
                    let status = response.status();
                    let hint = retry_after(&response);
                    let body = response.text().await.unwrap_or_default();
                    last_error = error_message(status, &body);
                    if is_last {
                        break;
                    }
                    let wait = self.retry.delay_for(attempt, hint);
                    tracing::warn!(
                        status = %status,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        wait_ms = wait.as_millis() as u64,
                        url = %self.url,
                        "Remote store rate limited or failing, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = e.to_string();
                    if is_last {
                        break;
                    }
                    let wait = self.retry.delay_for(attempt, None);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        wait_ms = wait.as_millis() as u64,
                        url = %self.url,
                        "Remote store request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        tracing::error!(url = %self.url, error = %last_error, "Remote store retries exhausted");
        Err(AppError::Transient(format!(
            "{} failed after {} attempts: {}",
            self.url, attempts, last_error
        )))
    }

    async fn fetch_raw(&self, download_url: &str) -> Result<Vec<u8>> {
        let response = self
            .send_with_retry(|| self.authorized(self.client.get(download_url)))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Remote(format!(
                "Failed to fetch raw content: {}",
                error_message(status, &body)
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl RemoteStore for GitHubContents {
    async fn fetch(&self) -> Result<Option<RemoteObject>> {
        let response = self
            .send_with_retry(|| self.authorized(self.client.get(&self.url)))
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(url = %self.url, "Remote document does not exist yet");
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Unauthorized(error_message(status, &body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Remote(error_message(status, &body)));
        }

        let file: ContentsResponse = response.json().await?;

        // Files over 1 MB come back without inline content.
        let bytes = match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(content)) => {
                let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD.decode(cleaned)?
            }
            _ => match file.download_url.as_deref() {
                Some(download_url) => self.fetch_raw(download_url).await?,
                None => {
                    return Err(AppError::Remote(format!(
                        "No content available for {}",
                        self.url
                    )));
                }
            },
        };

        Ok(Some(RemoteObject {
            bytes,
            sha: file.sha,
        }))
    }

    async fn write(
        &self,
        bytes: &[u8],
        expected_sha: Option<&str>,
        message: &str,
    ) -> Result<WriteReceipt> {
        let request = PutContentsRequest {
            message,
            content: STANDARD.encode(bytes),
            sha: expected_sha,
        };

        let response = self
            .send_with_retry(|| self.authorized(self.client.put(&self.url)).json(&request))
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let body: PutContentsResponse = response.json().await?;
            return Ok(WriteReceipt {
                sha: body.content.map(|c| c.sha),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        match status {
            StatusCode::CONFLICT => Err(AppError::Conflict(message)),
            // Also returned when the file exists but no sha was supplied.
            StatusCode::UNPROCESSABLE_ENTITY if body.contains("sha") => {
                Err(AppError::Conflict(message))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AppError::Unauthorized(message))
            }
            _ => Err(AppError::Remote(message)),
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
