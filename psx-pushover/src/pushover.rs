//! Pushover messages API client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NotifyError;
use crate::notifier::NotificationSink;

pub const DEFAULT_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// HTTP request timeout; the only bound on a hung request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PushoverConfig {
    pub api_url: String,
    /// Application API token (`token` form field)
    pub app_token: String,
    /// Recipient user key (`user` form field)
    pub user_key: String,
    pub timeout: Duration,
}

impl PushoverConfig {
    pub fn new(app_token: impl Into<String>, user_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_token: app_token.into(),
            user_key: user_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct MessageForm<'a> {
    token: &'a str,
    user: &'a str,
    message: &'a str,
}

/// Error body returned with 4xx responses.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

pub struct PushoverClient {
    config: PushoverConfig,
    http: reqwest::Client,
}

impl PushoverClient {
    pub fn new(config: PushoverConfig) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &PushoverConfig {
        &self.config
    }
}

impl NotificationSink for PushoverClient {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let form = MessageForm {
            token: &self.config.app_token,
            user: &self.config.user_key,
            message: text,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "pushover accepted message");
            return Ok(());
        }

        // The body is best-effort; fall back to the status line when it is unusable.
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            reason: rejection_reason(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string()),
        })
    }
}

fn rejection_reason(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    if parsed.errors.is_empty() {
        None
    } else {
        Some(parsed.errors.join("; "))
    }
}
