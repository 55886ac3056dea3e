//! JSON-over-HTTP transport shared by the session, planner and executor clients.

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::OperatorError;
use crate::io::config::OperatorConfig;
use crate::io::retry::RetryPolicy;

const MAX_ERROR_BODY: usize = 512;

/// Transport-level failure of one API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// `sent` is false only when the request never left the client.
    #[error("request to {path} failed: {message}")]
    Transport {
        path: String,
        message: String,
        sent: bool,
    },
    #[error("{path} returned HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    #[error("{path} returned an undecodable body: {message}")]
    Decode { path: String, message: String },
    /// The service answered `success: false`.
    #[error("{path} rejected the request: {message}")]
    Rejected { path: String, message: String },
}

impl ApiError {
    /// Transport failures, rate limits and server errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } | Self::Rejected { .. } => false,
        }
    }

    /// Narrower than [`ApiError::is_retryable`]: the service cannot have acted on the request.
    ///
    /// Timeouts and dropped connections after sending are excluded.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            Self::Transport { sent, .. } => !sent,
            Self::Status { status, .. } => *status == 429 || *status == 503,
            Self::Decode { .. } | Self::Rejected { .. } => false,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Map into the calling operation's error kind; undecodable bodies are malformed.
    pub fn into_operator(self, kind: fn(String) -> OperatorError) -> OperatorError {
        if self.is_decode() {
            OperatorError::MalformedResponse(self.to_string())
        } else {
            kind(self.to_string())
        }
    }
}

/// Thin wrapper around `reqwest::Client` bound to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            retry,
        }
    }

    /// Build a client with the configured timeout and retry policy.
    pub fn from_config(cfg: &OperatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.api.request_timeout())
            .user_agent(concat!("operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self::new(
            http,
            cfg.api.base_url.trim(),
            RetryPolicy::from(&cfg.retry),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `body` as JSON and decode the JSON response, retrying per policy.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_retrying(method, path, body, ApiError::is_retryable).await
    }

    /// Like [`ApiClient::send_json`] for calls with side effects on the service.
    ///
    /// Only failures the service cannot have acted on are retried.
    pub async fn send_json_non_idempotent<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_retrying(method, path, body, ApiError::is_safe_to_resend).await
    }

    async fn send_retrying<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        retryable: fn(&ApiError) -> bool,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let what = format!("{method} {path}");
        let method = &method;
        self.retry
            .run_if(&what, retryable, move || self.send_once(method.clone(), path, body))
            .await
    }

    #[instrument(skip_all, fields(%method, path))]
    async fn send_once<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .request(method, &url)
            .json(body)
            .send()
            .await
            .map_err(|err| ApiError::Transport {
                path: path.to_string(),
                message: err.to_string(),
                sent: !(err.is_connect() || err.is_builder()),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| ApiError::Transport {
            path: path.to_string(),
            message: format!("read body: {err}"),
            sent: true,
        })?;
        debug!(status = status.as_u16(), bytes = text.len(), "response received");

        if !status.is_success() {
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }
        serde_json::from_str(&text).map_err(|err| ApiError::Decode {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated {} bytes]", &text[..end], text.len() - end)
}
