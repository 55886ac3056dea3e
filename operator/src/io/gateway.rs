//! Session gateway: opens and closes remote browser sessions.

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info, instrument, warn};

use crate::core::types::Session;
use crate::error::OperatorError;
use crate::io::api::ApiClient;
use crate::io::config::SessionConfig;
use crate::io::wire::{
    AckResponse, CloseSessionRequest, OpenSessionRequest, OpenSessionResponse, rejection_message,
};

const SESSION_PATH: &str = "/api/session";

/// Abstraction over the browser-session provider.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Open a session, optionally continuing a previous provider context.
    async fn open(
        &self,
        goal: &str,
        reuse_context_id: Option<&str>,
    ) -> Result<Session, OperatorError>;

    /// Close a session. Best effort: callers log failures and move on.
    async fn close(&self, session: &Session) -> Result<(), OperatorError>;
}

/// Prefix substitution applied to viewer URLs returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRewrite {
    from: String,
    to: String,
}

impl ViewerRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::new("", "")
    }

    pub fn apply(&self, url: &str) -> String {
        if self.from.is_empty() {
            return url.to_string();
        }
        url.replacen(&self.from, &self.to, 1)
    }
}

impl From<&SessionConfig> for ViewerRewrite {
    fn from(cfg: &SessionConfig) -> Self {
        Self::new(&cfg.viewer_rewrite_from, &cfg.viewer_rewrite_to)
    }
}

/// Gateway talking to `/api/session`.
#[derive(Debug, Clone)]
pub struct HttpSessionGateway {
    api: ApiClient,
    timezone: String,
    rewrite: ViewerRewrite,
}

impl HttpSessionGateway {
    pub fn new(api: ApiClient, timezone: impl Into<String>, rewrite: ViewerRewrite) -> Self {
        Self {
            api,
            timezone: timezone.into(),
            rewrite,
        }
    }

    pub fn from_config(api: ApiClient, cfg: &SessionConfig) -> Self {
        Self::new(api, cfg.resolved_timezone(), ViewerRewrite::from(cfg))
    }
}

#[async_trait]
impl SessionGateway for HttpSessionGateway {
    #[instrument(skip_all, fields(timezone = %self.timezone, reuse = reuse_context_id.is_some()))]
    async fn open(
        &self,
        goal: &str,
        reuse_context_id: Option<&str>,
    ) -> Result<Session, OperatorError> {
        debug!(goal_len = goal.len(), "opening session");
        let response: OpenSessionResponse = self
            .api
            .send_json(
                Method::POST,
                SESSION_PATH,
                &OpenSessionRequest {
                    timezone: &self.timezone,
                    context_id: reuse_context_id,
                },
            )
            .await
            .map_err(|err| err.into_operator(OperatorError::SessionCreationFailed))?;

        if !response.success {
            let message = rejection_message(response.error, "failed to create session");
            warn!(%message, "session creation rejected");
            return Err(OperatorError::SessionCreationFailed(message));
        }

        let missing = |field: &str| {
            OperatorError::MalformedResponse(format!("open session: missing field '{field}'"))
        };
        let session_id = response.session_id.ok_or_else(|| missing("sessionId"))?;
        let session_url = response.session_url.ok_or_else(|| missing("sessionUrl"))?;
        let context_id = response
            .context_id
            .or_else(|| reuse_context_id.map(str::to_string))
            .ok_or_else(|| missing("contextId"))?;

        let session = Session {
            session_id,
            session_url: self.rewrite.apply(&session_url),
            context_id,
        };
        info!(session_id = %session.session_id, "session opened");
        Ok(session)
    }

    #[instrument(skip_all, fields(session_id = %session.session_id))]
    async fn close(&self, session: &Session) -> Result<(), OperatorError> {
        let response: AckResponse = self
            .api
            .send_json(
                Method::DELETE,
                SESSION_PATH,
                &CloseSessionRequest {
                    session_id: &session.session_id,
                },
            )
            .await
            .map_err(|err| err.into_operator(OperatorError::SessionCloseFailed))?;

        if !response.success {
            return Err(OperatorError::SessionCloseFailed(rejection_message(
                response.error,
                "failed to close session",
            )));
        }
        info!("session closed");
        Ok(())
    }
}
