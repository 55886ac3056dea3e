//! JSON bodies exchanged with `/api/session` and `/api/agent`.
//!
//! Responses are decoded leniently (every field optional) and then checked
//! field by field, so a missing value surfaces as a malformed response rather
//! than an opaque decode failure.

use serde::{Deserialize, Serialize};

use crate::core::types::{PlannedStep, Step, Tool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest<'a> {
    pub timezone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionRequest<'a> {
    pub session_id: &'a str,
}

/// Body of `POST /api/agent`; `action` selects the operation server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRequest<'a> {
    #[serde(rename_all = "camelCase")]
    Start { goal: &'a str, session_id: &'a str },
    #[serde(rename_all = "camelCase")]
    GetNextStep {
        goal: &'a str,
        session_id: &'a str,
        previous_steps: &'a [Step],
    },
    #[serde(rename_all = "camelCase")]
    ExecuteStep { session_id: &'a str, step: &'a Step },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    #[serde(default)]
    pub success: bool,
    pub session_id: Option<String>,
    pub session_url: Option<String>,
    pub context_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub success: bool,
    pub result: Option<PlanResult>,
    #[serde(default)]
    pub done: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reasoning: String,
    pub tool: Option<String>,
    #[serde(default)]
    pub instruction: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub done: bool,
    pub error: Option<String>,
}

/// Why a `success: true` response still cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("missing field '{0}'")]
    Missing(&'static str),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

impl PlanResult {
    pub fn into_planned(self) -> Result<PlannedStep, ShapeError> {
        let raw = self.tool.ok_or(ShapeError::Missing("result.tool"))?;
        let tool: Tool = raw.parse().map_err(|_| ShapeError::UnknownTool(raw))?;
        Ok(PlannedStep {
            text: self.text,
            reasoning: self.reasoning,
            tool,
            instruction: self.instruction,
        })
    }
}

/// Message for a `success: false` response.
pub fn rejection_message(error: Option<String>, fallback: &str) -> String {
    error
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
