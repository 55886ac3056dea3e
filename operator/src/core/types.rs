//! Shared deterministic types for the orchestration core.
//!
//! These types define the contracts between the loop, its clients and its
//! observers. They carry no I/O and serialize to the same field names the
//! remote API uses (`text`, `stepNumber`, `sessionId`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Action kind of a planned step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tool {
    Goto,
    Act,
    Extract,
    Observe,
    Close,
    Wait,
    Navback,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::Goto,
        Tool::Act,
        Tool::Extract,
        Tool::Observe,
        Tool::Close,
        Tool::Wait,
        Tool::Navback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Goto => "GOTO",
            Tool::Act => "ACT",
            Tool::Extract => "EXTRACT",
            Tool::Observe => "OBSERVE",
            Tool::Close => "CLOSE",
            Tool::Wait => "WAIT",
            Tool::Navback => "NAVBACK",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a planner names a tool outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownTool(pub String);

impl FromStr for Tool {
    type Err = UnknownTool;

    /// Exact, case-sensitive match. Unknown values are never defaulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// A step as proposed by the planner, before it is numbered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub text: String,
    pub reasoning: String,
    pub tool: Tool,
    pub instruction: String,
}

/// A numbered, immutable entry of the step history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// 1-indexed position in the history.
    pub step_number: u32,
    pub tool: Tool,
    pub instruction: String,
    pub reasoning: String,
    /// Human-readable summary shown to the user (`text` on the wire).
    #[serde(rename = "text")]
    pub display_text: String,
}

impl Step {
    pub(crate) fn numbered(step_number: u32, planned: PlannedStep) -> Self {
        Self {
            step_number,
            tool: planned.tool,
            instruction: planned.instruction,
            reasoning: planned.reasoning,
            display_text: planned.text,
        }
    }

    pub fn is_close(&self) -> bool {
        self.tool == Tool::Close
    }
}

/// A live remote browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    /// Viewer URL for watching the session live.
    pub session_url: String,
    /// Provider-side reuse token (cookies, storage) to persist across invocations.
    pub context_id: String,
}

/// Planner answer for a follow-up step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextStep {
    pub step: PlannedStep,
    /// Planner considers the goal satisfied, even if `step` is not CLOSE.
    pub done: bool,
}

/// Executor answer for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    /// The goal is satisfied as a result of this execution.
    pub done: bool,
}

/// Lifecycle phase of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Initializing,
    Planning,
    Executing,
    Finished,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Failed)
    }
}

/// User-facing status derived from loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    Idle,
    Thinking,
    Browsing,
    Acting,
    Success,
    Error,
    Loading,
}
