//! Step executor client: runs one planned step against the live session.

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use crate::core::types::{ExecOutcome, Session, Step};
use crate::error::OperatorError;
use crate::io::api::ApiClient;
use crate::io::planner::AGENT_PATH;
use crate::io::wire::{AgentRequest, ExecuteResponse, rejection_message};

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute `step`. Never called for CLOSE steps.
    async fn execute(&self, session: &Session, step: &Step) -> Result<ExecOutcome, OperatorError>;
}

#[derive(Debug, Clone)]
pub struct HttpStepExecutor {
    api: ApiClient,
}

impl HttpStepExecutor {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for HttpStepExecutor {
    #[instrument(
        skip_all,
        fields(session_id = %session.session_id, step = step.step_number, tool = %step.tool)
    )]
    async fn execute(&self, session: &Session, step: &Step) -> Result<ExecOutcome, OperatorError> {
        let response: ExecuteResponse = self
            .api
            .send_json_non_idempotent(
                Method::POST,
                AGENT_PATH,
                &AgentRequest::ExecuteStep {
                    session_id: &session.session_id,
                    step,
                },
            )
            .await
            .map_err(|err| err.into_operator(OperatorError::ExecutionFailed))?;

        if !response.success {
            return Err(OperatorError::ExecutionFailed(rejection_message(
                response.error,
                "step execution failed",
            )));
        }
        debug!(done = response.done, "step executed");
        Ok(ExecOutcome {
            done: response.done,
        })
    }
}
