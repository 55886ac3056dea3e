//! Step planner client: asks the planning service for the next action.

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use crate::core::types::{NextStep, PlannedStep, Session, Step};
use crate::error::OperatorError;
use crate::io::api::ApiClient;
use crate::io::wire::{AgentRequest, PlanResponse, rejection_message};

pub(crate) const AGENT_PATH: &str = "/api/agent";

#[async_trait]
pub trait StepPlanner: Send + Sync {
    /// First step for `goal`, planned with an empty history.
    async fn plan_first(&self, goal: &str, session: &Session)
    -> Result<PlannedStep, OperatorError>;

    /// Next step given the full ordered history so far.
    async fn plan_next(
        &self,
        goal: &str,
        session: &Session,
        history: &[Step],
    ) -> Result<NextStep, OperatorError>;
}

#[derive(Debug, Clone)]
pub struct HttpStepPlanner {
    api: ApiClient,
}

impl HttpStepPlanner {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn request(&self, body: &AgentRequest<'_>) -> Result<NextStep, OperatorError> {
        let response: PlanResponse = self
            .api
            .send_json(Method::POST, AGENT_PATH, body)
            .await
            .map_err(|err| err.into_operator(OperatorError::PlanningFailed))?;

        if !response.success {
            return Err(OperatorError::PlanningFailed(rejection_message(
                response.error,
                "planner rejected the request",
            )));
        }
        let result = response.result.ok_or_else(|| {
            OperatorError::MalformedResponse("plan: missing field 'result'".to_string())
        })?;
        let step = result
            .into_planned()
            .map_err(|err| OperatorError::MalformedResponse(format!("plan: {err}")))?;
        debug!(tool = %step.tool, done = response.done, "step planned");
        Ok(NextStep {
            step,
            done: response.done,
        })
    }
}

#[async_trait]
impl StepPlanner for HttpStepPlanner {
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    async fn plan_first(
        &self,
        goal: &str,
        session: &Session,
    ) -> Result<PlannedStep, OperatorError> {
        let next = self
            .request(&AgentRequest::Start {
                goal,
                session_id: &session.session_id,
            })
            .await?;
        Ok(next.step)
    }

    #[instrument(skip_all, fields(session_id = %session.session_id, history = history.len()))]
    async fn plan_next(
        &self,
        goal: &str,
        session: &Session,
        history: &[Step],
    ) -> Result<NextStep, OperatorError> {
        self.request(&AgentRequest::GetNextStep {
            goal,
            session_id: &session.session_id,
            previous_steps: history,
        })
        .await
    }
}
