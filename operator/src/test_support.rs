//! Test-only builders and scripted clients for driving the loop without a network.
//!
//! Each scripted client pops pre-recorded results from a queue and records every
//! call it receives. An exhausted queue is answered with an error so a test that
//! under-scripts fails loudly instead of hanging.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::types::{ExecOutcome, NextStep, PlannedStep, Session, Step, Tool};
use crate::error::OperatorError;
use crate::io::executor::StepExecutor;
use crate::io::gateway::SessionGateway;
use crate::io::planner::StepPlanner;
use crate::session_loop::Clients;

/// Deterministic planned step for `tool`.
pub fn planned(tool: Tool) -> PlannedStep {
    PlannedStep {
        text: format!("{tool} step"),
        reasoning: format!("{tool} reasoning"),
        tool,
        instruction: format!("{tool} instruction"),
    }
}

/// Planner answer wrapping [`planned`].
pub fn next(tool: Tool, done: bool) -> NextStep {
    NextStep {
        step: planned(tool),
        done,
    }
}

/// Numbered history entry for `tool`.
pub fn step(step_number: u32, tool: Tool) -> Step {
    Step::numbered(step_number, planned(tool))
}

pub fn session(session_id: &str) -> Session {
    Session {
        session_id: session_id.to_string(),
        session_url: format!("https://viewer.example/{session_id}"),
        context_id: format!("ctx-{session_id}"),
    }
}

/// Cancels `token` when the client receives its `call`-th request (1-based).
#[derive(Debug, Clone)]
struct CancelOnCall {
    call: usize,
    token: CancellationToken,
}

impl CancelOnCall {
    fn check(slot: &Mutex<Option<CancelOnCall>>, calls: usize) {
        let guard = slot.lock().expect("cancel lock");
        if let Some(trigger) = guard.as_ref().filter(|t| t.call == calls) {
            trigger.token.cancel();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCall {
    pub goal: String,
    pub reuse_context_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedGateway {
    opens: Mutex<VecDeque<Result<Session, OperatorError>>>,
    close_result: Mutex<Option<OperatorError>>,
    open_calls: Mutex<Vec<OpenCall>>,
    close_calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opening(self, result: Result<Session, OperatorError>) -> Self {
        self.opens.lock().expect("opens lock").push_back(result);
        self
    }

    /// Make every `close` fail with `err`.
    pub fn failing_close(self, err: OperatorError) -> Self {
        *self.close_result.lock().expect("close lock") = Some(err);
        self
    }

    pub fn open_calls(&self) -> Vec<OpenCall> {
        self.open_calls.lock().expect("open calls lock").clone()
    }

    /// Session ids passed to `close`, in order.
    pub fn close_calls(&self) -> Vec<String> {
        self.close_calls.lock().expect("close calls lock").clone()
    }
}

#[async_trait]
impl SessionGateway for ScriptedGateway {
    async fn open(
        &self,
        goal: &str,
        reuse_context_id: Option<&str>,
    ) -> Result<Session, OperatorError> {
        self.open_calls
            .lock()
            .expect("open calls lock")
            .push(OpenCall {
                goal: goal.to_string(),
                reuse_context_id: reuse_context_id.map(str::to_string),
            });
        self.opens
            .lock()
            .expect("opens lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(OperatorError::SessionCreationFailed(
                    "script exhausted".to_string(),
                ))
            })
    }

    async fn close(&self, session: &Session) -> Result<(), OperatorError> {
        self.close_calls
            .lock()
            .expect("close calls lock")
            .push(session.session_id.clone());
        match self.close_result.lock().expect("close lock").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A planner call as seen by [`ScriptedPlanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanCall {
    First,
    Next { history: Vec<u32> },
}

#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    first: Mutex<VecDeque<Result<PlannedStep, OperatorError>>>,
    next: Mutex<VecDeque<Result<NextStep, OperatorError>>>,
    calls: Mutex<Vec<PlanCall>>,
    cancel: Mutex<Option<CancelOnCall>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(self, result: Result<PlannedStep, OperatorError>) -> Self {
        self.first.lock().expect("first lock").push_back(result);
        self
    }

    pub fn then(self, result: Result<NextStep, OperatorError>) -> Self {
        self.next.lock().expect("next lock").push_back(result);
        self
    }

    /// Simulate a user cancel arriving while call number `call` is in flight.
    pub fn cancelling_on(self, call: usize, token: CancellationToken) -> Self {
        *self.cancel.lock().expect("cancel lock") = Some(CancelOnCall { call, token });
        self
    }

    pub fn calls(&self) -> Vec<PlanCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: PlanCall) {
        let mut calls = self.calls.lock().expect("calls lock");
        calls.push(call);
        CancelOnCall::check(&self.cancel, calls.len());
    }
}

#[async_trait]
impl StepPlanner for ScriptedPlanner {
    async fn plan_first(
        &self,
        _goal: &str,
        _session: &Session,
    ) -> Result<PlannedStep, OperatorError> {
        self.record(PlanCall::First);
        self.first
            .lock()
            .expect("first lock")
            .pop_front()
            .unwrap_or_else(|| Err(OperatorError::PlanningFailed("script exhausted".to_string())))
    }

    async fn plan_next(
        &self,
        _goal: &str,
        _session: &Session,
        history: &[Step],
    ) -> Result<NextStep, OperatorError> {
        self.record(PlanCall::Next {
            history: history.iter().map(|step| step.step_number).collect(),
        });
        self.next
            .lock()
            .expect("next lock")
            .pop_front()
            .unwrap_or_else(|| Err(OperatorError::PlanningFailed("script exhausted".to_string())))
    }
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<ExecOutcome, OperatorError>>>,
    executed: Mutex<Vec<Step>>,
    cancel: Mutex<Option<CancelOnCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(self, result: Result<ExecOutcome, OperatorError>) -> Self {
        self.results.lock().expect("results lock").push_back(result);
        self
    }

    pub fn cancelling_on(self, call: usize, token: CancellationToken) -> Self {
        *self.cancel.lock().expect("cancel lock") = Some(CancelOnCall { call, token });
        self
    }

    /// Steps received by `execute`, in call order.
    pub fn executed(&self) -> Vec<Step> {
        self.executed.lock().expect("executed lock").clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, _session: &Session, step: &Step) -> Result<ExecOutcome, OperatorError> {
        let calls = {
            let mut executed = self.executed.lock().expect("executed lock");
            executed.push(step.clone());
            executed.len()
        };
        CancelOnCall::check(&self.cancel, calls);
        self.results
            .lock()
            .expect("results lock")
            .pop_front()
            .unwrap_or_else(|| Err(OperatorError::ExecutionFailed("script exhausted".to_string())))
    }
}

/// Scripted clients plus handles for inspecting their recorded calls.
pub struct Scripted {
    pub gateway: Arc<ScriptedGateway>,
    pub planner: Arc<ScriptedPlanner>,
    pub executor: Arc<ScriptedExecutor>,
}

impl Scripted {
    pub fn new(
        gateway: ScriptedGateway,
        planner: ScriptedPlanner,
        executor: ScriptedExecutor,
    ) -> Self {
        Self {
            gateway: Arc::new(gateway),
            planner: Arc::new(planner),
            executor: Arc::new(executor),
        }
    }

    pub fn clients(&self) -> Clients {
        Clients {
            gateway: self.gateway.clone(),
            planner: self.planner.clone(),
            executor: self.executor.clone(),
        }
    }
}
