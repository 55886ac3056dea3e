//! Async driver for the orchestration state machine.
//!
//! [`Orchestrator`] owns one [`OrchestrationState`] for one goal. It performs the
//! effect returned by each transition (open, plan, execute, close), feeds the
//! result back in as the next event, and publishes a [`Snapshot`] after every
//! transition. Exactly one client call is in flight at a time.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::invariants::validate_history;
use crate::core::machine::{Effect, Event, OrchestrationState, Snapshot, TransitionError};
use crate::core::types::{DisplayState, NextStep, Phase, Session, Step};
use crate::error::Failure;
use crate::io::api::ApiClient;
use crate::io::config::OperatorConfig;
use crate::io::context_store::{ContextState, write_context};
use crate::io::executor::{HttpStepExecutor, StepExecutor};
use crate::io::gateway::{HttpSessionGateway, SessionGateway};
use crate::io::planner::{HttpStepPlanner, StepPlanner};
use crate::io::transcript::{RunMeta, TranscriptPaths, new_run_id, write_transcript};

/// The three remote collaborators of a run.
#[derive(Clone)]
pub struct Clients {
    pub gateway: Arc<dyn SessionGateway>,
    pub planner: Arc<dyn StepPlanner>,
    pub executor: Arc<dyn StepExecutor>,
}

impl Clients {
    /// HTTP clients sharing one connection pool.
    pub fn http(cfg: &OperatorConfig) -> Result<Self> {
        let api = ApiClient::from_config(cfg)?;
        Ok(Self {
            gateway: Arc::new(HttpSessionGateway::from_config(api.clone(), &cfg.session)),
            planner: Arc::new(HttpStepPlanner::new(api.clone())),
            executor: Arc::new(HttpStepExecutor::new(api)),
        })
    }
}

/// Result of [`Orchestrator::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The run went from `Idle` to a terminal phase.
    Completed(RunOutcome),
    /// The orchestrator had already left `Idle`; nothing was done.
    Ignored { phase: Phase },
}

/// Terminal summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub goal: String,
    pub phase: Phase,
    pub steps: Vec<Step>,
    /// The session that was opened, if any. Already closed when this is returned.
    pub session: Option<Session>,
    pub failure: Option<Failure>,
    /// Step numbers handed to the executor, in call order.
    pub executed: Vec<u32>,
    pub display: DisplayState,
    pub status: String,
    /// History invariants broken by this run; empty for a well-behaved run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    #[serde(skip)]
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    pub ended_at: DateTime<Utc>,
}

impl RunOutcome {
    /// Write `meta.json` and `steps.json` under `<runs_dir>/<run_id>/`.
    pub fn write_transcript(&self, runs_dir: &Path) -> Result<TranscriptPaths> {
        let meta = RunMeta {
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            phase: self.phase,
            failure: self.failure.clone(),
            step_count: self.steps.len(),
            ..RunMeta::new(&self.run_id, &self.goal, self.started_at, self.ended_at)
        };
        write_transcript(runs_dir, &meta, &self.steps)
    }

    /// Store the opened session's context id for the next run, if a session was opened.
    pub fn persist_context(&self, path: &Path) -> Result<()> {
        match &self.session {
            Some(session) => write_context(path, &ContextState::now(&session.context_id)),
            None => Ok(()),
        }
    }
}

type StepHook = Box<dyn FnMut(&Step) + Send + Sync>;

pub struct Orchestrator {
    run_id: String,
    started_at: DateTime<Utc>,
    clients: Clients,
    state: OrchestrationState,
    snapshots: watch::Sender<Snapshot>,
    cancel: CancellationToken,
    reuse_context_id: Option<String>,
    on_step: Option<StepHook>,
    opened: Option<Session>,
    executed: Vec<u32>,
}

impl Orchestrator {
    pub fn new(clients: Clients) -> Self {
        let state = OrchestrationState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        let started_at = Utc::now();
        Self {
            run_id: new_run_id(started_at),
            started_at,
            clients,
            state,
            snapshots,
            cancel: CancellationToken::new(),
            reuse_context_id: None,
            on_step: None,
            opened: None,
            executed: Vec::new(),
        }
    }

    /// Ask the gateway to continue a previous provider context.
    pub fn with_context_id(mut self, context_id: Option<String>) -> Self {
        self.reuse_context_id = context_id;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Called once for every appended step, before it is executed.
    pub fn on_step(mut self, hook: impl FnMut(&Step) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Box::new(hook));
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Token that requests a cooperative stop of the run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver holding the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn state(&self) -> &OrchestrationState {
        &self.state
    }

    /// Run `goal` to a terminal phase.
    ///
    /// A no-op unless the orchestrator is `Idle`. Blank goals are rejected
    /// before any session is opened.
    #[instrument(skip_all, fields(goal_len = goal.len()))]
    pub async fn start(&mut self, goal: &str) -> Result<StartOutcome, TransitionError> {
        let effect = match self.apply(Event::Start {
            goal: goal.to_string(),
        }) {
            Ok(effect) => effect,
            Err(TransitionError::AlreadyStarted(phase)) => {
                debug!(?phase, "start ignored");
                return Ok(StartOutcome::Ignored { phase });
            }
            Err(err) => return Err(err),
        };
        self.started_at = Utc::now();
        self.drive(goal, effect).await?;
        let violations = self.check_invariants();
        Ok(StartOutcome::Completed(self.outcome(violations)))
    }

    async fn drive(&mut self, goal: &str, mut effect: Effect) -> Result<(), TransitionError> {
        loop {
            if dispatches_work(&effect) && self.cancel.is_cancelled() {
                info!(phase = ?self.state.phase(), "cancellation requested");
                effect = self.apply(Event::Cancelled)?;
                continue;
            }
            let event = match effect {
                Effect::Halt => return Ok(()),
                Effect::OpenSession => {
                    let result = self
                        .clients
                        .gateway
                        .open(goal, self.reuse_context_id.as_deref())
                        .await;
                    if let Ok(session) = &result {
                        self.opened = Some(session.clone());
                    }
                    Event::SessionOpened(result)
                }
                Effect::PlanFirst => {
                    let session = self.session()?;
                    let result = self.clients.planner.plan_first(goal, &session).await;
                    Event::Planned(result.map(|step| NextStep { step, done: false }))
                }
                Effect::PlanNext => {
                    let session = self.session()?;
                    let result = self
                        .clients
                        .planner
                        .plan_next(goal, &session, self.state.steps())
                        .await;
                    Event::Planned(result)
                }
                Effect::Execute(step) => {
                    let session = self.session()?;
                    self.executed.push(step.step_number);
                    Event::Executed(self.clients.executor.execute(&session, &step).await)
                }
                Effect::CloseSession => {
                    let session = self.session()?;
                    let result = self.clients.gateway.close(&session).await;
                    if let Err(err) = &result {
                        warn!(
                            session_id = %session.session_id,
                            error = %err,
                            "session close failed"
                        );
                    }
                    Event::SessionClosed(result)
                }
            };
            effect = self.apply(event)?;
        }
    }

    fn apply(&mut self, event: Event) -> Result<Effect, TransitionError> {
        let from = self.state.phase();
        let appended_before = self.state.steps().len();
        let effect = self.state.apply(event)?;
        let to = self.state.phase();
        if from != to {
            info!(?from, ?to, "phase transition");
        }
        if self.state.steps().len() > appended_before {
            if let (Some(hook), Some(step)) = (self.on_step.as_mut(), self.state.history().last()) {
                hook(step);
            }
        }
        if let Some(failure) = self.state.failure().filter(|_| from != to && to == Phase::Failed) {
            warn!(kind = failure.kind.as_str(), message = %failure.message, "run failed");
        }
        self.snapshots.send_replace(self.state.snapshot());
        Ok(effect)
    }

    fn session(&self) -> Result<Session, TransitionError> {
        self.state
            .session()
            .cloned()
            .ok_or(TransitionError::NoSession(self.state.phase()))
    }

    fn check_invariants(&self) -> Vec<String> {
        let violations = validate_history(self.state.phase(), self.state.steps(), &self.executed);
        for violation in &violations {
            warn!(%violation, "history invariant violated");
        }
        violations
    }

    fn outcome(&self, violations: Vec<String>) -> RunOutcome {
        let snapshot = self.state.snapshot();
        RunOutcome {
            run_id: self.run_id.clone(),
            goal: snapshot.goal.unwrap_or_default(),
            phase: snapshot.phase,
            steps: snapshot.steps,
            session: self.opened.clone(),
            failure: snapshot.failure,
            executed: self.executed.clone(),
            display: snapshot.display,
            status: snapshot.status,
            violations,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }
}

/// Effects that issue a planner, executor or open call; cancellation is checked first.
fn dispatches_work(effect: &Effect) -> bool {
    matches!(
        effect,
        Effect::OpenSession | Effect::PlanFirst | Effect::PlanNext | Effect::Execute(_)
    )
}
