//! Pure transition function for the orchestration state machine.
//!
//! The driver in [`crate::session_loop`] feeds client results in as
//! [`Event`]s and performs whatever [`Effect`] comes back. Every exit from the
//! loop is a transition into `Finished` or `Failed`; there is no other way out.

use serde::Serialize;

use crate::core::display::{project, status_line};
use crate::core::history::{History, HistoryClosed};
use crate::core::types::{DisplayState, ExecOutcome, NextStep, Phase, Session, Step};
use crate::error::{Failure, OperatorError};

/// Input to [`OrchestrationState::apply`].
#[derive(Debug, Clone)]
pub enum Event {
    Start { goal: String },
    SessionOpened(Result<Session, OperatorError>),
    /// Result of `plan_first` (wrapped with `done = false`) or `plan_next`.
    Planned(Result<NextStep, OperatorError>),
    Executed(Result<ExecOutcome, OperatorError>),
    SessionClosed(Result<(), OperatorError>),
    Cancelled,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::SessionOpened(_) => "session_opened",
            Event::Planned(_) => "planned",
            Event::Executed(_) => "executed",
            Event::SessionClosed(_) => "session_closed",
            Event::Cancelled => "cancelled",
        }
    }
}

/// Next action the driver must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenSession,
    PlanFirst,
    PlanNext,
    Execute(Step),
    CloseSession,
    Halt,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("start rejected: orchestration is already {0:?}")]
    AlreadyStarted(Phase),
    #[error("goal must not be empty")]
    EmptyGoal,
    #[error("event '{event}' is not valid in phase {phase:?}")]
    UnexpectedEvent { phase: Phase, event: &'static str },
    #[error("no open session in phase {0:?}")]
    NoSession(Phase),
    #[error(transparent)]
    HistoryClosed(#[from] HistoryClosed),
}

/// State of one goal invocation. The loop driver is its only writer.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    phase: Phase,
    goal: Option<String>,
    session: Option<Session>,
    history: History,
    failure: Option<Failure>,
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            goal: None,
            session: None,
            history: History::new(),
            failure: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    /// Open session, if any. Cleared once a close has been attempted.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn steps(&self) -> &[Step] {
        self.history.steps()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Which planner call the `Planning` phase needs next.
    fn plan_effect(&self) -> Effect {
        if self.history.is_empty() {
            Effect::PlanFirst
        } else {
            Effect::PlanNext
        }
    }

    fn close_or_halt(&self) -> Effect {
        if self.session.is_some() {
            Effect::CloseSession
        } else {
            Effect::Halt
        }
    }

    fn fail(&mut self, failure: Failure) -> Effect {
        self.phase = Phase::Failed;
        self.failure = Some(failure);
        self.close_or_halt()
    }

    fn finish(&mut self) -> Effect {
        self.phase = Phase::Finished;
        self.close_or_halt()
    }

    /// Apply one event and return the effect to perform next.
    ///
    /// On `Err` the state is left unchanged.
    pub fn apply(&mut self, event: Event) -> Result<Effect, TransitionError> {
        let unexpected = TransitionError::UnexpectedEvent {
            phase: self.phase,
            event: event.name(),
        };
        match (self.phase, event) {
            (Phase::Idle, Event::Start { goal }) => {
                if goal.trim().is_empty() {
                    return Err(TransitionError::EmptyGoal);
                }
                self.goal = Some(goal);
                self.phase = Phase::Initializing;
                Ok(Effect::OpenSession)
            }
            (phase, Event::Start { .. }) => Err(TransitionError::AlreadyStarted(phase)),

            (Phase::Initializing, Event::SessionOpened(Ok(session))) => {
                self.session = Some(session);
                self.phase = Phase::Planning;
                Ok(self.plan_effect())
            }
            (Phase::Initializing, Event::SessionOpened(Err(err))) => {
                Ok(self.fail(Failure::from(&err)))
            }

            (Phase::Planning, Event::Planned(Ok(next))) => {
                let done = next.done;
                let step = self.history.append(next.step)?.clone();
                // CLOSE is recorded but never executed; planner `done` ends the run too.
                if step.is_close() || done {
                    return Ok(self.finish());
                }
                self.phase = Phase::Executing;
                Ok(Effect::Execute(step))
            }
            (Phase::Planning, Event::Planned(Err(err))) => Ok(self.fail(Failure::from(&err))),

            (Phase::Executing, Event::Executed(Ok(outcome))) => {
                if outcome.done {
                    return Ok(self.finish());
                }
                self.phase = Phase::Planning;
                Ok(self.plan_effect())
            }
            (Phase::Executing, Event::Executed(Err(err))) => Ok(self.fail(Failure::from(&err))),

            (Phase::Initializing | Phase::Planning | Phase::Executing, Event::Cancelled) => {
                Ok(self.fail(Failure::cancelled()))
            }
            (Phase::Finished | Phase::Failed, Event::Cancelled) => Ok(Effect::Halt),

            (Phase::Finished | Phase::Failed, Event::SessionClosed(_))
                if self.session.is_some() =>
            {
                // Best effort: the outcome never changes the terminal phase.
                self.session = None;
                Ok(Effect::Halt)
            }

            _ => Err(unexpected),
        }
    }

    /// Immutable view for observers.
    pub fn snapshot(&self) -> Snapshot {
        let session_active = self.session.is_some();
        Snapshot {
            phase: self.phase,
            goal: self.goal.clone(),
            session: self.session.clone(),
            steps: self.history.steps().to_vec(),
            failure: self.failure.clone(),
            display: project(self.phase, self.history.steps(), session_active),
            status: status_line(self.phase, self.history.steps(), self.failure.as_ref()),
        }
    }
}

/// Point-in-time copy of the loop state, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub goal: Option<String>,
    pub session: Option<Session>,
    pub steps: Vec<Step>,
    pub failure: Option<Failure>,
    pub display: DisplayState,
    pub status: String,
}

impl Snapshot {
    pub fn session_active(&self) -> bool {
        self.session.is_some()
    }
}
