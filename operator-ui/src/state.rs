//! Shared application state for the observer server.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use operator::core::machine::{Snapshot, TransitionError};
use operator::io::config::StateConfig;
use operator::io::context_store::load_context;
use operator::session_loop::{Clients, Orchestrator, StartOutcome};
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs kept in memory before the oldest finished ones are dropped.
pub const DEFAULT_MAX_RUNS: usize = 100;

/// A run is over once it is terminal and its session has been released.
pub fn is_final(snapshot: &Snapshot) -> bool {
    snapshot.phase.is_terminal() && !snapshot.session_active()
}

/// A run started through the API.
#[derive(Clone)]
pub struct RunHandle {
    /// Latest snapshot; keeps the final value after the run task ends.
    pub snapshots: watch::Receiver<Snapshot>,
    pub cancel: CancellationToken,
}

impl RunHandle {
    pub fn is_finished(&self) -> bool {
        is_final(&self.snapshots.borrow())
    }
}

/// Runs in start order, bounded by `capacity` finished runs.
struct RunRegistry {
    runs: HashMap<String, RunHandle>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RunRegistry {
    fn new(capacity: usize) -> Self {
        Self {
            runs: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn insert(&mut self, run_id: String, handle: RunHandle) {
        self.order.push_back(run_id.clone());
        self.runs.insert(run_id, handle);
        self.evict();
    }

    /// Drop the oldest finished runs while over capacity. Live runs are kept.
    fn evict(&mut self) {
        while self.runs.len() > self.capacity {
            let runs = &self.runs;
            let Some(index) = self
                .order
                .iter()
                .position(|id| runs.get(id).is_some_and(RunHandle::is_finished))
            else {
                break;
            };
            if let Some(run_id) = self.order.remove(index) {
                debug!(run_id = %run_id, "evicting finished run");
                self.runs.remove(&run_id);
            }
        }
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    clients: Clients,
    paths: StateConfig,
    runs: Arc<RwLock<RunRegistry>>,
}

impl AppState {
    pub fn new(clients: Clients, paths: StateConfig) -> Self {
        Self {
            clients,
            paths,
            runs: Arc::new(RwLock::new(RunRegistry::new(DEFAULT_MAX_RUNS))),
        }
    }

    /// Keep at most `max_runs` runs once they have finished.
    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.runs = Arc::new(RwLock::new(RunRegistry::new(max_runs)));
        self
    }

    /// Start `goal` in a background task and return its run id.
    ///
    /// Blank goals are rejected before anything is spawned.
    pub async fn start_run(&self, goal: String, fresh: bool) -> Result<String, TransitionError> {
        if goal.trim().is_empty() {
            return Err(TransitionError::EmptyGoal);
        }
        let reuse = if fresh {
            None
        } else {
            match load_context(&self.paths.context_path) {
                Ok(state) => state.map(|state| state.context_id),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "ignoring unreadable context");
                    None
                }
            }
        };

        let mut orchestrator = Orchestrator::new(self.clients.clone()).with_context_id(reuse);
        let run_id = orchestrator.run_id().to_string();
        let handle = RunHandle {
            snapshots: orchestrator.subscribe(),
            cancel: orchestrator.cancel_token(),
        };
        self.runs.write().await.insert(run_id.clone(), handle);

        let paths = self.paths.clone();
        tokio::spawn(async move {
            match orchestrator.start(&goal).await {
                Ok(StartOutcome::Completed(outcome)) => {
                    info!(run_id = %outcome.run_id, phase = ?outcome.phase, "run ended");
                    if let Err(err) = outcome.persist_context(&paths.context_path) {
                        warn!(error = %format!("{err:#}"), "failed to persist context id");
                    }
                    if let Err(err) = outcome.write_transcript(&paths.runs_dir) {
                        warn!(error = %format!("{err:#}"), "failed to write transcript");
                    }
                }
                Ok(StartOutcome::Ignored { phase }) => {
                    warn!(?phase, "run was already started");
                }
                Err(err) => warn!(error = %err, "run rejected"),
            }
        });

        Ok(run_id)
    }

    pub async fn run(&self, run_id: &str) -> Option<RunHandle> {
        self.runs.read().await.runs.get(run_id).cloned()
    }

    /// Run ids with their latest snapshots, oldest first.
    pub async fn list_runs(&self) -> Vec<(String, Snapshot)> {
        let registry = self.runs.read().await;
        registry
            .order
            .iter()
            .filter_map(|id| {
                let handle = registry.runs.get(id)?;
                Some((id.clone(), handle.snapshots.borrow().clone()))
            })
            .collect()
    }
}
