use crate::handler::StepHandler;
use chrono::Utc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use stepcore::{
    GraphSnapshot, ProgressEvent, ProgressSink, RunError, RunId, RunOutcome, StepId,
    StepProgress, START_CATEGORY,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of a run: `Idle -> Ordering -> Running -> {Completed | Aborted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Ordering,
    Running,
    Completed,
    Aborted,
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    /// Computed run order; empty when ordering failed
    pub order: Vec<StepId>,
    /// Handler output of every step that succeeded, keyed by step id
    pub results: HashMap<StepId, serde_json::Value>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome.is_completed()
    }
}

/// Runs a graph snapshot in dependency order, one step at a time
pub struct ExecutionEngine {
    start_category: String,
    phase: watch::Sender<RunPhase>,
}

impl ExecutionEngine {
    pub fn new(start_category: impl Into<String>) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            start_category: start_category.into(),
            phase,
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Compute the run order with Kahn's algorithm.
    ///
    /// The ready queue is seeded with the start-category steps when the
    /// graph has any, otherwise with every step. Only steps without incoming
    /// edges are seeded; a start step with predecessors waits for them.
    /// Steps that never become ready are reported as a cycle.
    pub fn run_order(&self, snapshot: &GraphSnapshot) -> Result<Vec<StepId>, RunError> {
        let graph = build_graph(snapshot);

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut queued = vec![false; graph.node_count()];
        let mut queue = VecDeque::new();

        let has_start_steps = snapshot
            .steps
            .iter()
            .any(|step| step.category == self.start_category);
        // start steps with predecessors are not seeded; they wait like any other step
        let seeds: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .filter(|idx| {
                !has_start_steps || snapshot.steps[idx.index()].category == self.start_category
            })
            .collect();
        for idx in seeds {
            queued[idx.index()] = true;
            queue.push_back(idx);
        }

        let mut order = Vec::with_capacity(graph.node_count());
        while let Some(idx) = queue.pop_front() {
            order.push(graph[idx].clone());

            // petgraph yields neighbours newest edge first
            let mut next: Vec<NodeIndex> = graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            next.reverse();

            for succ in next {
                let degree = &mut in_degree[succ.index()];
                *degree = degree.saturating_sub(1);
                if *degree == 0 && !queued[succ.index()] {
                    queued[succ.index()] = true;
                    queue.push_back(succ);
                }
            }
        }

        if order.len() < snapshot.steps.len() {
            let unscheduled = graph
                .node_indices()
                .filter(|idx| !queued[idx.index()])
                .map(|idx| graph[idx].clone())
                .collect();
            return Err(RunError::Cycle { unscheduled });
        }

        Ok(order)
    }

    /// Run every step of `snapshot` through `handler`.
    ///
    /// Never fails: a cycle, a handler failure or cancellation ends the run
    /// early and is reported through `progress` and the returned outcome.
    pub async fn run(
        &self,
        snapshot: &GraphSnapshot,
        handler: &dyn StepHandler,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();

        self.phase.send_replace(RunPhase::Ordering);
        progress.emit(ProgressEvent::RunStarted {
            run_id,
            total_steps: snapshot.steps.len(),
            timestamp: Utc::now(),
        });
        tracing::info!("Starting run {} ({} steps)", run_id, snapshot.steps.len());

        let order = match self.run_order(snapshot) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!("Run {} aborted before start: {}", run_id, e);
                return self.finish(
                    run_id,
                    start_time,
                    Vec::new(),
                    HashMap::new(),
                    RunOutcome::Aborted(e),
                    progress,
                );
            }
        };

        self.phase.send_replace(RunPhase::Running);
        let mut results = HashMap::new();
        let outcome = match self
            .execute_steps(run_id, snapshot, &order, handler, progress, cancel, &mut results)
            .await
        {
            Ok(()) => RunOutcome::Completed,
            Err(e) => RunOutcome::Aborted(e),
        };

        self.finish(run_id, start_time, order, results, outcome, progress)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_steps(
        &self,
        run_id: RunId,
        snapshot: &GraphSnapshot,
        order: &[StepId],
        handler: &dyn StepHandler,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        results: &mut HashMap<StepId, serde_json::Value>,
    ) -> Result<(), RunError> {
        let emit = |update: StepProgress| {
            progress.emit(ProgressEvent::StepUpdate {
                run_id,
                progress: update,
                timestamp: Utc::now(),
            })
        };

        for step_id in order {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Run {} cancelled with {} step(s) left",
                    run_id,
                    order.len() - results.len()
                );
                return Err(RunError::Cancelled);
            }

            let Some(step) = snapshot.step(step_id) else {
                continue;
            };

            emit(StepProgress::running(&step.id).with_message(format!("Running {}", step.label)));
            let started = Instant::now();

            let failure = match handler.handle(&step.type_id, &step.properties).await {
                Ok(outcome) if outcome.ok => {
                    tracing::info!(
                        "Step {} ({}) completed in {}ms",
                        step.id,
                        step.type_id,
                        started.elapsed().as_millis()
                    );
                    let mut update = StepProgress::ok(&step.id, outcome.output.clone());
                    if let Some(message) = outcome.message {
                        update = update.with_message(message);
                    }
                    emit(update);
                    results.insert(step.id.clone(), outcome.output);
                    continue;
                }
                Ok(outcome) => outcome
                    .message
                    .unwrap_or_else(|| "step reported failure".to_string()),
                Err(e) => e.to_string(),
            };

            tracing::error!("Step {} ({}) failed: {}", step.id, step.type_id, failure);
            emit(StepProgress::error(&step.id, failure.clone()));
            return Err(RunError::Handler {
                step_id: step.id.clone(),
                message: failure,
            });
        }

        Ok(())
    }

    fn finish(
        &self,
        run_id: RunId,
        start_time: Instant,
        order: Vec<StepId>,
        results: HashMap<StepId, serde_json::Value>,
        outcome: RunOutcome,
        progress: &dyn ProgressSink,
    ) -> RunReport {
        let duration_ms = start_time.elapsed().as_millis() as u64;

        self.phase.send_replace(if outcome.is_completed() {
            RunPhase::Completed
        } else {
            RunPhase::Aborted
        });
        progress.emit(ProgressEvent::RunFinished {
            run_id,
            outcome: outcome.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!("Run {} finished in {}ms: {:?}", run_id, duration_ms, outcome);

        RunReport {
            run_id,
            outcome,
            order,
            results,
            duration_ms,
        }
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(START_CATEGORY)
    }
}

/// Adjacency view of the snapshot. Node indices follow step order.
fn build_graph(snapshot: &GraphSnapshot) -> DiGraph<StepId, ()> {
    let mut graph = DiGraph::new();
    let mut step_to_index = HashMap::new();

    for step in &snapshot.steps {
        let idx = graph.add_node(step.id.clone());
        step_to_index.insert(step.id.as_str(), idx);
    }

    for edge in &snapshot.edges {
        match (
            step_to_index.get(edge.from.step.as_str()),
            step_to_index.get(edge.to.step.as_str()),
        ) {
            (Some(from), Some(to)) => {
                graph.add_edge(*from, *to, ());
            }
            _ => tracing::debug!("Skipping dangling edge {}", edge.id),
        }
    }

    graph
}
