use crate::executor::{ExecutionEngine, RunReport};
use crate::handler::StepHandler;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stepcore::{
    EventBus, FlowError, GraphSettings, ImportSummary, ProgressEvent, Renderer, Result, StepId,
    TypeRegistry, WorkflowGraph, START_CATEGORY,
};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub graph: GraphSettings,
    /// Category whose steps seed the run order
    pub start_category: String,
    /// Interval of the timer-backed tick source
    pub tick_interval_ms: u64,
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            graph: GraphSettings::default(),
            start_category: START_CATEGORY.to_string(),
            tick_interval_ms: 16,
            event_buffer_size: 1000,
        }
    }
}

impl SessionConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Editing session: one graph, its registry and at most one active run
pub struct FlowSession {
    registry: Arc<TypeRegistry>,
    graph: Arc<RwLock<WorkflowGraph>>,
    engine: ExecutionEngine,
    event_bus: Arc<EventBus>,
    active_run: Mutex<Option<CancellationToken>>,
    last_results: RwLock<HashMap<StepId, serde_json::Value>>,
    config: SessionConfig,
}

impl FlowSession {
    pub fn new(registry: Arc<TypeRegistry>, config: SessionConfig) -> Self {
        tracing::info!(
            "Creating flow session ({} step types, start category '{}')",
            registry.len(),
            config.start_category
        );

        Self {
            registry,
            graph: Arc::new(RwLock::new(WorkflowGraph::with_settings(
                config.graph.clone(),
            ))),
            engine: ExecutionEngine::new(config.start_category.clone()),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            active_run: Mutex::new(None),
            last_results: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn graph(&self) -> &Arc<RwLock<WorkflowGraph>> {
        &self.graph
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_bus.subscribe()
    }

    pub async fn attach_renderer(&self, renderer: Arc<dyn Renderer>) {
        self.graph.write().await.set_renderer(Some(renderer));
    }

    pub async fn import_json(&self, text: &str) -> Result<ImportSummary> {
        let mut graph = self.graph.write().await;
        Ok(graph.import_json(text, &self.registry)?)
    }

    pub async fn export_json(&self) -> Result<String> {
        Ok(self.graph.read().await.export_json()?)
    }

    pub async fn load_file(&self, path: &Path) -> Result<ImportSummary> {
        let text = tokio::fs::read_to_string(path).await?;
        self.import_json(&text).await
    }

    /// Run a snapshot of the current graph.
    ///
    /// Edits made while the run is in flight apply to the next run only.
    pub async fn run(&self, handler: &dyn StepHandler) -> Result<RunReport> {
        let token = {
            let mut active = self.active_run();
            if active.is_some() {
                return Err(FlowError::RunInProgress);
            }
            let token = CancellationToken::new();
            *active = Some(token.clone());
            token
        };
        let _guard = ActiveRun(&self.active_run);

        let snapshot = self.graph.read().await.snapshot();
        let report = self
            .engine
            .run(&snapshot, handler, self.event_bus.as_ref(), &token)
            .await;

        *self.last_results.write().await = report.results.clone();
        Ok(report)
    }

    /// Cancel the active run. It stops before its next step.
    pub fn stop(&self) -> bool {
        match self.active_run().as_ref() {
            Some(token) => {
                tracing::info!("Stopping active run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active_run().is_some()
    }

    /// Outputs of the steps that succeeded in the most recent run
    pub async fn last_results(&self) -> HashMap<StepId, serde_json::Value> {
        self.last_results.read().await.clone()
    }

    fn active_run(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active_run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the active-run slot even when the run future is dropped
struct ActiveRun<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
