use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stepcore::{HandlerError, Properties};
use stepruntime::{StepHandler, StepOutcome};

use crate::stub::StubAction;

/// Simulated latency of actions that stand in for real automation
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(200);

/// One step type's behaviour
#[async_trait]
pub trait Action: Send + Sync {
    fn type_id(&self) -> &str;

    async fn execute(&self, props: &Properties) -> Result<StepOutcome, HandlerError>;
}

/// [`StepHandler`] that dispatches to registered actions by type id
pub struct ActionHandlers {
    actions: HashMap<String, Arc<dyn Action>>,
    fallback: Option<StubAction>,
    latency: Duration,
}

impl ActionHandlers {
    pub fn new(latency: Duration) -> Self {
        Self {
            actions: HashMap::new(),
            fallback: Some(StubAction::new(latency)),
            latency,
        }
    }

    /// Handlers with every standard action registered
    pub fn standard(latency: Duration) -> Self {
        let mut handlers = Self::new(latency);
        crate::register_all(&mut handlers);
        handlers
    }

    /// Fail unknown types with `UnknownType` instead of stubbing them
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        let type_id = action.type_id().to_string();
        if self.actions.insert(type_id.clone(), action).is_some() {
            tracing::warn!("Replacing action for step type {}", type_id);
        }
    }

    pub fn has_action(&self, type_id: &str) -> bool {
        self.actions.contains_key(type_id)
    }

    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ActionHandlers {
    fn default() -> Self {
        Self::standard(DEFAULT_LATENCY)
    }
}

#[async_trait]
impl StepHandler for ActionHandlers {
    async fn handle(
        &self,
        type_id: &str,
        properties: &Properties,
    ) -> Result<StepOutcome, HandlerError> {
        if let Some(action) = self.actions.get(type_id) {
            return action.execute(properties).await;
        }

        match &self.fallback {
            Some(stub) => stub.run(type_id).await,
            None => Err(HandlerError::UnknownType(type_id.to_string())),
        }
    }
}
