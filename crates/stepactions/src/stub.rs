use std::time::Duration;
use stepcore::HandlerError;
use stepruntime::StepOutcome;

/// Stand-in for step types that have no action; waits, then succeeds
pub struct StubAction {
    delay: Duration,
}

impl StubAction {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn run(&self, type_id: &str) -> Result<StepOutcome, HandlerError> {
        tracing::debug!("No action for {}, using stub", type_id);
        tokio::time::sleep(self.delay).await;
        Ok(StepOutcome::success().with_message(format!("(stub) {} executed", type_id)))
    }
}
