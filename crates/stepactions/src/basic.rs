use crate::handlers::Action;
use async_trait::async_trait;
use stepcore::{HandlerError, Properties};
use stepruntime::StepOutcome;

pub struct RunFlowAction;

#[async_trait]
impl Action for RunFlowAction {
    fn type_id(&self) -> &str {
        "run_flow"
    }

    async fn execute(&self, _props: &Properties) -> Result<StepOutcome, HandlerError> {
        Ok(StepOutcome::success())
    }
}
