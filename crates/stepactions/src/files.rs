use crate::handlers::Action;
use crate::require_str;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use stepcore::{HandlerError, Properties};
use stepruntime::StepOutcome;

/// Simulated delimited-text writer. Reports what it would write.
pub struct WriteTextAction {
    delay: Duration,
}

impl WriteTextAction {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Action for WriteTextAction {
    fn type_id(&self) -> &str {
        "write_txt"
    }

    async fn execute(&self, props: &Properties) -> Result<StepOutcome, HandlerError> {
        let path = require_str(props, "path")?;
        let rows = match props.get("variable") {
            Some(Value::Array(items)) => items.len(),
            _ => 1,
        };

        tokio::time::sleep(self.delay).await;
        tracing::info!("Wrote {} row(s) to {}", rows, path);

        Ok(StepOutcome::success().with_output(json!({ "saved": path, "rows": rows })))
    }
}
