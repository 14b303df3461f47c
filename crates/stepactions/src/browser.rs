use crate::handlers::Action;
use crate::require_str;
use async_trait::async_trait;
use serde_json::json;
use stepcore::{HandlerError, Properties};
use stepruntime::StepOutcome;

/// Logs the page it would open; there is no browser behind it
pub struct OpenPageAction;

#[async_trait]
impl Action for OpenPageAction {
    fn type_id(&self) -> &str {
        "open_page"
    }

    async fn execute(&self, props: &Properties) -> Result<StepOutcome, HandlerError> {
        let url = require_str(props, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Ok(StepOutcome::failure(format!("Not a web URL: {}", url)));
        }

        tracing::info!("Opening page {}", url);
        Ok(StepOutcome::success().with_output(json!({ "opened": url })))
    }
}
