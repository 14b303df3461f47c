use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepcore::{HandlerError, Properties};

/// Result reported by a step handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub output: serde_json::Value,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            output: serde_json::Value::Null,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<serde_json::Value>) -> Self {
        self.output = output.into();
        self
    }
}

/// Backend that performs a step's real-world action.
///
/// An `Err` and an outcome with `ok: false` are treated the same way by the
/// engine: the run stops at that step.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(
        &self,
        type_id: &str,
        properties: &Properties,
    ) -> Result<StepOutcome, HandlerError>;
}
