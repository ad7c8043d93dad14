use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{CompletionOptions, Message, ModelResponse};

/// Declared parameter of a capability, surfaced to reasoning models as a tool schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            param_type: param_type.into(),
            required,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A named unit of work a task can invoke. Internals are opaque to the scheduler.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value>;
}

/// Completion service that may request capability invocations.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> anyhow::Result<ModelResponse>;
}

/// External classification service choosing capabilities for a task.
#[async_trait]
pub trait CapabilitySelector: Send + Sync {
    async fn recognize_intent(
        &self,
        task_name: &str,
        task_description: &str,
        catalog: &[Arc<dyn Capability>],
        model: Option<&Arc<dyn ReasoningModel>>,
    ) -> anyhow::Result<Vec<Arc<dyn Capability>>>;
}
