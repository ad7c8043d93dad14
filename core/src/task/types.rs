use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TaskError;

/// Input key carrying `{dep_id: output}` of successfully completed dependencies.
pub const DEPENDENCY_OUTPUTS_KEY: &str = "_dependencyOutputs";

/// Input key carrying the accumulated session context.
pub const SESSION_CONTEXT_KEY: &str = "_context";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Declarative description of a task, as handed to the manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// IDs whose terminal status gates this task.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub max_retries: u32,
    /// Explicit capability names; empty means "ask the selector".
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_plugins<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugins = plugins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Terminal outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl TaskResult {
    pub fn success(output: Value, context: Option<Map<String, Value>>) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            context,
        }
    }

    pub fn failure(error: TaskError) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            context: None,
        }
    }

    /// Output worth propagating to dependents.
    pub fn propagated_output(&self) -> Option<&Value> {
        if !self.success {
            return None;
        }
        self.output.as_ref().filter(|v| !is_empty_value(v))
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(TaskError::is_cancelled)
    }
}

/// `null`, `""`, `{}` and `[]` count as "no output".
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn failed_or_empty_results_do_not_propagate() {
        assert!(TaskResult::failure(TaskError::Cancelled)
            .propagated_output()
            .is_none());
        assert!(TaskResult::success(json!({}), None)
            .propagated_output()
            .is_none());
        assert!(TaskResult::success(json!(""), None)
            .propagated_output()
            .is_none());
        assert_eq!(
            TaskResult::success(json!({"x": 1}), None).propagated_output(),
            Some(&json!({"x": 1}))
        );
        assert_eq!(
            TaskResult::success(json!(0), None).propagated_output(),
            Some(&json!(0))
        );
    }
}
