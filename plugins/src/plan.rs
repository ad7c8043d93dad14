//! Plan files: a list of tasks in TOML (`[[task]]` tables) or JSON.
//!
//! ```toml
//! [[task]]
//! id = "fetch"
//! name = "Fetch sources"
//! plugins = ["shell"]
//! input = { command = "git pull" }
//!
//! [[task]]
//! id = "build"
//! name = "Build"
//! depends_on = ["fetch"]
//! ```
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use taskwave_core::api::{CliError, ExecutorError, TaskSpec};

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default, alias = "tasks")]
    task: Vec<TaskEntry>,
}

/// One task as written in a plan. Accepts the dependency list under
/// `dependencies`, `dependsOn` or `depends_on`.
#[derive(Debug, Deserialize)]
struct TaskEntry {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, rename = "dependsOn")]
    depends_on_camel: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default, alias = "maxRetries")]
    max_retries: u32,
    #[serde(default)]
    plugins: Vec<String>,
    #[serde(default, alias = "agentId")]
    agent_id: Option<String>,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    #[serde(default, alias = "contextId")]
    context_id: Option<String>,
}

impl TaskEntry {
    fn into_spec(self) -> TaskSpec {
        let mut seen = HashSet::new();
        let dependencies = self
            .dependencies
            .into_iter()
            .chain(self.depends_on_camel)
            .chain(self.depends_on)
            .filter(|d| seen.insert(d.clone()))
            .collect();

        TaskSpec {
            id: self.id.filter(|id| !id.trim().is_empty()),
            name: self.name,
            description: self.description,
            dependencies,
            input: self.input.unwrap_or(Value::Null),
            max_retries: self.max_retries,
            plugins: self.plugins,
            agent_id: self.agent_id,
            session_id: self.session_id,
            context_id: self.context_id,
        }
    }
}

/// Parses plan text. `format` is `"json"` or `"toml"`.
pub fn parse_plan(text: &str, format: &str) -> Result<Vec<TaskSpec>, CliError> {
    let plan: PlanFile = match format {
        "json" => {
            // A bare array of tasks is accepted as well as `{"tasks": [...]}`.
            let value: Value =
                serde_json::from_str(text).map_err(|e| CliError::Plan(e.to_string()))?;
            let value = match value {
                Value::Array(_) => serde_json::json!({ "task": value }),
                other => other,
            };
            serde_json::from_value(value).map_err(|e| CliError::Plan(e.to_string()))?
        }
        _ => toml::from_str(text).map_err(|e| CliError::Plan(e.to_string()))?,
    };

    let specs: Vec<TaskSpec> = plan.task.into_iter().map(TaskEntry::into_spec).collect();

    let mut ids = HashSet::new();
    for id in specs.iter().filter_map(|s| s.id.as_deref()) {
        if !ids.insert(id) {
            return Err(ExecutorError::DuplicateTaskId(id.to_string()).into());
        }
    }

    Ok(specs)
}

/// Reads a plan file; the extension picks the format (`.json`, else TOML).
pub fn load_plan(path: &Path) -> Result<Vec<TaskSpec>, CliError> {
    let text = std::fs::read_to_string(path)?;
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => "json",
        _ => "toml",
    };
    let specs = parse_plan(&text, format)?;
    tracing::debug!(path = %path.display(), tasks = specs.len(), "plan loaded");
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn toml_plan_unions_dependency_spellings() {
        let specs = parse_plan(
            r#"
            [[task]]
            id = "a"
            name = "first"

            [[task]]
            id = "c"
            name = "third"
            dependencies = ["a"]
            dependsOn = ["b", "a"]
            depends_on = ["b"]
            max_retries = 2
            input = { path = "README.md" }
            "#,
            "toml",
        )
        .unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].dependencies, vec!["a", "b"]);
        assert_eq!(specs[1].max_retries, 2);
        assert_eq!(specs[1].input, json!({"path": "README.md"}));
        assert_eq!(specs[0].input, Value::Null);
    }

    #[test]
    fn json_plan_accepts_bare_array() {
        let specs = parse_plan(
            r#"[{"id": "a", "name": "one", "plugins": ["echo"]}, {"name": "two", "dependsOn": ["a"]}]"#,
            "json",
        )
        .unwrap();

        assert_eq!(specs[0].plugins, vec!["echo"]);
        assert_eq!(specs[1].id, None);
        assert_eq!(specs[1].dependencies, vec!["a"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_plan(
            "[[task]]\nid = \"a\"\nname = \"x\"\n[[task]]\nid = \"a\"\nname = \"y\"\n",
            "toml",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CliError::Graph(ExecutorError::DuplicateTaskId(ref id)) if id == "a"
        ));
    }

    #[test]
    fn malformed_plan_is_a_plan_error() {
        assert!(matches!(
            parse_plan("[[task]]\nid = ", "toml"),
            Err(CliError::Plan(_))
        ));
    }

    #[test]
    fn load_plan_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"tasks": [{"id": "x", "name": "x"}]}"#).unwrap();

        let specs = load_plan(&path).unwrap();
        assert_eq!(specs[0].id.as_deref(), Some("x"));
    }
}
