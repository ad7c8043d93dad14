use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tool_call::parse_legacy_tool_calls;
use super::traits::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// Tool schema offered to a reasoning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn from_capability(cap: &dyn Capability) -> Self {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in cap.parameters() {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name));
            }
        }
        Self {
            name: cap.name().to_string(),
            description: cap.description().to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub tools: Vec<ToolSpec>,
    pub tool_calling: bool,
    pub system_message: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A structured request to invoke a named capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Reasoning model output: plain text, or content plus structured tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Text(String),
    Structured {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
}

impl ModelResponse {
    pub fn content(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Structured { content, .. } => content,
        }
    }

    /// Structured calls are canonical; free text falls back to the legacy
    /// `Tool Call:` convention, which yields nothing when malformed.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match self {
            Self::Structured { tool_calls, .. } => tool_calls.clone(),
            Self::Text(text) => parse_legacy_tool_calls(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_calls_win_over_text() {
        let resp = ModelResponse::Structured {
            content: "Tool Call: ignored\nArguments: {}".into(),
            tool_calls: vec![ToolCall {
                id: Some("1".into()),
                name: "echo".into(),
                arguments: serde_json::json!({"x": 1}),
            }],
        };
        let calls = resp.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "echo");
    }

    #[test]
    fn plain_text_without_convention_has_no_calls() {
        let resp = ModelResponse::Text("all done".into());
        assert!(resp.tool_calls().is_empty());
        assert_eq!(resp.content(), "all done");
    }
}
