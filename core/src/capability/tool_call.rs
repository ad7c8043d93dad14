//! Compatibility shim for models that announce tool calls in free text:
//!
//! ```text
//! Tool Call: search
//! Arguments: {"query": "rust"}
//! ```
//!
//! Best-effort only. Blocks with unparseable arguments are dropped.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::message::ToolCall;

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*Tool Call:\s*([A-Za-z0-9_.\-]+)\s*\n\s*Arguments:\s*(\{.*\})\s*$")
            .expect("static regex")
    })
}

pub fn parse_legacy_tool_calls(text: &str) -> Vec<ToolCall> {
    tool_call_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let arguments: Value = serde_json::from_str(caps.get(2)?.as_str()).ok()?;
            Some(ToolCall {
                id: None,
                name,
                arguments,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_blocks() {
        let text = "I'll use two tools.\n\
                    Tool Call: search\n\
                    Arguments: {\"query\": \"rust\"}\n\
                    Tool Call: fetch\n\
                    Arguments: {\"url\": \"https://example.com\"}\n";
        let calls = parse_legacy_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments["query"], "rust");
        assert_eq!(calls[1].name, "fetch");
    }

    #[test]
    fn malformed_arguments_are_skipped() {
        let text = "Tool Call: search\nArguments: {not json}\n";
        assert!(parse_legacy_tool_calls(text).is_empty());
    }

    #[test]
    fn missing_arguments_line_yields_nothing() {
        assert!(parse_legacy_tool_calls("Tool Call: search\n").is_empty());
    }
}
