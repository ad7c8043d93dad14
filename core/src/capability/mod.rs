//! External collaborator contracts a task delegates its work to.
//!
//! - [`Capability`]: a named function `execute(params) -> value` ("plugin").
//! - [`ReasoningModel`]: completions with optional tool invocation requests.
//! - [`CapabilitySelector`]: picks the capabilities relevant to a task.
//! - [`CapabilityCatalog`]: explicit, per-manager registry of capabilities.

mod catalog;
mod message;
mod tool_call;
mod traits;

pub use catalog::CapabilityCatalog;
pub use message::{CompletionOptions, Message, ModelResponse, Role, ToolCall, ToolSpec};
pub use tool_call::parse_legacy_tool_calls;
pub use traits::{Capability, CapabilitySelector, ParamSpec, ReasoningModel};
