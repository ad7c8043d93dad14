pub mod jsonl;
pub mod text;

use std::sync::Arc;

use taskwave_core::api::{OutputConfig, OutputRendererPlugin};

pub use jsonl::JsonlRendererPlugin;
pub use text::TextRendererPlugin;

/// Renderer for `format` (`text` or `jsonl`); anything else renders as text.
pub fn build_renderer(format: &str, output: &OutputConfig) -> Arc<dyn OutputRendererPlugin> {
    match format {
        "jsonl" => Arc::new(JsonlRendererPlugin::new(output.pretty_print)),
        _ => Arc::new(TextRendererPlugin::new(output.ascii_only)),
    }
}
