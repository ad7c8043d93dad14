pub mod renderers;
pub mod strategies;

pub use renderers::{build_renderer, JsonlRendererPlugin, TextRendererPlugin};
pub use strategies::{
    build_retry_strategy, ExponentialBackoffPlugin, ImmediateRetryPlugin, LinearRetryPlugin,
};
