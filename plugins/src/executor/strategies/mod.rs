pub mod retry;

pub use retry::{
    build_retry_strategy, ExponentialBackoffPlugin, ImmediateRetryPlugin, LinearRetryPlugin,
};
