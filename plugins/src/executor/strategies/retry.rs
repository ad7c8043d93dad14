use std::sync::Arc;
use std::time::Duration;

use taskwave_core::api::{RetryConfig, RetryStrategyPlugin};
use tracing::warn;

/// `base * 2^(attempt-1)`, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// `base * attempt`, capped at `max_delay_ms`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

/// Retries immediately, bounded only by `max_attempts`.
pub struct ImmediateRetryPlugin {
    max_attempts: u32,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl ImmediateRetryPlugin {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << (attempt - 1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        Some(Duration::from_millis(delay.min(self.config.max_delay_ms)))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        let delay = self.config.base_delay_ms.saturating_mul(attempt as u64);
        Some(Duration::from_millis(delay.min(self.config.max_delay_ms)))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for ImmediateRetryPlugin {
    fn name(&self) -> &str {
        "immediate"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(Duration::ZERO)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Strategy named by `retry.strategy`. `"none"` disables the strategy, which
/// leaves each task's `max_retries` as the only bound.
pub fn build_retry_strategy(config: &RetryConfig) -> Option<Arc<dyn RetryStrategyPlugin>> {
    match config.strategy.as_str() {
        "none" => None,
        "linear" => Some(Arc::new(LinearRetryPlugin::new(config.clone()))),
        "immediate" => Some(Arc::new(ImmediateRetryPlugin::new(config.max_attempts))),
        "exponential-backoff" | "exponential" => {
            Some(Arc::new(ExponentialBackoffPlugin::new(config.clone())))
        }
        other => {
            warn!(strategy = other, "unknown retry strategy; using exponential-backoff");
            Some(Arc::new(ExponentialBackoffPlugin::new(config.clone())))
        }
    }
}
