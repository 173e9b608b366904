// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

/// Bounds and knobs for one `run()` invocation of the agentic loop.
#[derive(Debug, Clone)]
pub struct IterationConfig {
    /// Maximum tool-call rounds before the loop forces a tool-free wrap-up
    /// turn and stops.
    pub max_iterations: u32,
    /// Per-message cap applied to tool-result content before it is recorded,
    /// via `agentrt_context::smart_truncate`.
    pub tool_result_token_cap: usize,
    pub retry: RetryConfig,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self { max_iterations: 25, tool_result_token_cap: 4_000, retry: RetryConfig::default() }
    }
}

/// Bounded exponential backoff applied to `recoverable` provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(500), max_delay: Duration::from_secs(8) }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        (self.base_delay.saturating_mul(factor)).min(self.max_delay)
    }
}
