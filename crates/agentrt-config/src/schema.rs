// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Typed configuration for the runtime, loaded from a layered YAML search
/// path by [`crate::loader::load`]. Model/provider selection and vendor
/// credentials are intentionally absent — those are out of scope for this
/// crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub budget: BudgetConfig,
    pub loop_cfg: LoopConfig,
    pub conductor: ConductorConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { budget: BudgetConfig::default(), loop_cfg: LoopConfig::default(), conductor: ConductorConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_tokens: usize,
    pub response_reserve: usize,
    pub compaction_threshold: f32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { max_tokens: 128_000, response_reserve: 4_000, compaction_threshold: 0.75 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub tool_result_token_cap: usize,
    pub default_tool_timeout_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { max_iterations: 25, tool_result_token_cap: 4_000, default_tool_timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConductorConfig {
    pub planning_enabled: bool,
    pub max_task_depth: u32,
    pub session_approval_ttl_secs: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self { planning_enabled: true, max_task_depth: 3, session_approval_ttl_secs: 8 * 60 * 60 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_matches_documented_defaults() {
        let budget = BudgetConfig::default();
        assert_eq!(budget.max_tokens, 128_000);
        assert_eq!(budget.compaction_threshold, 0.75);
    }
}
