// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use crate::budget::BudgetBreakdown;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("tool definitions alone ({tool_tokens} tokens) exceed the available budget ({available} tokens)")]
    ToolDefinitionsExceedBudget { tool_tokens: usize, available: usize },

    #[error("current input ({input_tokens} tokens) exceeds the space left after system and tools ({available} tokens)")]
    InputTooLarge { input_tokens: usize, available: usize },

    #[error("context overflow after all degradation levels exhausted: {breakdown:?}")]
    ContextOverflow { breakdown: BudgetBreakdown },

    #[error("compaction strategy '{0}' requires plugin '{1}', which is not registered")]
    MissingRequiredPlugin(String, String),

    #[error("duplicate plugin section name '{0}'")]
    DuplicateSection(String),
}
