// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Token-budgeted context assembly: the system preamble, plugin sections,
//! compaction, emergency truncation, and the mandatory tool-pair sanitizer
//! that runs as the last step of every `prepare()` call.
pub mod budget;
pub mod error;
pub mod events;
pub mod manager;
pub mod sanitize;
pub mod section;
pub mod strategy;
pub mod truncate;

pub use budget::{Budget, BudgetBreakdown, BudgetEvent, CRITICAL_THRESHOLD_PERCENT, WARNING_THRESHOLD_PERCENT};
pub use error::ContextError;
pub use events::ContextEvent;
pub use manager::{ContextConfig, ContextManager, CurrentInput, PrepareOutput};
pub use sanitize::sanitize_tool_pairs;
pub use section::{Section, PRIORITY_NEVER_COMPACT};
pub use strategy::{
    CompactionAction, CompactionOutcome, CompactionStrategy, NarrativeStrategy, StrategyView, StructuredStrategy,
    STRUCTURED_COMPACTION_PROMPT, SUMMARIZE_PROMPT,
};
pub use truncate::{looks_binary, smart_truncate};
