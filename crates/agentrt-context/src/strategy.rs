// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Compaction strategies. A strategy sees a read-only view of the
//! conversation and budget and two mutators (`remove_messages`,
//! `compact_plugin`); it decides what to do with them. Shipping this as a
//! trait rather than a closed enum lets a caller register a custom
//! strategy without forking this crate.
use async_trait::async_trait;

use agentrt_model::Message;

use crate::section::Section;

pub const STRUCTURED_COMPACTION_PROMPT: &str = "\
You are a context compaction assistant for a software engineering agent. \
Produce a structured state checkpoint from the conversation history below. \
Use EXACTLY the following Markdown sections — do not add or remove sections. \
Be information-dense: preserve file paths, function names, error messages, \
code snippets, test names, and technical decisions verbatim where they matter.

## Active Task
Describe in 1-3 sentences what the agent is currently working on.

## Key Decisions & Rationale
List every significant technical decision made and why (bullet points). \
Include file or component names.

## Files & Artifacts
List every file that was read, modified, or created, with a brief note on what was done.

## Constraints & Requirements
List every requirement, constraint, or user preference that must be preserved.

## Pending Items
List every unfinished subtask or open question.

## Session Narrative
Write a dense technical summary (2-5 paragraphs) of what happened, \
capturing the essential flow of events, tool outputs, and reasoning. \
Focus on facts the agent will need to continue correctly.";

pub const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve all technical details, decisions, file \
     names, code snippets, and tool outputs that may be relevant to future work. \
     The summary will replace the original history to free up context space.";

/// A read-only view the strategy inspects to decide what to compact.
pub struct StrategyView<'a> {
    pub conversation: &'a [Message],
    pub utilization_percent: f32,
    pub plugins: &'a [&'a dyn Section],
}

/// Mutation a strategy asks the context manager to apply. Strategies never
/// mutate the conversation directly — they return a plan and the manager
/// (which also owns pair-sanitization) applies it.
#[derive(Debug, Clone)]
pub enum CompactionAction {
    RemoveMessages(Vec<usize>),
    CompactPlugin { name: String, target_tokens: usize },
    /// Replace the entire conversation with a single summarization request
    /// message.
    ReplaceWithSummaryRequest(Message),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompactionOutcome {
    pub freed_tokens: usize,
}

#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Utilization threshold (0.0-1.0) above which `prepare()` should invoke
    /// this strategy.
    fn threshold(&self) -> f32 {
        0.75
    }

    /// Plugin names this strategy needs present to run; validated at
    /// registration, not at compaction time.
    fn required_plugins(&self) -> &[&str] {
        &[]
    }

    /// Decide what to compact to free roughly `target_tokens`. Returns the
    /// actions to apply; the caller (ContextManager) performs them and then
    /// runs the mandatory pair sanitizer.
    async fn compact(&self, view: &StrategyView<'_>, target_tokens: usize) -> Vec<CompactionAction>;

    /// Optional, advisory post-turn consolidation (e.g. expensive
    /// summarization that isn't needed for correctness this turn).
    async fn consolidate(&self, _view: &StrategyView<'_>) -> Vec<CompactionAction> {
        vec![]
    }
}

/// Replaces the whole conversation with one summarization request built from
/// a structured-checkpoint prompt, keeping only the system message (if any)
/// ahead of it.
pub struct StructuredStrategy;

#[async_trait]
impl CompactionStrategy for StructuredStrategy {
    fn name(&self) -> &str {
        "structured"
    }

    async fn compact(&self, view: &StrategyView<'_>, _target_tokens: usize) -> Vec<CompactionAction> {
        summary_request_action(view, STRUCTURED_COMPACTION_PROMPT)
    }
}

/// Replaces the whole conversation with one free-form summarization request.
pub struct NarrativeStrategy;

#[async_trait]
impl CompactionStrategy for NarrativeStrategy {
    fn name(&self) -> &str {
        "narrative"
    }

    async fn compact(&self, view: &StrategyView<'_>, _target_tokens: usize) -> Vec<CompactionAction> {
        summary_request_action(view, SUMMARIZE_PROMPT)
    }
}

fn summary_request_action(view: &StrategyView<'_>, prompt: &str) -> Vec<CompactionAction> {
    if view.conversation.is_empty() {
        return vec![];
    }
    let history_text = serialize_history(view.conversation);
    let request = Message::user(format!("{prompt}\n\n---\n\n{history_text}"));
    vec![CompactionAction::ReplaceWithSummaryRequest(request)]
}

fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                agentrt_model::Role::System => "system",
                agentrt_model::Role::User => "user",
                agentrt_model::Role::Assistant => "assistant",
                agentrt_model::Role::Tool => "tool",
            };
            let text = m.as_text().map(str::to_string).unwrap_or_else(|| "[non-text content]".to_string());
            format!("[{role}] {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn structured_strategy_replaces_nonempty_conversation() {
        let conversation = vec![Message::user("hi"), Message::assistant("hello")];
        let view = StrategyView { conversation: &conversation, utilization_percent: 80.0, plugins: &[] };
        let actions = StructuredStrategy.compact(&view, 100).await;
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], CompactionAction::ReplaceWithSummaryRequest(_)));
    }

    #[tokio::test]
    async fn empty_conversation_yields_no_actions() {
        let conversation: Vec<Message> = vec![];
        let view = StrategyView { conversation: &conversation, utilization_percent: 80.0, plugins: &[] };
        let actions = NarrativeStrategy.compact(&view, 100).await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn structured_strategy_embeds_exact_teacher_prompt() {
        let conversation = vec![Message::user("hi")];
        let view = StrategyView { conversation: &conversation, utilization_percent: 80.0, plugins: &[] };
        let actions = StructuredStrategy.compact(&view, 100).await;
        match &actions[0] {
            CompactionAction::ReplaceWithSummaryRequest(msg) => {
                assert!(msg.as_text().unwrap().contains("## Active Task"));
            }
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn idempotent_default_threshold_is_point_75() {
        assert_eq!(StructuredStrategy.threshold(), 0.75);
    }
}
