// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `ContextManager`: owns the conversation, the current-input slot, and the
//! plugin section registry, and produces budgeted, pair-sane LLM input via
//! `prepare()`.
use std::sync::{Arc, Mutex};

use agentrt_model::Message;
use agentrt_tokens::estimate_text;
use agentrt_tools::ToolRegistry;
use tracing::{debug, instrument, warn};

use crate::budget::{budget_events, Budget, BudgetBreakdown};
use crate::error::ContextError;
use crate::events::ContextEvent;
use crate::sanitize::sanitize_tool_pairs;
use crate::section::Section;
use crate::strategy::{CompactionAction, CompactionStrategy, StrategyView};
use crate::truncate::{looks_binary, smart_truncate};

/// The pending, not-yet-committed turn: either a fresh user message or a
/// batch of tool results awaiting the next LLM call.
#[derive(Debug, Clone)]
pub enum CurrentInput {
    Empty,
    UserMessage(Message),
    ToolResults(Vec<Message>),
}

impl CurrentInput {
    fn messages(&self) -> Vec<Message> {
        match self {
            CurrentInput::Empty => vec![],
            CurrentInput::UserMessage(m) => vec![m.clone()],
            CurrentInput::ToolResults(results) => results.clone(),
        }
    }

    fn is_user_message(&self) -> bool {
        matches!(self, CurrentInput::UserMessage(_))
    }

    fn token_count(&self) -> usize {
        self.messages().iter().map(|m| m.approx_tokens()).sum()
    }
}

pub struct ContextConfig {
    pub max_tokens: usize,
    pub response_reserve: usize,
}

pub struct PrepareOutput {
    pub messages: Vec<Message>,
    pub budget: Budget,
    pub compacted: bool,
    pub events: Vec<ContextEvent>,
}

pub struct ContextManager {
    system_prompt: Mutex<String>,
    conversation: Mutex<Vec<Message>>,
    current_input: Mutex<CurrentInput>,
    sections: Vec<Arc<dyn Section>>,
    strategy: Arc<dyn CompactionStrategy>,
    tools: Arc<ToolRegistry>,
    config: ContextConfig,
    /// Overrides `strategy.threshold()` when set, e.g. from
    /// `agentrt_config::BudgetConfig::compaction_threshold`. `None` keeps the
    /// strategy's own default, matching this manager's behavior before a
    /// caller opts into a configured value.
    compaction_threshold_override: Mutex<Option<f32>>,
}

impl ContextManager {
    pub fn new(
        system_prompt: impl Into<String>,
        sections: Vec<Arc<dyn Section>>,
        strategy: Arc<dyn CompactionStrategy>,
        tools: Arc<ToolRegistry>,
        config: ContextConfig,
    ) -> Result<Self, ContextError> {
        let registered: Vec<&str> = sections.iter().map(|s| s.name()).collect();
        for plugin_name in strategy.required_plugins() {
            if !registered.contains(plugin_name) {
                return Err(ContextError::MissingRequiredPlugin(strategy.name().to_string(), plugin_name.to_string()));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for name in &registered {
            if !seen.insert(*name) {
                return Err(ContextError::DuplicateSection(name.to_string()));
            }
        }
        Ok(Self {
            system_prompt: Mutex::new(system_prompt.into()),
            conversation: Mutex::new(Vec::new()),
            current_input: Mutex::new(CurrentInput::Empty),
            sections,
            strategy,
            tools,
            config,
            compaction_threshold_override: Mutex::new(None),
        })
    }

    /// Override the utilization threshold `prepare()` compares against,
    /// instead of the registered strategy's own `threshold()`.
    pub fn set_compaction_threshold(&self, threshold: f32) {
        *self.compaction_threshold_override.lock().unwrap() = Some(threshold);
    }

    fn compaction_threshold(&self) -> f32 {
        self.compaction_threshold_override.lock().unwrap().unwrap_or_else(|| self.strategy.threshold())
    }

    pub fn set_current_input_user_message(&self, message: Message) {
        *self.current_input.lock().unwrap() = CurrentInput::UserMessage(message);
    }

    pub fn add_tool_results(&self, results: Vec<Message>) {
        *self.current_input.lock().unwrap() = CurrentInput::ToolResults(results);
    }

    /// Flush the current input into the conversation tail, then append the
    /// assistant's response messages, then clear current input.
    pub fn commit_turn(&self, assistant_messages: Vec<Message>) {
        let mut conversation = self.conversation.lock().unwrap();
        let mut current_input = self.current_input.lock().unwrap();
        conversation.extend(current_input.messages());
        conversation.extend(assistant_messages);
        *current_input = CurrentInput::Empty;
    }

    pub fn conversation_snapshot(&self) -> Vec<Message> {
        self.conversation.lock().unwrap().clone()
    }

    pub fn restore_conversation(&self, messages: Vec<Message>) {
        *self.conversation.lock().unwrap() = messages;
    }

    async fn build_preamble(&self) -> String {
        let mut parts = vec![self.system_prompt.lock().unwrap().clone()];
        for section in &self.sections {
            let content = section.produce_content().await;
            if !content.is_empty() {
                parts.push(content);
            }
        }
        parts.join("\n\n")
    }

    fn tool_definition_tokens(&self) -> usize {
        self.tools
            .get_enabled()
            .iter()
            .map(|d| estimate_text(&d.name) + estimate_text(&d.description) + agentrt_tokens::estimate_structured(&d.parameters))
            .sum()
    }

    /// Produce the next LLM input: `(messages, budget, compacted)`. See
    /// module docs for the full seven-step pipeline this implements.
    #[instrument(skip(self), fields(iteration))]
    pub async fn prepare(&self) -> Result<PrepareOutput, ContextError> {
        let available_total = self.config.max_tokens.saturating_sub(self.config.response_reserve);

        // 1. tool-definition tokens
        let tools_tokens = self.tool_definition_tokens();
        if tools_tokens > available_total {
            return Err(ContextError::ToolDefinitionsExceedBudget { tool_tokens: tools_tokens, available: available_total });
        }

        // 2. system preamble
        let preamble = self.build_preamble().await;
        let system_tokens = estimate_text(&preamble);

        // 3. current-input check / emergency truncation
        let mut current_input = self.current_input.lock().unwrap().clone();
        let available_for_content = available_total.saturating_sub(tools_tokens).saturating_sub(system_tokens);
        let mut current_input_tokens = current_input.token_count();

        if system_tokens + tools_tokens + current_input_tokens > available_total {
            if current_input.is_user_message() {
                return Err(ContextError::InputTooLarge { input_tokens: current_input_tokens, available: available_for_content });
            }
            current_input = self.emergency_truncate(current_input, available_for_content);
            current_input_tokens = current_input.token_count();
        }

        // 4. conversation tokens / compaction
        let mut conversation = self.conversation.lock().unwrap().clone();
        let mut conversation_tokens: usize = conversation.iter().map(|m| m.approx_tokens()).sum();
        let mut compacted = false;
        let mut freed_during_compaction = 0usize;

        let utilization = (system_tokens + tools_tokens + conversation_tokens + current_input_tokens) as f32
            / available_total.max(1) as f32;

        let threshold = self.compaction_threshold();
        if utilization >= threshold {
            let target_utilization = threshold - 0.10;
            let target_tokens = (available_total as f32 * target_utilization) as usize;
            let freed = self
                .apply_compaction(&mut conversation, system_tokens, tools_tokens, current_input_tokens, target_tokens)
                .await;
            conversation_tokens = conversation.iter().map(|m| m.approx_tokens()).sum();
            compacted = freed > 0;
            freed_during_compaction = freed;
            *self.conversation.lock().unwrap() = conversation.clone();
            debug!(freed, "compaction applied");
        }

        let breakdown =
            BudgetBreakdown { system: system_tokens, tools: tools_tokens, conversation: conversation_tokens, current_input: current_input_tokens };
        let budget = Budget::from_breakdown(self.config.max_tokens, self.config.response_reserve, breakdown);

        if budget.total_used() > available_total {
            warn!(total = budget.total_used(), available_total, "context overflow after compaction");
            return Err(ContextError::ContextOverflow { breakdown });
        }

        let mut events: Vec<ContextEvent> = budget_events(budget).into_iter().map(ContextEvent::from).collect();
        if compacted {
            events.push(ContextEvent::Compacted { strategy: self.strategy.name().to_string(), freed_tokens: freed_during_compaction });
        }

        // 6. assemble
        let mut assembled = Vec::with_capacity(1 + conversation.len() + current_input.messages().len());
        assembled.push(Message::system(preamble));
        assembled.extend(conversation);
        assembled.extend(current_input.messages());

        // 7. mandatory pair sanitization — last step, no exceptions.
        let assembled = sanitize_tool_pairs(assembled);

        events.push(ContextEvent::Prepared { budget, message_count: assembled.len() });

        Ok(PrepareOutput { messages: assembled, budget, compacted, events })
    }

    fn emergency_truncate(&self, current_input: CurrentInput, available_for_content: usize) -> CurrentInput {
        match current_input {
            CurrentInput::ToolResults(results) => {
                let per_message_budget = available_for_content / results.len().max(1);
                let truncated = results
                    .into_iter()
                    .map(|m| truncate_tool_result_message(m, per_message_budget))
                    .collect();
                CurrentInput::ToolResults(truncated)
            }
            other => other,
        }
    }

    async fn apply_compaction(
        &self,
        conversation: &mut Vec<Message>,
        system_tokens: usize,
        tools_tokens: usize,
        current_input_tokens: usize,
        target_tokens: usize,
    ) -> usize {
        let section_refs: Vec<&dyn Section> = self.sections.iter().map(|s| s.as_ref()).collect();
        let before: usize = conversation.iter().map(|m| m.approx_tokens()).sum();
        let view = StrategyView {
            conversation: conversation.as_slice(),
            utilization_percent: ((system_tokens + tools_tokens + before + current_input_tokens) as f32
                / self.config.max_tokens.max(1) as f32)
                * 100.0,
            plugins: &section_refs,
        };
        let target_for_conversation = target_tokens.saturating_sub(system_tokens + tools_tokens + current_input_tokens);
        let actions = self.strategy.compact(&view, target_for_conversation).await;
        drop(view);

        let mut freed = 0;
        for action in actions {
            match action {
                CompactionAction::RemoveMessages(mut indices) => {
                    indices.sort_unstable();
                    indices.dedup();
                    for idx in indices.into_iter().rev() {
                        if idx < conversation.len() {
                            freed += conversation[idx].approx_tokens();
                            conversation.remove(idx);
                        }
                    }
                }
                CompactionAction::CompactPlugin { name, target_tokens } => {
                    if let Some(section) = self.sections.iter().find(|s| s.name() == name) {
                        freed += section.compact(target_tokens).await;
                    }
                }
                CompactionAction::ReplaceWithSummaryRequest(summary_message) => {
                    let after: usize = summary_message.approx_tokens();
                    freed += before.saturating_sub(after);
                    conversation.clear();
                    conversation.push(summary_message);
                }
            }
        }
        freed
    }
}

fn truncate_tool_result_message(message: Message, budget_tokens: usize) -> Message {
    use agentrt_model::{Message as M, MessageContent, ToolResultContent};

    match message.content {
        MessageContent::ToolResult { tool_call_id, content: ToolResultContent::Text(text) } => {
            if looks_binary(&text) || estimate_text(&text) > budget_tokens {
                let truncated = smart_truncate(&text, budget_tokens, agentrt_tools::OutputCategory::Generic);
                M::tool_result(tool_call_id, truncated)
            } else {
                M::tool_result(tool_call_id, text)
            }
        }
        other => M { role: message.role, content: other },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StructuredStrategy;
    use agentrt_tools::{Tool, ToolOutput};
    use async_trait::async_trait;

    struct NoopTool;
    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::text(""))
        }
    }

    fn manager(max_tokens: usize) -> ContextManager {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(NoopTool), None).unwrap();
        ContextManager::new(
            "you are a helpful agent",
            vec![],
            Arc::new(StructuredStrategy),
            tools,
            ContextConfig { max_tokens, response_reserve: 100 },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn prepare_places_preamble_at_index_zero() {
        let ctx = manager(10_000);
        ctx.set_current_input_user_message(Message::user("hello"));
        let output = ctx.prepare().await.unwrap();
        assert!(matches!(output.messages[0].content, agentrt_model::MessageContent::Text(_)));
        assert_eq!(output.messages[0].role, agentrt_model::Role::System);
    }

    #[tokio::test]
    async fn prepare_rejects_oversized_user_input() {
        let ctx = manager(50);
        ctx.set_current_input_user_message(Message::user("x".repeat(10_000)));
        let result = ctx.prepare().await;
        assert!(matches!(result, Err(ContextError::InputTooLarge { .. })));
    }

    #[tokio::test]
    async fn prepare_truncates_oversized_tool_results_instead_of_failing() {
        let ctx = manager(2_000);
        ctx.add_tool_results(vec![Message::tool_result("1", "y".repeat(50_000))]);
        let output = ctx.prepare().await.unwrap();
        assert!(output.messages.len() >= 1);
    }

    #[tokio::test]
    async fn prepare_output_has_no_orphaned_tool_pairs() {
        let ctx = manager(10_000);
        ctx.restore_conversation(vec![Message::tool_call("orphan", "noop", "{}")]);
        let output = ctx.prepare().await.unwrap();
        assert!(output.messages.iter().all(|m| !m.is_tool_call() || m.tool_pair_id() != Some("orphan")));
    }

    #[tokio::test]
    async fn commit_turn_flushes_current_input_then_assistant_message() {
        let ctx = manager(10_000);
        ctx.set_current_input_user_message(Message::user("hi"));
        ctx.commit_turn(vec![Message::assistant("hello")]);
        let conversation = ctx.conversation_snapshot();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].role, agentrt_model::Role::User);
        assert_eq!(conversation[1].role, agentrt_model::Role::Assistant);
    }

    #[tokio::test]
    async fn budget_total_used_never_exceeds_available_after_successful_prepare() {
        let ctx = manager(10_000);
        ctx.set_current_input_user_message(Message::user("hello"));
        let output = ctx.prepare().await.unwrap();
        assert!(output.budget.total_used() <= output.budget.max_tokens - output.budget.response_reserve);
    }

    #[tokio::test]
    async fn tool_definitions_exceeding_budget_is_a_config_error() {
        let ctx = manager(1);
        let result = ctx.prepare().await;
        assert!(matches!(result, Err(ContextError::ToolDefinitionsExceedBudget { .. })));
    }

    #[tokio::test]
    async fn compaction_emits_compacted_event() {
        struct DropAllStrategy;
        #[async_trait::async_trait]
        impl CompactionStrategy for DropAllStrategy {
            fn name(&self) -> &str {
                "drop-all"
            }
            fn threshold(&self) -> f32 {
                0.1
            }
            async fn compact(&self, view: &StrategyView<'_>, _target_tokens: usize) -> Vec<CompactionAction> {
                vec![CompactionAction::RemoveMessages((0..view.conversation.len()).collect())]
            }
        }

        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(NoopTool), None).unwrap();
        let ctx = ContextManager::new(
            "you are a helpful agent",
            vec![],
            Arc::new(DropAllStrategy),
            tools,
            ContextConfig { max_tokens: 10_000, response_reserve: 100 },
        )
        .unwrap();
        ctx.restore_conversation(vec![Message::user("x".repeat(2_000)), Message::assistant("y".repeat(2_000))]);
        ctx.set_current_input_user_message(Message::user("hi"));

        let output = ctx.prepare().await.unwrap();
        assert!(output.compacted);
        assert!(output.events.iter().any(|e| matches!(e, ContextEvent::Compacted { .. })));
    }

    #[tokio::test]
    async fn compaction_threshold_override_suppresses_compaction_below_strategy_default() {
        struct DropAllStrategy;
        #[async_trait::async_trait]
        impl CompactionStrategy for DropAllStrategy {
            fn name(&self) -> &str {
                "drop-all"
            }
            fn threshold(&self) -> f32 {
                0.1
            }
            async fn compact(&self, view: &StrategyView<'_>, _target_tokens: usize) -> Vec<CompactionAction> {
                vec![CompactionAction::RemoveMessages((0..view.conversation.len()).collect())]
            }
        }

        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(NoopTool), None).unwrap();
        let ctx = ContextManager::new(
            "you are a helpful agent",
            vec![],
            Arc::new(DropAllStrategy),
            tools,
            ContextConfig { max_tokens: 10_000, response_reserve: 100 },
        )
        .unwrap();
        ctx.set_compaction_threshold(0.99);
        ctx.restore_conversation(vec![Message::user("x".repeat(2_000)), Message::assistant("y".repeat(2_000))]);
        ctx.set_current_input_user_message(Message::user("hi"));

        let output = ctx.prepare().await.unwrap();
        assert!(!output.compacted);
    }

    #[test]
    fn missing_required_plugin_fails_at_construction() {
        struct NeedsPlugin;
        #[async_trait::async_trait]
        impl CompactionStrategy for NeedsPlugin {
            fn name(&self) -> &str {
                "needs-plugin"
            }
            fn required_plugins(&self) -> &[&str] {
                &["memory"]
            }
            async fn compact(&self, _view: &StrategyView<'_>, _target_tokens: usize) -> Vec<CompactionAction> {
                vec![]
            }
        }
        let tools = Arc::new(ToolRegistry::new());
        let result = ContextManager::new(
            "sys",
            vec![],
            Arc::new(NeedsPlugin),
            tools,
            ContextConfig { max_tokens: 1000, response_reserve: 10 },
        );
        assert!(matches!(result, Err(ContextError::MissingRequiredPlugin(_, _))));
    }
}
