// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agentic loop: `add user_input → prepare → stream → execute tools →
//! repeat until no tool calls remain`, generalized over the
//! `ContextManager`, `ToolRegistry`, and `ModelProvider` traits instead of
//! being wired to one concrete session/config type.
use std::collections::HashMap;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{instrument, warn};

use agentrt_context::ContextManager;
use agentrt_model::{CompletionRequest, FinishReason, Message, ModelProvider, ResponseEvent, ToolSchema, Usage};
use agentrt_tools::{PermissionManager, SessionApprovalCache, ToolCall as RegistryToolCall, ToolRegistry};

use crate::config::{IterationConfig, RetryConfig};
use crate::error::LoopError;
use crate::events::LoopEvent;
use crate::nudge::{text_contains_malformed_tool_call, wrap_up_message, EMPTY_TURN_NUDGE, MALFORMED_TOOL_CALL_NUDGE, MID_TASK_STALL_NUDGE};

const MAX_EMPTY_TURN_RETRIES: u32 = 2;

pub struct LoopOutcome {
    pub iterations: u32,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Accumulated state of one in-flight tool call while its `ToolCallStart`/
/// `ToolCallArgsDelta`/`ToolCallArgsDone` events stream in.
struct PendingToolCall {
    name: String,
    args: String,
}

struct TurnResult {
    text: String,
    tool_calls: Vec<RegistryToolCall>,
    usage: Usage,
    finish_reason: FinishReason,
}

/// Run one full agentic-loop invocation for a single user turn (or tool
/// result batch already staged as current input). Returns once the model
/// produces no further tool calls, the iteration cap forces a wrap-up turn,
/// or cancellation fires.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
pub async fn run(
    context: &ContextManager,
    tools: &ToolRegistry,
    provider: &dyn ModelProvider,
    permission_manager: &dyn PermissionManager,
    approval_cache: &SessionApprovalCache,
    config: &IterationConfig,
    events_tx: mpsc::Sender<LoopEvent>,
    mut cancel: watch::Receiver<bool>,
) -> anyhow::Result<LoopOutcome> {
    let mut iterations = 0u32;
    let mut partial_text = String::new();
    let mut empty_turn_retries = 0u32;
    let mut tool_call_rounds_this_step = 0u32;
    let mut stall_nudge_sent = false;
    let mut total_usage = Usage::default();

    loop {
        if *cancel.borrow() {
            return abort(context, &events_tx, partial_text).await;
        }

        iterations += 1;
        if iterations > config.max_iterations {
            let wrap_msg = wrap_up_message(config.max_iterations);
            context.set_current_input_user_message(Message::user(wrap_msg));
            let prepared = context.prepare().await.map_err(LoopError::from)?;
            let turn = stream_one_turn_with_retry(provider, &prepared.messages, &[], &events_tx, &mut cancel, &config.retry).await?;
            match turn {
                Some(t) => {
                    if !t.text.is_empty() {
                        context.commit_turn(vec![Message::assistant(t.text)]);
                    } else {
                        context.commit_turn(vec![]);
                    }
                    total_usage = add_usage(total_usage, t.usage);
                }
                None => return abort(context, &events_tx, partial_text).await,
            }
            let _ = events_tx.send(LoopEvent::TurnComplete).await;
            break;
        }

        let tool_defs: Vec<ToolSchema> = tools
            .get_enabled()
            .into_iter()
            .map(|d| ToolSchema { name: d.name, description: d.description, parameters: d.parameters })
            .collect();

        let prepared = context.prepare().await.map_err(LoopError::from)?;
        for event in prepared.events {
            forward_context_event(event, &events_tx).await;
        }

        let turn = match stream_one_turn_with_retry(provider, &prepared.messages, &tool_defs, &events_tx, &mut cancel, &config.retry).await? {
            Some(t) => t,
            None => return abort(context, &events_tx, partial_text).await,
        };

        total_usage = add_usage(total_usage, turn.usage);

        if !turn.text.is_empty() {
            partial_text.push_str(&turn.text);
        }

        if turn.tool_calls.is_empty() {
            context.commit_turn(if turn.text.is_empty() { vec![] } else { vec![Message::assistant(turn.text.clone())] });

            if turn.text.is_empty() && empty_turn_retries < MAX_EMPTY_TURN_RETRIES {
                empty_turn_retries += 1;
                context.set_current_input_user_message(Message::user(EMPTY_TURN_NUDGE));
                continue;
            }
            if !turn.text.is_empty() && text_contains_malformed_tool_call(&turn.text) && empty_turn_retries < MAX_EMPTY_TURN_RETRIES {
                empty_turn_retries += 1;
                context.set_current_input_user_message(Message::user(MALFORMED_TOOL_CALL_NUDGE));
                continue;
            }
            if !turn.text.is_empty() && tool_call_rounds_this_step >= 2 && !stall_nudge_sent {
                stall_nudge_sent = true;
                context.set_current_input_user_message(Message::user(MID_TASK_STALL_NUDGE));
                continue;
            }

            let _ = events_tx.send(LoopEvent::ResponseComplete { usage: total_usage, iterations, finish_reason: turn.finish_reason }).await;
            return Ok(LoopOutcome { iterations, finish_reason: turn.finish_reason, usage: total_usage });
        }

        empty_turn_retries = 0;
        tool_call_rounds_this_step += 1;

        let assistant_messages: Vec<Message> = turn
            .tool_calls
            .iter()
            .map(|tc| Message::tool_call(tc.id.clone(), tc.name.clone(), tc.arguments.to_string()))
            .collect();
        let mut committed = if turn.text.is_empty() { vec![] } else { vec![Message::assistant(turn.text.clone())] };
        committed.extend(assistant_messages);
        context.commit_turn(committed);

        let results = execute_tool_calls(tools, &turn.tool_calls, permission_manager, approval_cache, config, &events_tx, &mut cancel).await;
        context.add_tool_results(results);

        if *cancel.borrow() {
            return abort(context, &events_tx, partial_text).await;
        }
    }

    let _ = events_tx
        .send(LoopEvent::ResponseComplete { usage: total_usage, iterations, finish_reason: FinishReason::Stop })
        .await;
    Ok(LoopOutcome { iterations, finish_reason: FinishReason::Stop, usage: total_usage })
}

async fn abort(context: &ContextManager, events_tx: &mpsc::Sender<LoopEvent>, partial_text: String) -> anyhow::Result<LoopOutcome> {
    if !partial_text.is_empty() {
        context.commit_turn(vec![Message::assistant(partial_text.clone())]);
    }
    let _ = events_tx.send(LoopEvent::Aborted { partial_text }).await;
    Ok(LoopOutcome { iterations: 0, finish_reason: FinishReason::Cancelled, usage: Usage::default() })
}

fn add_usage(a: Usage, b: Usage) -> Usage {
    Usage {
        input_tokens: a.input_tokens + b.input_tokens,
        output_tokens: a.output_tokens + b.output_tokens,
        cache_read_tokens: a.cache_read_tokens + b.cache_read_tokens,
        cache_write_tokens: a.cache_write_tokens + b.cache_write_tokens,
    }
}

async fn forward_context_event(event: agentrt_context::ContextEvent, events_tx: &mpsc::Sender<LoopEvent>) {
    if let agentrt_context::ContextEvent::Compacted { strategy, freed_tokens } = event {
        let _ = events_tx.send(LoopEvent::ContextCompacted { strategy, freed_tokens }).await;
    }
}

/// Stream one LLM turn, retrying a `recoverable` provider error with bounded
/// exponential backoff (`retry.delay_for_attempt`) up to `retry.max_retries`
/// times; a `recoverable: false` error aborts immediately via `?` at the call
/// site, per spec §4.4/§7. Cancellation during the backoff sleep ends the
/// retry loop the same way mid-stream cancellation does: `Ok(None)`.
async fn stream_one_turn_with_retry(
    provider: &dyn ModelProvider,
    messages: &[Message],
    tools: &[ToolSchema],
    events_tx: &mpsc::Sender<LoopEvent>,
    cancel: &mut watch::Receiver<bool>,
    retry: &RetryConfig,
) -> Result<Option<TurnResult>, LoopError> {
    let mut attempt = 0u32;
    loop {
        match stream_one_turn(provider, messages, tools, events_tx, cancel).await {
            Err(LoopError::Provider { message, recoverable: true }) if attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(attempt, ?delay, message, "recoverable provider error, retrying after backoff");
                attempt += 1;
                tokio::select! {
                    biased;
                    _ = cancel.changed() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => return other,
        }
    }
}

/// Stream one LLM turn, forwarding text/reasoning/tool-start events live and
/// accumulating the full text, tool calls, usage, and finish reason.
/// Returns `Ok(None)` if cancelled mid-stream.
async fn stream_one_turn(
    provider: &dyn ModelProvider,
    messages: &[Message],
    tools: &[ToolSchema],
    events_tx: &mpsc::Sender<LoopEvent>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<Option<TurnResult>, LoopError> {
    let request = CompletionRequest { messages: messages.to_vec(), tools: tools.to_vec(), ..Default::default() };
    let signal = agentrt_model::CancelSignal::new(cancel.clone());

    let mut stream = provider
        .stream(request, signal)
        .await
        .map_err(|e| LoopError::Provider { message: e.to_string(), recoverable: true })?;

    let mut text = String::new();
    let mut pending: HashMap<String, PendingToolCall> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut usage = Usage::default();
    let mut finish_reason = FinishReason::Stop;

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => return Ok(None),
            next = stream.next() => {
                match next {
                    None => break,
                    Some(Err(e)) => return Err(LoopError::Provider { message: e.to_string(), recoverable: true }),
                    Some(Ok(event)) => match event {
                        ResponseEvent::TextDelta(delta) => {
                            text.push_str(&delta);
                            let _ = events_tx.send(LoopEvent::TextDelta(delta)).await;
                        }
                        ResponseEvent::ReasoningDelta(delta) => {
                            let _ = events_tx.send(LoopEvent::ReasoningDelta(delta)).await;
                        }
                        ResponseEvent::ToolCallStart { id, name } => {
                            order.push(id.clone());
                            pending.insert(id.clone(), PendingToolCall { name: name.clone(), args: String::new() });
                            let _ = events_tx.send(LoopEvent::ToolCallStarted { id, name, arguments: serde_json::Value::Null }).await;
                        }
                        ResponseEvent::ToolCallArgsDelta { id, delta } => {
                            if let Some(call) = pending.get_mut(&id) {
                                call.args.push_str(&delta);
                            }
                        }
                        ResponseEvent::ToolCallArgsDone { id, args } => {
                            if let Some(call) = pending.get_mut(&id) {
                                call.args = args;
                            }
                        }
                        ResponseEvent::ResponseComplete { usage: u, finish_reason: fr } => {
                            usage = u;
                            finish_reason = fr;
                        }
                        ResponseEvent::Error { message, recoverable } => {
                            return Err(LoopError::Provider { message, recoverable });
                        }
                    },
                }
            }
        }
    }

    let tool_calls = order
        .into_iter()
        .filter_map(|id| {
            let call = pending.remove(&id)?;
            let arguments = serde_json::from_str(&call.args).unwrap_or(serde_json::Value::Object(Default::default()));
            Some(RegistryToolCall { id, name: call.name, arguments })
        })
        .collect();

    Ok(Some(TurnResult { text, tool_calls, usage, finish_reason }))
}

/// Partition tool calls on `blocking`. Blocking calls always run
/// sequentially in emission order. Non-blocking calls are a seam for a
/// caller to fan out concurrently (e.g. via `tokio::spawn` once `tools` is
/// wrapped in an `Arc`); this reference loop still runs them sequentially
/// too, just without waiting for them to unblock the next LLM call in a
/// richer driver.
async fn execute_tool_calls(
    tools: &ToolRegistry,
    calls: &[RegistryToolCall],
    permission_manager: &dyn PermissionManager,
    approval_cache: &SessionApprovalCache,
    config: &IterationConfig,
    events_tx: &mpsc::Sender<LoopEvent>,
    cancel: &mut watch::Receiver<bool>,
) -> Vec<Message> {
    let mut blocking_calls = Vec::new();
    let mut non_blocking_calls = Vec::new();
    for call in calls {
        match tools.descriptor(&call.name) {
            Some(d) if !d.blocking => non_blocking_calls.push(call.clone()),
            _ => blocking_calls.push(call.clone()),
        }
    }

    let mut results = Vec::with_capacity(calls.len());

    for call in &blocking_calls {
        let _ = events_tx.send(LoopEvent::ToolCallStarted { id: call.id.clone(), name: call.name.clone(), arguments: call.arguments.clone() }).await;
        let outcome = tools.execute(call, permission_manager, approval_cache, cancel).await;
        results.push(record_outcome(call, outcome, config, events_tx).await);
    }

    if !non_blocking_calls.is_empty() {
        warn!(count = non_blocking_calls.len(), "non-blocking tool calls are executed synchronously in this reference loop; a real spawn-and-join would require ToolRegistry to be wrapped in an Arc by the caller");
        for call in &non_blocking_calls {
            let _ = events_tx.send(LoopEvent::ToolCallStarted { id: call.id.clone(), name: call.name.clone(), arguments: call.arguments.clone() }).await;
            let outcome = tools.execute(call, permission_manager, approval_cache, cancel).await;
            results.push(record_outcome(call, outcome, config, events_tx).await);
        }
    }

    results
}

async fn record_outcome(
    call: &RegistryToolCall,
    outcome: Result<agentrt_tools::ExecutionResult, agentrt_tools::RegistryError>,
    config: &IterationConfig,
    events_tx: &mpsc::Sender<LoopEvent>,
) -> Message {
    let output = match outcome {
        Ok(result) => result.output,
        Err(e) => agentrt_tools::ToolOutput::error(e.to_string()),
    };

    let _ = events_tx.send(LoopEvent::ToolCallFinished { id: call.id.clone(), name: call.name.clone(), output: output.clone() }).await;

    let category = agentrt_tools::OutputCategory::Generic;
    let text = agentrt_context::smart_truncate(&output.as_text(), config.tool_result_token_cap, category);
    if output.is_error() {
        Message::tool_result_error(call.id.clone(), output.error.clone().unwrap_or(text))
    } else {
        Message::tool_result(call.id.clone(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_context::{ContextConfig, ContextManager, StructuredStrategy};
    use agentrt_model::mock::{MockProvider, ScriptedMockProvider};
    use agentrt_tools::policy::{PermissionDecision, SessionApprovalCache};
    use agentrt_tools::{Tool, ToolOutput};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AllowAll;
    #[async_trait]
    impl PermissionManager for AllowAll {
        async fn ask(&self, _tool_name: &str, _arguments: &serde_json::Value) -> PermissionDecision {
            PermissionDecision::AllowOnce
        }
    }

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn default_policy(&self) -> agentrt_tools::ApprovalPolicy {
            agentrt_tools::ApprovalPolicy::Always
        }
        async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::text(arguments.to_string()))
        }
    }

    fn context() -> (ContextManager, Arc<ToolRegistry>) {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoTool), None).unwrap();
        let ctx = ContextManager::new(
            "you are an agent",
            vec![],
            Arc::new(StructuredStrategy),
            registry.clone(),
            ContextConfig { max_tokens: 50_000, response_reserve: 1_000 },
        )
        .unwrap();
        (ctx, registry)
    }

    #[tokio::test]
    async fn run_with_no_tool_calls_completes_in_one_iteration() {
        let (ctx, registry) = context();
        ctx.set_current_input_user_message(Message::user("hi"));
        let provider = MockProvider::new();
        let (tx, mut rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let config = IterationConfig::default();
        let outcome = run(&ctx, &registry, &provider, &AllowAll, &SessionApprovalCache::default(), &config, tx, cancel_rx)
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 1);
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, LoopEvent::ResponseComplete { .. }) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn run_executes_tool_call_then_completes() {
        let (ctx, registry) = context();
        ctx.set_current_input_user_message(Message::user("use the tool"));
        let provider = ScriptedMockProvider::new(vec![
            vec![
                ResponseEvent::ToolCallStart { id: "1".into(), name: "echo".into() },
                ResponseEvent::ToolCallArgsDone { id: "1".into(), args: "{}".into() },
                ResponseEvent::ResponseComplete { usage: Usage::default(), finish_reason: FinishReason::ToolCalls },
            ],
            vec![
                ResponseEvent::TextDelta("done".into()),
                ResponseEvent::ResponseComplete { usage: Usage::default(), finish_reason: FinishReason::Stop },
            ],
        ]);
        let (tx, _rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let config = IterationConfig::default();
        let outcome = run(&ctx, &registry, &provider, &AllowAll, &SessionApprovalCache::default(), &config, tx, cancel_rx)
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 2);
        let conversation = ctx.conversation_snapshot();
        assert!(conversation.iter().any(|m| m.is_tool_call()));
        assert!(conversation.iter().any(|m| m.is_tool_result()));
    }

    #[tokio::test]
    async fn run_aborts_on_precancelled_signal() {
        let (ctx, registry) = context();
        ctx.set_current_input_user_message(Message::user("hi"));
        let provider = MockProvider::new();
        let (tx, mut rx) = mpsc::channel(64);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_tx.send(true).unwrap();
        let config = IterationConfig::default();
        let outcome = run(&ctx, &registry, &provider, &AllowAll, &SessionApprovalCache::default(), &config, tx, cancel_rx)
            .await
            .unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Cancelled);
        let mut saw_abort = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, LoopEvent::Aborted { .. }) {
                saw_abort = true;
            }
        }
        assert!(saw_abort);
    }

    #[tokio::test]
    async fn recoverable_provider_error_is_retried_then_succeeds() {
        let (ctx, registry) = context();
        ctx.set_current_input_user_message(Message::user("hi"));
        let provider = ScriptedMockProvider::new(vec![
            vec![ResponseEvent::Error { message: "rate limited".into(), recoverable: true }],
            vec![ResponseEvent::Error { message: "rate limited".into(), recoverable: true }],
            vec![
                ResponseEvent::TextDelta("done".into()),
                ResponseEvent::ResponseComplete { usage: Usage::default(), finish_reason: FinishReason::Stop },
            ],
        ]);
        let (tx, _rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let mut config = IterationConfig::default();
        config.retry = crate::config::RetryConfig {
            max_retries: 3,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
        };
        let outcome = run(&ctx, &registry, &provider, &AllowAll, &SessionApprovalCache::default(), &config, tx, cancel_rx)
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn recoverable_provider_error_fails_after_max_retries_exhausted() {
        let (ctx, registry) = context();
        ctx.set_current_input_user_message(Message::user("hi"));
        let provider = ScriptedMockProvider::new(vec![
            vec![ResponseEvent::Error { message: "rate limited".into(), recoverable: true }],
            vec![ResponseEvent::Error { message: "rate limited".into(), recoverable: true }],
        ]);
        let (tx, _rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let mut config = IterationConfig::default();
        config.retry = crate::config::RetryConfig {
            max_retries: 1,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
        };
        let result = run(&ctx, &registry, &provider, &AllowAll, &SessionApprovalCache::default(), &config, tx, cancel_rx).await;
        assert!(result.is_err());
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn fatal_provider_error_aborts_without_retry() {
        let (ctx, registry) = context();
        ctx.set_current_input_user_message(Message::user("hi"));
        let provider = ScriptedMockProvider::new(vec![vec![ResponseEvent::Error { message: "bad auth".into(), recoverable: false }]]);
        let (tx, _rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let config = IterationConfig::default();
        let result = run(&ctx, &registry, &provider, &AllowAll, &SessionApprovalCache::default(), &config, tx, cancel_rx).await;
        assert!(result.is_err());
        assert_eq!(provider.requests().len(), 1);
    }
}
