// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Test doubles for `ModelProvider`. Not gated behind `#[cfg(test)]` since
//! downstream crates (agentrt-loop, agentrt-conductor) need them for their
//! own integration tests.
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::provider::{CancelSignal, ModelProvider, ResponseStream};
use crate::{CompletionRequest, FinishReason, Message, Role, ResponseEvent, Usage};

/// Echoes the last user message back as a single text response. Useful for
/// smoke-testing plumbing that doesn't care about actual model behavior.
pub struct MockProvider {
    name: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self { name: "mock".to_string() }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "mock-echo"
    }

    async fn stream(
        &self,
        req: CompletionRequest,
        _cancel: CancelSignal,
    ) -> anyhow::Result<ResponseStream> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text())
            .unwrap_or_default()
            .to_string();

        let text = format!("echo: {last_user}");
        let events = vec![
            Ok(ResponseEvent::TextDelta(text)),
            Ok(ResponseEvent::ResponseComplete {
                usage: Usage::default(),
                finish_reason: FinishReason::Stop,
            }),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A provider that returns a pre-scripted sequence of responses, one per
/// call to `stream`, and records every request it was given. Panics if
/// called more times than it has scripted responses — an empty queue is a
/// test bug, not a runtime condition to degrade gracefully around.
pub struct ScriptedMockProvider {
    name: String,
    responses: Mutex<Vec<Vec<ResponseEvent>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedMockProvider {
    pub fn new(responses: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            name: "scripted-mock".to_string(),
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// All requests this provider has been asked to stream, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    async fn stream(
        &self,
        req: CompletionRequest,
        _cancel: CancelSignal,
    ) -> anyhow::Result<ResponseStream> {
        self.requests.lock().unwrap().push(req);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedMockProvider called with no scripted responses remaining");
        }
        let next = responses.remove(0);
        Ok(Box::pin(stream::iter(next.into_iter().map(Ok))))
    }
}

fn request_with(messages: Vec<Message>) -> CompletionRequest {
    CompletionRequest { messages, ..Default::default() }
}
