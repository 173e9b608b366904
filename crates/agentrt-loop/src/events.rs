// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Events the agentic loop emits while driving one `run()` call, including
//! `ResponseComplete` named in the external agent API.
use agentrt_model::{FinishReason, Usage};
use agentrt_tools::ToolOutput;

#[derive(Debug, Clone)]
pub enum LoopEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCallStarted { id: String, name: String, arguments: serde_json::Value },
    ToolCallFinished { id: String, name: String, output: ToolOutput },
    ContextCompacted { strategy: String, freed_tokens: usize },
    TokenUsage(Usage),
    TurnComplete,
    Aborted { partial_text: String },
    Error { message: String, recoverable: bool },
    ResponseComplete { usage: Usage, iterations: u32, finish_reason: FinishReason },
}
