// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Events emitted by the registry/executor for observers (UI, logging) that
//! want to react to tool lifecycle transitions without polling.
use serde::Serialize;

use crate::tool::{ToolCall, ToolExecutionState, ToolOutput};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    Started { call_id: String, name: String },
    StateChanged { call_id: String, state: DisplayState },
    Completed { call_id: String, output: ToolOutput },
}

/// `ToolExecutionState` as a serializable string, since the enum itself
/// carries no serde impl (it is a runtime-only signal elsewhere).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Pending,
    Executing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl From<ToolExecutionState> for DisplayState {
    fn from(state: ToolExecutionState) -> Self {
        match state {
            ToolExecutionState::Pending => DisplayState::Pending,
            ToolExecutionState::Executing => DisplayState::Executing,
            ToolExecutionState::Completed => DisplayState::Completed,
            ToolExecutionState::Failed => DisplayState::Failed,
            ToolExecutionState::Timeout => DisplayState::Timeout,
            ToolExecutionState::Cancelled => DisplayState::Cancelled,
        }
    }
}

impl ToolEvent {
    pub fn started(call: &ToolCall) -> Self {
        Self::Started { call_id: call.id.clone(), name: call.name.clone() }
    }

    pub fn state_changed(call: &ToolCall, state: ToolExecutionState) -> Self {
        Self::StateChanged { call_id: call.id.clone(), state: state.into() }
    }

    pub fn completed(call: &ToolCall, output: ToolOutput) -> Self {
        Self::Completed { call_id: call.id.clone(), output }
    }
}
