// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Provider-agnostic message, request, and streaming-event types, plus the
//! [`ModelProvider`] trait every vendor adapter implements downstream.
//!
//! This crate deliberately knows nothing about HTTP, SSE framing, or any
//! specific vendor's wire format, and nothing about model catalogs or
//! pricing — those are out of scope here.
pub mod mock;
pub mod provider;
mod types;

pub use provider::{CancelHandle, CancelSignal, ModelProvider, ResponseStream};
pub use types::{
    parse_data_url_parts, CompletionRequest, ContentPart, FinishReason, FunctionCall, Message,
    MessageContent, ResponseEvent, Role, ToolContentPart, ToolResultContent, ToolSchema, Usage,
};
