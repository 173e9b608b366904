// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agentic loop: drives one or more LLM turns against a
//! `ContextManager` and `ToolRegistry` until the model stops calling tools,
//! the iteration cap forces a wrap-up turn, or cancellation fires.
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod nudge;

pub use config::{IterationConfig, RetryConfig};
pub use driver::{run, LoopOutcome};
pub use error::LoopError;
pub use events::LoopEvent;
