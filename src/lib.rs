// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `agentrt` — a runtime for conversational AI agents that drives a large
//! language model through multi-turn tool-using dialogues while keeping
//! every request within the model's token budget.
//!
//! This top-level crate is a thin facade: it owns no algorithms of its own.
//! The three tightly coupled subsystems the rest of the workspace
//! implements are:
//!
//! - [`agentrt_context`] — the token-budgeted context manager (prepare,
//!   compaction, emergency truncation, tool-pair sanitization).
//! - [`agentrt_loop`] — the agentic loop (LLM call → tool exec → LLM call
//!   until termination).
//! - [`agentrt_conductor`] — the mode conductor (interactive / planning /
//!   executing, plan generation and task-by-task execution).
//!
//! [`agentrt_tokens`], [`agentrt_tools`], [`agentrt_model`],
//! [`agentrt_session`], and [`agentrt_config`] are the supporting crates
//! those three consume. [`Agent`] wires all of them into a single external
//! surface.
pub mod agent;
pub mod error;
pub mod response;

pub use agent::{Agent, AgentConfig};
pub use error::AgentError;
pub use response::{UniversalResponse, UserActionType};

pub use agentrt_conductor as conductor;
pub use agentrt_config as config;
pub use agentrt_context as context;
pub use agentrt_loop as agentic_loop;
pub use agentrt_model as model;
pub use agentrt_session as session;
pub use agentrt_tokens as tokens;
pub use agentrt_tools as tools;
