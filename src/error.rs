// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// The facade's aggregated error surface. Every inner crate keeps its own
/// `thiserror` enum; this is the one `anyhow`-free boundary type the facade
/// returns, flattening them into a single enum for a caller.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Context(#[from] agentrt_context::ContextError),

    #[error(transparent)]
    Loop(#[from] agentrt_loop::LoopError),

    #[error(transparent)]
    Conductor(#[from] agentrt_conductor::ConductorError),

    #[error(transparent)]
    Storage(#[from] agentrt_session::StorageError),

    #[error(transparent)]
    Registry(#[from] agentrt_tools::RegistryError),

    #[error("no session named '{0}' exists in storage")]
    SessionNotFound(String),

    #[error("agent is being destroyed or already destroyed")]
    Destroyed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
