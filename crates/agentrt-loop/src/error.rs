// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("provider error: {message}")]
    Provider { message: String, recoverable: bool },

    #[error(transparent)]
    Context(#[from] agentrt_context::ContextError),

    #[error("tool registry error: {0}")]
    Registry(#[from] agentrt_tools::RegistryError),
}
