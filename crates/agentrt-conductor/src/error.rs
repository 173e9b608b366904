// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use crate::plan::PlanError;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("no plan is pending approval")]
    NoPendingPlan,

    #[error("cannot mutate the plan unless execution is paused")]
    NotPaused,

    #[error("cannot resume: execution is not paused")]
    NotPausedToResume,

    #[error("cannot pause: no execution is in progress")]
    NotExecuting,

    #[error(transparent)]
    Loop(#[from] agentrt_loop::LoopError),

    #[error(transparent)]
    Agent(#[from] anyhow::Error),
}
