// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The three-state mode machine: `Interactive` (default) / `Planning` /
//! `Executing` — read-only conversation, plan drafting, and task execution.
use serde::{Deserialize, Serialize};

/// The conductor's current mode. `Executing` carries its own `paused` flag
/// rather than a fourth state, because a paused execution is still the
/// execution state with work in flight — the transition table routes
/// "interrupt"/"resume" as self-loops on `Executing`, not as a trip back out
/// to `Interactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Mode {
    Interactive,
    Planning,
    Executing { paused: bool },
}

impl Mode {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Mode::Interactive)
    }

    pub fn is_planning(&self) -> bool {
        matches!(self, Mode::Planning)
    }

    pub fn is_executing(&self) -> bool {
        matches!(self, Mode::Executing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Mode::Executing { paused: true })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Interactive => "interactive",
            Mode::Planning => "planning",
            Mode::Executing { paused: false } => "executing",
            Mode::Executing { paused: true } => "executing_paused",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Interactive
    }
}
