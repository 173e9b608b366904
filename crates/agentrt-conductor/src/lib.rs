// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The mode conductor: a three-state `Interactive`/`Planning`/`Executing`
//! machine that classifies user intent, owns the plan's lifecycle, exposes
//! the fixed meta-tool set, and drives ready tasks through `agentrt-loop`.
pub mod conductor;
pub mod error;
pub mod events;
pub mod intent;
pub mod meta_tools;
pub mod plan;
pub mod planner;
pub mod state;

pub use conductor::{Conductor, ConductorConfig};
pub use error::ConductorError;
pub use events::{ConductorEvent, TaskProgress};
pub use intent::{ClassifyIntent, HeuristicClassifier, Intent};
pub use meta_tools::{
    MetaSignal, ModifyPlanTool, PlanMutation, ReportProgressTool, RequestApprovalTool, StartPlanningTool, META_TOOL_NAMES,
};
pub use plan::{validate_dag, ConcurrencyHints, Plan, PlanError, PlanStatus, Task, TaskStatus};
pub use planner::{HeuristicPlanGenerator, PlanGenerator, SingleTaskPlanGenerator};
pub use state::Mode;
