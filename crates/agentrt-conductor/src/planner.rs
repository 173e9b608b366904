// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turning a goal utterance into a `Plan`. The generation strategy is
//! implementation-defined; a real deployment would drive this through
//! `agentrt_loop::run` with a planning-mode system prompt and parse the
//! model's task breakdown, but that requires a live `ModelProvider` and is
//! exercised at the facade level. This crate ships the trait boundary plus a
//! deterministic default good enough to drive and test the conductor's plan
//! lifecycle on its own.
use async_trait::async_trait;

use crate::intent::SEQUENCING_MARKERS;
use crate::plan::{Plan, PlanError, Task};

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, goal: &str) -> Result<Plan, PlanError>;
}

/// Splits a goal on the same sequencing markers the intent classifier uses
/// to detect complexity, turning each clause into one task that depends on
/// the clause before it. Falls back to a single task when no marker is
/// found, so `generate` always succeeds for any non-empty goal.
#[derive(Default)]
pub struct HeuristicPlanGenerator;

impl HeuristicPlanGenerator {
    pub fn new() -> Self {
        Self
    }

    fn split_clauses(goal: &str) -> Vec<String> {
        let mut remaining = goal.to_string();
        for marker in SEQUENCING_MARKERS {
            remaining = remaining.replace(marker, "\u{1}");
        }
        remaining
            .split('\u{1}')
            .map(|s| s.trim().trim_matches(',').trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[async_trait]
impl PlanGenerator for HeuristicPlanGenerator {
    async fn generate(&self, goal: &str) -> Result<Plan, PlanError> {
        let clauses = Self::split_clauses(goal);
        let tasks: Vec<Task> = if clauses.is_empty() {
            vec![Task::new("t1", "Complete goal", goal)]
        } else {
            clauses
                .iter()
                .enumerate()
                .map(|(i, clause)| {
                    let id = format!("t{}", i + 1);
                    let name = format!("Step {}", i + 1);
                    let task = Task::new(id, name, clause.clone());
                    if i == 0 {
                        task
                    } else {
                        task.depending_on([format!("t{i}")])
                    }
                })
                .collect()
        };
        Plan::new(goal, tasks)
    }
}

/// Always produces a single task spanning the whole goal. Useful as a
/// minimal stand-in when a caller wants planning-mode semantics (explicit
/// approval, pause/resume) without task decomposition.
pub struct SingleTaskPlanGenerator;

#[async_trait]
impl PlanGenerator for SingleTaskPlanGenerator {
    async fn generate(&self, goal: &str) -> Result<Plan, PlanError> {
        Plan::new(goal, vec![Task::new("t1", "Complete goal", goal)])
    }
}
