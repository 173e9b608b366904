// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The plan/task DAG: `Plan { goal, tasks, status, concurrency_hints }`,
//! `Task { id, name, description, depends_on, status, attempts,
//! max_attempts, expected_output, result }`, and DAG validation. Naming
//! follows the `validate_dependency_graph`/topological-order convention
//! seen across the retrieved orchestrator examples' task schedulers.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    /// A task is "terminal-successful" only when `Completed` — `Skipped` and
    /// `Cancelled` are terminal but do not satisfy a dependent task's
    /// readiness check.
    pub fn is_terminal_successful(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expected_output: Option<String>,
    pub result: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            expected_output: None,
            result: None,
        }
    }

    pub fn depending_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConcurrencyHints {
    /// Hint only — the conductor is free to run tasks sequentially even
    /// when this is `true`. Set when the planner judged independent tasks
    /// safe to fan out.
    pub parallelizable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    AwaitingApproval,
    Approved,
    Executing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub tasks: Vec<Task>,
    pub status: PlanStatus,
    pub concurrency_hints: ConcurrencyHints,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("dependency cycle detected involving task '{0}'")]
    CyclicDependency(String),
    #[error("task '{0}' depends on unknown task '{1}'")]
    UnknownDependency(String, String),
    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),
    #[error("no task with id '{0}'")]
    NoSuchTask(String),
}

impl Plan {
    pub fn new(goal: impl Into<String>, tasks: Vec<Task>) -> Result<Self, PlanError> {
        validate_dag(&tasks)?;
        Ok(Self { goal: goal.into(), tasks, status: PlanStatus::Draft, concurrency_hints: ConcurrencyHints::default() })
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// All tasks that are `Pending` and whose every dependency is
    /// `Completed` — the set the conductor may start next, in no particular
    /// order (callers decide sequencing/fan-out policy).
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.depends_on.iter().all(|dep| self.task(dep).map(|d| d.status.is_terminal_successful()).unwrap_or(false))
            })
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn completed_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect()
    }

    /// Length of the longest dependency chain, counting a task with no
    /// dependencies as depth 1. Assumes `self.tasks` is already a validated
    /// DAG (memoizes per call, not across mutations).
    pub fn depth(&self) -> usize {
        fn depth_of<'a>(id: &'a str, plan: &'a Plan, memo: &mut HashMap<&'a str, usize>) -> usize {
            if let Some(d) = memo.get(id) {
                return *d;
            }
            let d = match plan.task(id) {
                Some(task) if task.depends_on.is_empty() => 1,
                Some(task) => 1 + task.depends_on.iter().map(|dep| depth_of(dep, plan, memo)).max().unwrap_or(0),
                None => 1,
            };
            memo.insert(id, d);
            d
        }
        let mut memo = HashMap::new();
        self.tasks.iter().map(|t| depth_of(&t.id, self, &mut memo)).max().unwrap_or(0)
    }

    // ─── Mutations (applied only while execution is paused) ───────────────

    pub fn add_task(&mut self, task: Task) -> Result<(), PlanError> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(PlanError::DuplicateTaskId(task.id));
        }
        let mut candidate = self.tasks.clone();
        candidate.push(task.clone());
        validate_dag(&candidate)?;
        self.tasks.push(task);
        Ok(())
    }

    pub fn remove_task(&mut self, id: &str) -> Result<(), PlanError> {
        if !self.tasks.iter().any(|t| t.id == id) {
            return Err(PlanError::NoSuchTask(id.to_string()));
        }
        self.tasks.retain(|t| t.id != id);
        for t in &mut self.tasks {
            t.depends_on.retain(|dep| dep != id);
        }
        Ok(())
    }

    pub fn skip_task(&mut self, id: &str) -> Result<(), PlanError> {
        let task = self.task_mut(id).ok_or_else(|| PlanError::NoSuchTask(id.to_string()))?;
        task.status = TaskStatus::Skipped;
        Ok(())
    }

    pub fn update_task(&mut self, id: &str, description: impl Into<String>) -> Result<(), PlanError> {
        let task = self.task_mut(id).ok_or_else(|| PlanError::NoSuchTask(id.to_string()))?;
        task.description = description.into();
        Ok(())
    }
}

/// Validate that `tasks` forms a DAG: every `depends_on` id resolves to a
/// task in the same set, ids are unique, and no cycle exists. Uses
/// three-color DFS (white/gray/black) so a cycle is reported as soon as a
/// back-edge to a gray (in-progress) node is found.
pub fn validate_dag(tasks: &[Task]) -> Result<(), PlanError> {
    let mut seen_ids = HashSet::new();
    for t in tasks {
        if !seen_ids.insert(t.id.as_str()) {
            return Err(PlanError::DuplicateTaskId(t.id.clone()));
        }
    }

    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    for t in tasks {
        for dep in &t.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                return Err(PlanError::UnknownDependency(t.id.clone(), dep.clone()));
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<&str, Color> = tasks.iter().map(|t| (t.id.as_str(), Color::White)).collect();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Task>,
        colors: &mut HashMap<&'a str, Color>,
    ) -> Result<(), PlanError> {
        match colors.get(id) {
            Some(Color::Black) => return Ok(()),
            Some(Color::Gray) => return Err(PlanError::CyclicDependency(id.to_string())),
            _ => {}
        }
        colors.insert(id, Color::Gray);
        if let Some(task) = by_id.get(id) {
            for dep in &task.depends_on {
                visit(dep, by_id, colors)?;
            }
        }
        colors.insert(id, Color::Black);
        Ok(())
    }

    for t in tasks {
        visit(&t.id, &by_id, &mut colors)?;
    }
    Ok(())
}
