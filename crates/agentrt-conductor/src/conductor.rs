// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `Conductor`: routes each user turn through intent classification,
//! owns `Mode` and the (optional) `Plan` exclusively, and drives task
//! execution through `agentrt_loop::run` one ready task at a time. The mode
//! mutex lives inside a dedicated type rather than being threaded through
//! the agent struct, since this crate's job is exactly that state machine.
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};

use agentrt_context::ContextManager;
use agentrt_model::ModelProvider;
use agentrt_tools::{PermissionManager, SessionApprovalCache, ToolRegistry};

use crate::error::ConductorError;
use crate::events::{ConductorEvent, TaskProgress};
use crate::intent::{ClassifyIntent, Intent};
use crate::meta_tools::{
    MetaSignal, ModifyPlanTool, PlanMutation, ReportProgressTool, RequestApprovalTool, StartPlanningTool, META_TOOL_NAMES,
};
use crate::plan::{Plan, PlanStatus, Task, TaskStatus};
use crate::planner::PlanGenerator;
use crate::state::Mode;

/// Maximum characters of a completed task's recorded result folded into a
/// dependent task's prompt, bounding how much context one sub-agent run
/// inherits from earlier ones regardless of how verbose the underlying tool
/// output was: a sub-agent gets a focused prompt, not the full parent
/// transcript.
const MAX_CARRIED_RESULT_CHARS: usize = 2_000;

pub struct ConductorConfig {
    pub max_task_attempts_override: Option<u32>,
    /// Whether a `Complex` intent may open `Planning` mode at all. `false`
    /// keeps the conductor permanently `Interactive`-only, matching
    /// `agentrt_config::ConductorConfig::planning_enabled`.
    pub planning_enabled: bool,
    /// A generated plan whose longest dependency chain exceeds this is
    /// collapsed to a single task spanning the whole goal rather than
    /// rejected outright, so planning still succeeds for an over-deep goal.
    pub max_task_depth: u32,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self { max_task_attempts_override: None, planning_enabled: true, max_task_depth: 3 }
    }
}

impl From<agentrt_config::ConductorConfig> for ConductorConfig {
    fn from(cfg: agentrt_config::ConductorConfig) -> Self {
        Self { max_task_attempts_override: None, planning_enabled: cfg.planning_enabled, max_task_depth: cfg.max_task_depth }
    }
}

/// Routes user turns through intent classification and drives plan
/// execution. Does not own the conversation or tools — those stay with
/// `ContextManager`/`ToolRegistry` per this system's ownership rules; the
/// conductor is handed borrowed references to them for the duration of one
/// call.
pub struct Conductor {
    mode: Mutex<Mode>,
    plan: Mutex<Option<Plan>>,
    classifier: Arc<dyn ClassifyIntent>,
    planner: Arc<dyn PlanGenerator>,
    config: ConductorConfig,
    meta_tx: mpsc::Sender<MetaSignal>,
    meta_rx: Mutex<mpsc::Receiver<MetaSignal>>,
}

impl Conductor {
    pub fn new(classifier: Arc<dyn ClassifyIntent>, planner: Arc<dyn PlanGenerator>, config: ConductorConfig) -> Self {
        let (meta_tx, meta_rx) = mpsc::channel(32);
        Self { mode: Mutex::new(Mode::Interactive), plan: Mutex::new(None), classifier, planner, config, meta_tx, meta_rx: Mutex::new(meta_rx) }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }

    pub fn plan(&self) -> Option<Plan> {
        self.plan.lock().unwrap().clone()
    }

    pub fn task_progress(&self) -> Option<TaskProgress> {
        self.plan.lock().unwrap().as_ref().map(TaskProgress::from_plan)
    }

    /// Restore `mode`/`plan` from a previously-saved session snapshot. The
    /// facade is responsible for deserializing its opaque `agent_state`
    /// field into these two values before calling this.
    pub fn restore_state(&self, mode: Mode, plan: Option<Plan>) {
        *self.mode.lock().unwrap() = mode;
        *self.plan.lock().unwrap() = plan;
    }

    /// Register the fixed meta-tool set, wired to this conductor's signal
    /// channel. Callers must only do this while in `Interactive` mode and
    /// must call [`Self::unregister_meta_tools`] before entering
    /// `Executing`, so the execution agent never sees them.
    pub fn register_meta_tools(&self, tools: &ToolRegistry) -> Result<(), agentrt_tools::RegistryError> {
        tools.register(Arc::new(StartPlanningTool::new(self.meta_tx.clone())), None)?;
        tools.register(Arc::new(ModifyPlanTool::new(self.meta_tx.clone())), None)?;
        tools.register(Arc::new(ReportProgressTool::new(self.meta_tx.clone())), None)?;
        tools.register(Arc::new(RequestApprovalTool::new(self.meta_tx.clone())), None)?;
        Ok(())
    }

    pub fn unregister_meta_tools(&self, tools: &ToolRegistry) {
        for name in META_TOOL_NAMES {
            tools.unregister(name);
        }
    }

    fn transition(&self, to: Mode, events: &mut Vec<ConductorEvent>) {
        let mut mode = self.mode.lock().unwrap();
        let from = *mode;
        if from != to {
            *mode = to;
            events.push(ConductorEvent::ModeChanged { from, to });
        }
    }

    /// Classify and route one user utterance, mutating `mode`/`plan` per the
    /// fixed transition table, and returning the sequence of events that
    /// occurred (for the facade to surface or log).
    #[instrument(skip(self, utterance))]
    pub async fn route_turn(&self, utterance: &str) -> Result<Vec<ConductorEvent>, ConductorError> {
        let mut events = Vec::new();
        let mode = self.mode();
        let intent = self.classifier.classify(utterance, mode);
        events.push(ConductorEvent::IntentClassified(intent));

        match (mode, intent) {
            (Mode::Interactive, Intent::Complex) if self.config.planning_enabled => {
                let plan = self.plan_within_depth_limit(utterance).await?;
                events.push(ConductorEvent::PlanCreated { goal: plan.goal.clone(), task_count: plan.tasks.len() });
                *self.plan.lock().unwrap() = Some(plan);
                self.transition(Mode::Planning, &mut events);
                events.push(ConductorEvent::PlanAwaitingApproval);
            }
            (Mode::Planning, Intent::Approval) => {
                {
                    let mut guard = self.plan.lock().unwrap();
                    let plan = guard.as_mut().ok_or(ConductorError::NoPendingPlan)?;
                    plan.status = PlanStatus::Approved;
                }
                self.transition(Mode::Executing { paused: false }, &mut events);
            }
            (Mode::Planning, Intent::Rejection) => {
                events.push(ConductorEvent::PlanAwaitingApproval);
            }
            (Mode::Planning, Intent::PlanModify) => {
                events.push(ConductorEvent::PlanAwaitingApproval);
            }
            (Mode::Executing { paused: false }, Intent::Interrupt) => {
                self.transition(Mode::Executing { paused: true }, &mut events);
                if let Some(progress) = self.task_progress() {
                    events.push(ConductorEvent::ExecutionPaused { completed: progress.completed, total: progress.total });
                }
            }
            (Mode::Executing { paused: true }, Intent::Approval) => {
                self.transition(Mode::Executing { paused: false }, &mut events);
                events.push(ConductorEvent::ExecutionResumed);
            }
            _ => {}
        }

        Ok(events)
    }

    /// Pause an in-progress execution: `Executing { paused: false } ->
    /// Executing { paused: true }`. Idempotent if already paused. Errors with
    /// `ConductorError::NotExecuting` outside `Executing` entirely. Called
    /// directly by the facade's `Agent::pause()`, bypassing intent
    /// classification since pausing is not itself a classified utterance.
    pub fn pause(&self) -> Result<(), ConductorError> {
        match self.mode() {
            Mode::Executing { paused: true } => Ok(()),
            Mode::Executing { paused: false } => {
                let mut events = Vec::new();
                self.transition(Mode::Executing { paused: true }, &mut events);
                Ok(())
            }
            _ => Err(ConductorError::NotExecuting),
        }
    }

    /// Cancel whatever plan exists, regardless of mode, and return to
    /// `Interactive`. Matches the "any -> interactive on cancel" row of the
    /// transition table.
    pub fn cancel(&self) -> Vec<ConductorEvent> {
        let mut events = Vec::new();
        if let Some(plan) = self.plan.lock().unwrap().as_mut() {
            plan.status = PlanStatus::Cancelled;
            events.push(ConductorEvent::PlanCancelled);
        }
        self.transition(Mode::Interactive, &mut events);
        events
    }

    /// Drain meta-tool signals emitted since the last call, applying
    /// `StartPlanning`/`ModifyPlan` directly (these don't need model-turn
    /// framing) and returning `ReportProgress`/`RequestApproval` payloads for
    /// the caller to surface to the user.
    pub async fn drain_meta_signals(&self) -> Result<Vec<ConductorEvent>, ConductorError> {
        let mut events = Vec::new();
        let mut rx = self.meta_rx.lock().unwrap();
        while let Ok(signal) = rx.try_recv() {
            match signal {
                MetaSignal::StartPlanning { goal } if self.config.planning_enabled => {
                    let plan = self.plan_within_depth_limit(&goal).await?;
                    events.push(ConductorEvent::PlanCreated { goal: plan.goal.clone(), task_count: plan.tasks.len() });
                    *self.plan.lock().unwrap() = Some(plan);
                    self.transition(Mode::Planning, &mut events);
                    events.push(ConductorEvent::PlanAwaitingApproval);
                }
                MetaSignal::StartPlanning { .. } => {}
                MetaSignal::ModifyPlan(mutation) => {
                    self.apply_mutation(mutation)?;
                }
                MetaSignal::ReportProgress { message } => {
                    info!(message, "report_progress");
                }
                MetaSignal::RequestApproval { .. } => {
                    events.push(ConductorEvent::PlanAwaitingApproval);
                }
            }
        }
        Ok(events)
    }

    /// Apply a plan mutation. Only valid while a plan exists and execution is
    /// not actively running (i.e. `Planning`, or `Executing { paused: true
    /// }`), matching the "pause, apply, resume" rule.
    pub fn apply_mutation(&self, mutation: PlanMutation) -> Result<(), ConductorError> {
        let mode = self.mode();
        if mode.is_executing() && !mode.is_paused() {
            return Err(ConductorError::NotPaused);
        }
        let mut guard = self.plan.lock().unwrap();
        let plan = guard.as_mut().ok_or(ConductorError::NoPendingPlan)?;
        match mutation {
            PlanMutation::AddTask { id, name, description, depends_on } => {
                plan.add_task(Task::new(id, name, description).depending_on(depends_on))?;
            }
            PlanMutation::RemoveTask { id } => plan.remove_task(&id)?,
            PlanMutation::SkipTask { id } => plan.skip_task(&id)?,
            PlanMutation::UpdateTask { id, description } => plan.update_task(&id, description)?,
        }
        Ok(())
    }

    /// Generate a plan for `goal`, collapsing it to a single task spanning
    /// the whole goal if the generator's dependency chain runs deeper than
    /// `config.max_task_depth` — matches `agentrt_config::ConductorConfig`'s
    /// `max_task_depth` knob without failing planning outright for an
    /// over-decomposed goal.
    async fn plan_within_depth_limit(&self, goal: &str) -> Result<Plan, ConductorError> {
        let plan = self.planner.generate(goal).await?;
        if plan.depth() as u32 > self.config.max_task_depth {
            warn!(goal, depth = plan.depth(), limit = self.config.max_task_depth, "plan exceeds max task depth, collapsing to one task");
            return Ok(Plan::new(goal, vec![Task::new("t1", "Complete goal", goal)])?);
        }
        Ok(plan)
    }

    fn task_prompt(goal: &str, task: &Task, plan: &Plan) -> String {
        let mut carried = String::new();
        for dep_id in &task.depends_on {
            if let Some(dep) = plan.task(dep_id) {
                if let Some(result) = &dep.result {
                    let truncated: String = result.chars().take(MAX_CARRIED_RESULT_CHARS).collect();
                    carried.push_str(&format!("\n- {} ({}): {}", dep.name, dep.id, truncated));
                }
            }
        }
        format!(
            "Overall goal: {goal}\n\nYour task: {} — {}\n\nContext from completed prerequisite tasks:{}",
            task.name,
            task.description,
            if carried.is_empty() { " none" } else { &carried }
        )
    }

    /// Drive execution of every ready task in the current plan to
    /// completion, pause, or cancellation. Each task is run through
    /// `agentrt_loop::run` against `context`/`tools`: a focused prompt built
    /// from the goal plus prior tasks' results, run to completion, with the
    /// text output recorded as the task's `result`.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all)]
    pub async fn run_plan(
        &self,
        context: &ContextManager,
        tools: &ToolRegistry,
        provider: &dyn ModelProvider,
        permission_manager: &dyn PermissionManager,
        approval_cache: &SessionApprovalCache,
        loop_config: &agentrt_loop::IterationConfig,
        events_tx: &mpsc::Sender<ConductorEvent>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(), ConductorError> {
        loop {
            if *cancel.borrow() {
                return Ok(());
            }
            if self.mode().is_paused() {
                return Ok(());
            }

            let goal = match self.plan.lock().unwrap().as_ref() {
                Some(p) => p.goal.clone(),
                None => return Err(ConductorError::NoPendingPlan),
            };

            let ready_ids: Vec<String> = {
                let guard = self.plan.lock().unwrap();
                let plan = guard.as_ref().ok_or(ConductorError::NoPendingPlan)?;
                plan.ready_tasks().into_iter().map(|t| t.id.clone()).collect()
            };

            if ready_ids.is_empty() {
                let all_terminal = self.plan.lock().unwrap().as_ref().map(|p| p.all_terminal()).unwrap_or(true);
                if all_terminal {
                    if let Some(plan) = self.plan.lock().unwrap().as_mut() {
                        plan.status = PlanStatus::Completed;
                    }
                    let mut done_events = Vec::new();
                    self.transition(Mode::Interactive, &mut done_events);
                    done_events.push(ConductorEvent::ExecutionComplete);
                    for event in done_events {
                        let _ = events_tx.send(event).await;
                    }
                }
                return Ok(());
            }

            for task_id in ready_ids {
                if *cancel.borrow() || self.mode().is_paused() {
                    return Ok(());
                }

                let (prompt, max_attempts) = {
                    let guard = self.plan.lock().unwrap();
                    let plan = guard.as_ref().ok_or(ConductorError::NoPendingPlan)?;
                    let task = plan.task(&task_id).ok_or_else(|| crate::plan::PlanError::NoSuchTask(task_id.clone()))?;
                    (Self::task_prompt(&goal, task, plan), self.config.max_task_attempts_override.unwrap_or(task.max_attempts))
                };

                {
                    let mut guard = self.plan.lock().unwrap();
                    let plan = guard.as_mut().ok_or(ConductorError::NoPendingPlan)?;
                    if let Some(task) = plan.task_mut(&task_id) {
                        task.status = TaskStatus::InProgress;
                        task.attempts += 1;
                    }
                }
                let _ = events_tx.send(ConductorEvent::TaskStarted { id: task_id.clone() }).await;

                context.set_current_input_user_message(agentrt_model::Message::user(prompt));
                // `run` below sends events via a bounded channel and awaits backpressure on a
                // full queue; draining only has to start concurrently with `run`, not finish
                // before it, so a turn that emits more than the channel's capacity in events
                // (many TextDeltas) can't block `run` forever waiting for a reader that only
                // shows up after it returns.
                let (inner_tx, mut inner_rx) = mpsc::channel(64);
                let collector = tokio::spawn(async move {
                    let mut final_text = String::new();
                    while let Some(event) = inner_rx.recv().await {
                        if let agentrt_loop::LoopEvent::TextDelta(delta) = event {
                            final_text.push_str(&delta);
                        }
                    }
                    final_text
                });
                let run_result =
                    agentrt_loop::run(context, tools, provider, permission_manager, approval_cache, loop_config, inner_tx, cancel.clone()).await;
                let final_text = collector.await.unwrap_or_default();

                let mut guard = self.plan.lock().unwrap();
                let plan = guard.as_mut().ok_or(ConductorError::NoPendingPlan)?;
                let task = plan.task_mut(&task_id).ok_or_else(|| crate::plan::PlanError::NoSuchTask(task_id.clone()))?;
                match run_result {
                    Ok(outcome) if outcome.finish_reason != agentrt_model::FinishReason::Cancelled => {
                        task.status = TaskStatus::Completed;
                        task.result = Some(final_text);
                        drop(guard);
                        let _ = events_tx.send(ConductorEvent::TaskCompleted { id: task_id.clone() }).await;
                    }
                    Ok(_) => {
                        // cancelled mid-run: leave it pending for a future resume, don't burn an attempt
                        task.status = TaskStatus::Pending;
                        task.attempts -= 1;
                        drop(guard);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(task = %task_id, error = %e, "task execution failed");
                        if task.attempts >= max_attempts {
                            task.status = TaskStatus::Skipped;
                            drop(guard);
                            let _ = events_tx.send(ConductorEvent::TaskSkippedAfterMaxAttempts { id: task_id.clone() }).await;
                        } else {
                            task.status = TaskStatus::Pending;
                            drop(guard);
                            let _ = events_tx.send(ConductorEvent::TaskFailed { id: task_id.clone(), error: e.to_string() }).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::HeuristicClassifier;
    use crate::planner::HeuristicPlanGenerator;
    use agentrt_context::{ContextConfig, StructuredStrategy};
    use agentrt_model::mock::MockProvider;
    use agentrt_tools::policy::PermissionDecision;
    use async_trait::async_trait;

    struct AllowAll;
    #[async_trait]
    impl PermissionManager for AllowAll {
        async fn ask(&self, _tool_name: &str, _arguments: &serde_json::Value) -> PermissionDecision {
            PermissionDecision::AllowOnce
        }
    }

    fn conductor() -> Conductor {
        Conductor::new(Arc::new(HeuristicClassifier::new()), Arc::new(HeuristicPlanGenerator::new()), ConductorConfig::default())
    }

    #[tokio::test]
    async fn simple_intent_stays_interactive_with_no_plan() {
        let c = conductor();
        let events = c.route_turn("what time is it").await.unwrap();
        assert_eq!(c.mode(), Mode::Interactive);
        assert!(c.plan().is_none());
        assert!(matches!(events[0], ConductorEvent::IntentClassified(Intent::Simple)));
    }

    #[tokio::test]
    async fn complex_intent_creates_plan_and_enters_planning() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        assert_eq!(c.mode(), Mode::Planning);
        assert!(c.plan().is_some());
    }

    #[tokio::test]
    async fn approval_in_planning_enters_executing() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes, looks good").await.unwrap();
        assert_eq!(c.mode(), Mode::Executing { paused: false });
        assert_eq!(c.plan().unwrap().status, PlanStatus::Approved);
    }

    #[tokio::test]
    async fn interrupt_pauses_execution_and_resume_restarts_it() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes").await.unwrap();
        c.route_turn("stop").await.unwrap();
        assert!(c.mode().is_paused());
        c.route_turn("resume").await.unwrap();
        assert_eq!(c.mode(), Mode::Executing { paused: false });
    }

    #[tokio::test]
    async fn pause_transitions_executing_to_paused() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes").await.unwrap();
        assert_eq!(c.mode(), Mode::Executing { paused: false });
        c.pause().unwrap();
        assert_eq!(c.mode(), Mode::Executing { paused: true });
    }

    #[tokio::test]
    async fn pause_is_idempotent_when_already_paused() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes").await.unwrap();
        c.pause().unwrap();
        c.pause().unwrap();
        assert_eq!(c.mode(), Mode::Executing { paused: true });
    }

    #[tokio::test]
    async fn pause_outside_execution_errors() {
        let c = conductor();
        let err = c.pause().unwrap_err();
        assert!(matches!(err, ConductorError::NotExecuting));
    }

    #[tokio::test]
    async fn cancel_marks_plan_cancelled_and_returns_to_interactive() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        let events = c.cancel();
        assert_eq!(c.mode(), Mode::Interactive);
        assert!(events.iter().any(|e| matches!(e, ConductorEvent::PlanCancelled)));
        assert_eq!(c.plan().unwrap().status, PlanStatus::Cancelled);
    }

    #[tokio::test]
    async fn meta_tool_registration_is_absent_from_execution_tool_set() {
        let c = conductor();
        let tools = ToolRegistry::new();
        c.register_meta_tools(&tools).unwrap();
        assert_eq!(tools.get_enabled().iter().filter(|d| META_TOOL_NAMES.contains(&d.name.as_str())).count(), 4);
        c.unregister_meta_tools(&tools);
        assert_eq!(tools.get_enabled().iter().filter(|d| META_TOOL_NAMES.contains(&d.name.as_str())).count(), 0);
    }

    #[tokio::test]
    async fn mutation_rejected_while_executing_unpaused() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes").await.unwrap();
        let err = c.apply_mutation(PlanMutation::SkipTask { id: "t1".into() }).unwrap_err();
        assert!(matches!(err, ConductorError::NotPaused));
    }

    #[tokio::test]
    async fn mutation_allowed_while_paused() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes").await.unwrap();
        c.route_turn("stop").await.unwrap();
        c.apply_mutation(PlanMutation::SkipTask { id: "t1".into() }).unwrap();
        assert_eq!(c.plan().unwrap().task("t1").unwrap().status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn complex_intent_stays_interactive_when_planning_disabled() {
        let c = Conductor::new(
            Arc::new(HeuristicClassifier::new()),
            Arc::new(HeuristicPlanGenerator::new()),
            ConductorConfig { planning_enabled: false, ..ConductorConfig::default() },
        );
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        assert_eq!(c.mode(), Mode::Interactive);
        assert!(c.plan().is_none());
    }

    #[tokio::test]
    async fn plan_deeper_than_max_task_depth_collapses_to_one_task() {
        let c = Conductor::new(
            Arc::new(HeuristicClassifier::new()),
            Arc::new(HeuristicPlanGenerator::new()),
            ConductorConfig { max_task_depth: 1, ..ConductorConfig::default() },
        );
        c.route_turn("search for X and then email the results to Y and then notify Z").await.unwrap();
        let plan = c.plan().unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.depth(), 1);
    }

    #[tokio::test]
    async fn run_plan_executes_tasks_in_dependency_order_to_completion() {
        let c = conductor();
        c.route_turn("search for X and then email the results to Y").await.unwrap();
        c.route_turn("yes").await.unwrap();

        let tools = Arc::new(ToolRegistry::new());
        let ctx = ContextManager::new("you are an agent", vec![], Arc::new(StructuredStrategy), tools.clone(), ContextConfig { max_tokens: 50_000, response_reserve: 1_000 }).unwrap();
        let provider = MockProvider::new();
        let (tx, _rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let loop_config = agentrt_loop::IterationConfig::default();

        c.run_plan(&ctx, &tools, &provider, &AllowAll, &SessionApprovalCache::default(), &loop_config, &tx, &cancel_rx).await.unwrap();

        let plan = c.plan().unwrap();
        assert!(plan.all_terminal());
        assert_eq!(plan.completed_tasks().len(), plan.tasks.len());
    }
}
