// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `Agent` facade: wires `ContextManager` + `ToolRegistry` +
//! `Conductor` + `Storage` + `ModelProvider` + `PermissionManager` into the
//! single external surface a caller sees. Owns a session, drives the model
//! <-> tool loop, and delegates mode routing to its `Conductor`.
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{instrument, warn};

use agentrt_conductor::{
    ClassifyIntent, Conductor, ConductorConfig as InnerConductorConfig, HeuristicClassifier, HeuristicPlanGenerator, Mode,
    Plan, PlanGenerator, PlanStatus, TaskProgress,
};
use agentrt_context::{ContextConfig, ContextManager, StructuredStrategy};
use agentrt_loop::IterationConfig;
use agentrt_model::{Message, ModelProvider, Usage};
use agentrt_session::{SessionSnapshot, Storage};
use agentrt_tools::{PermissionManager, SessionApprovalCache, Tool, ToolRegistry};

use crate::error::AgentError;
use crate::response::{UniversalResponse, UserActionType};

/// Caller-supplied collaborators and config for one agent instance.
pub struct AgentConfig {
    pub system_prompt: String,
    pub provider: Arc<dyn ModelProvider>,
    pub permission_manager: Arc<dyn PermissionManager>,
    pub storage: Arc<dyn Storage>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub runtime: agentrt_config::RuntimeConfig,
}

/// The conductor's mode/plan, the only part of an agent's state this crate
/// cannot serialize itself (see `SessionSnapshot::agent_state`'s doc
/// comment) — this facade is where `Mode`/`Plan` and the opaque JSON value
/// finally meet.
#[derive(serde::Serialize, serde::Deserialize)]
struct ConductorState {
    mode: Mode,
    plan: Option<Plan>,
}

pub struct Agent {
    session_id: String,
    system_prompt: String,
    context: ContextManager,
    tools: Arc<ToolRegistry>,
    conductor: Conductor,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn ModelProvider>,
    permission_manager: Arc<dyn PermissionManager>,
    approval_cache: SessionApprovalCache,
    loop_config: IterationConfig,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    /// Serializes `chat`/`stream` calls against `pause`/`cancel`/`destroy` so
    /// two turns never race on the same conversation tail.
    turn_lock: AsyncMutex<()>,
    destroyed: std::sync::atomic::AtomicBool,
}

impl Agent {
    /// Build a brand-new agent with an empty conversation.
    #[instrument(skip(config), fields(session_id = %session_id.as_ref()))]
    pub fn create(session_id: impl AsRef<str>, config: AgentConfig) -> Result<Self, AgentError> {
        let tools = Arc::new(ToolRegistry::new());
        tools.set_default_timeout(std::time::Duration::from_secs(config.runtime.loop_cfg.default_tool_timeout_secs));
        for tool in config.tools {
            tools.register(tool, None)?;
        }

        let context = ContextManager::new(
            config.system_prompt.clone(),
            vec![],
            Arc::new(StructuredStrategy),
            tools.clone(),
            ContextConfig {
                max_tokens: config.runtime.budget.max_tokens,
                response_reserve: config.runtime.budget.response_reserve,
            },
        )?;
        context.set_compaction_threshold(config.runtime.budget.compaction_threshold);

        let classifier: Arc<dyn ClassifyIntent> = Arc::new(HeuristicClassifier::new());
        let planner: Arc<dyn PlanGenerator> = Arc::new(HeuristicPlanGenerator::new());
        let conductor = Conductor::new(classifier, planner, InnerConductorConfig::from(config.runtime.conductor.clone()));
        conductor.register_meta_tools(&tools)?;

        let loop_config = IterationConfig {
            max_iterations: config.runtime.loop_cfg.max_iterations,
            tool_result_token_cap: config.runtime.loop_cfg.tool_result_token_cap,
            ..IterationConfig::default()
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);

        Ok(Self {
            session_id: session_id.as_ref().to_string(),
            system_prompt: config.system_prompt,
            context,
            tools,
            conductor,
            storage: config.storage,
            provider: config.provider,
            permission_manager: config.permission_manager,
            approval_cache: SessionApprovalCache::new(std::time::Duration::from_secs(config.runtime.conductor.session_approval_ttl_secs)),
            loop_config,
            cancel_tx,
            cancel_rx,
            turn_lock: AsyncMutex::new(()),
            destroyed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Load a previously-saved session and resume it. Restores the
    /// conversation, the conductor's mode/plan, and re-registers meta-tools
    /// only if the restored mode is `Interactive` (mirroring `create`'s
    /// invariant that meta-tools are absent exactly while executing).
    #[instrument(skip(config), fields(session_id = %session_id.as_ref()))]
    pub async fn resume(session_id: impl AsRef<str>, config: AgentConfig) -> Result<Self, AgentError> {
        let session_id = session_id.as_ref().to_string();
        let snapshot = config
            .storage
            .load(&session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.clone()))?;

        let mut agent = Self::create(&session_id, config)?;
        agent.context.restore_conversation(snapshot.conversation);

        let state: ConductorState = serde_json::from_value(snapshot.agent_state).unwrap_or(ConductorState { mode: Mode::Interactive, plan: None });
        agent.conductor.restore_state(state.mode, state.plan);
        if !state.mode.is_interactive() {
            agent.conductor.unregister_meta_tools(&agent.tools);
        }

        Ok(agent)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> Mode {
        self.conductor.mode()
    }

    pub fn plan(&self) -> Option<Plan> {
        self.conductor.plan()
    }

    /// Fire the cancellation signal. At most one more LLM iteration may
    /// begin afterward and no new tool invocation may start; enforced inside
    /// `agentrt_loop::run`/`ToolRegistry::execute`, not here.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Pause an in-progress plan execution. Errors if no execution is
    /// running; idempotent if already paused.
    pub fn pause(&self) -> Result<(), AgentError> {
        self.conductor.pause()?;
        Ok(())
    }

    /// Resume a paused plan execution.
    pub async fn resume_run(&self) -> Result<UniversalResponse, AgentError> {
        self.chat("resume").await
    }

    /// Irreversibly mark this agent as destroyed. Subsequent `chat`/`stream`
    /// calls return `AgentError::Destroyed`. Does not delete the persisted
    /// session — callers that want that call `Storage::delete` themselves.
    pub fn destroy(&self) {
        self.cancel();
        self.destroyed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_alive(&self) -> Result<(), AgentError> {
        if self.destroyed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AgentError::Destroyed);
        }
        Ok(())
    }

    /// Persist the current conversation + conductor state. Auto-save
    /// failures (called from `chat`) are logged and swallowed; an explicit
    /// call surfaces the error to the caller.
    pub async fn save(&self) -> Result<(), AgentError> {
        let state = ConductorState { mode: self.conductor.mode(), plan: self.conductor.plan() };
        let snapshot = SessionSnapshot {
            session_id: self.session_id.clone(),
            conversation: self.context.conversation_snapshot(),
            plugin_states: std::collections::HashMap::new(),
            system_prompt: self.system_prompt.clone(),
            agent_state: serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
            metadata: std::collections::HashMap::new(),
        };
        self.storage.save(&self.session_id, &snapshot).await?;
        Ok(())
    }

    async fn autosave(&self) {
        if let Err(e) = self.save().await {
            warn!(error = %e, session_id = %self.session_id, "autosave failed");
        }
    }

    /// Run one full turn and return the aggregated `UniversalResponse`, with
    /// mode routing delegated to the conductor up front.
    #[instrument(skip(self, input), fields(session_id = %self.session_id))]
    pub async fn chat(&self, input: &str) -> Result<UniversalResponse, AgentError> {
        self.check_alive()?;
        let _guard = self.turn_lock.lock().await;

        self.conductor.route_turn(input).await?;

        let response = match self.conductor.mode() {
            Mode::Planning => self.respond_with_plan_summary(),
            Mode::Executing { paused: true } => self.respond_paused(),
            Mode::Executing { paused: false } => self.drive_execution().await?,
            Mode::Interactive => self.drive_interactive_turn(input).await?,
        };

        self.autosave().await;
        Ok(response)
    }

    /// Stream one turn's `LoopEvent`s live instead of waiting for the final
    /// `UniversalResponse`. Only meaningful in `Interactive`/`Executing`
    /// modes — `Planning` has no model turn to stream, so the channel closes
    /// immediately carrying nothing.
    pub async fn stream(&self, input: &str) -> Result<mpsc::Receiver<agentrt_loop::LoopEvent>, AgentError> {
        self.check_alive()?;
        self.conductor.route_turn(input).await?;
        let (tx, rx) = mpsc::channel(256);

        match self.conductor.mode() {
            Mode::Interactive => {
                self.context.set_current_input_user_message(Message::user(input));
                agentrt_loop::run(
                    &self.context,
                    &self.tools,
                    self.provider.as_ref(),
                    self.permission_manager.as_ref(),
                    &self.approval_cache,
                    &self.loop_config,
                    tx,
                    self.cancel_rx.clone(),
                )
                .await?;
            }
            _ => drop(tx),
        }
        self.autosave().await;
        Ok(rx)
    }

    async fn drive_interactive_turn(&self, input: &str) -> Result<UniversalResponse, AgentError> {
        self.context.set_current_input_user_message(Message::user(input));
        // Drain concurrently with `run`, not after it returns: `run` sends events over this
        // bounded channel and awaits backpressure on a full queue, so a turn emitting more
        // deltas than the channel's capacity would otherwise block `run` forever waiting for
        // a reader that only starts once it's done.
        let (tx, rx) = mpsc::channel(256);
        let collector = tokio::spawn(async move {
            let mut rx = rx;
            let mut text = String::new();
            while let Some(event) = rx.recv().await {
                if let agentrt_loop::LoopEvent::TextDelta(delta) = event {
                    text.push_str(&delta);
                }
            }
            text
        });
        let outcome = agentrt_loop::run(
            &self.context,
            &self.tools,
            self.provider.as_ref(),
            self.permission_manager.as_ref(),
            &self.approval_cache,
            &self.loop_config,
            tx,
            self.cancel_rx.clone(),
        )
        .await?;

        let text = collector.await.unwrap_or_default();
        self.conductor.drain_meta_signals().await?;

        let mode = self.conductor.mode();
        if mode.is_planning() {
            return Ok(self.response_for(self.plan_summary_text(), mode, Some(outcome.usage)));
        }

        Ok(self.response_for(text, mode, Some(outcome.usage)))
    }

    async fn drive_execution(&self) -> Result<UniversalResponse, AgentError> {
        self.conductor.unregister_meta_tools(&self.tools);
        // `run_plan` only borrows `tx`, so the channel doesn't close on its own when it
        // returns; the collector below has to drain concurrently rather than afterward, or a
        // plan emitting more events than the channel's capacity would deadlock `run_plan` on
        // a full queue with no reader yet listening.
        let (tx, rx) = mpsc::channel(256);
        let collector = tokio::spawn(async move {
            let mut rx = rx;
            let mut last_completed_task: Option<String> = None;
            while let Some(event) = rx.recv().await {
                if let agentrt_conductor::ConductorEvent::TaskCompleted { id } = event {
                    last_completed_task = Some(id);
                }
            }
            last_completed_task
        });
        self.conductor
            .run_plan(
                &self.context,
                &self.tools,
                self.provider.as_ref(),
                self.permission_manager.as_ref(),
                &self.approval_cache,
                &self.loop_config,
                &tx,
                &self.cancel_rx,
            )
            .await?;
        drop(tx);

        let last_completed_task = collector.await.unwrap_or_default();

        let mode = self.conductor.mode();
        if mode.is_interactive() {
            // plan finished (or was cancelled mid-run back to interactive); meta-tools
            // are absent from the registry right now, put them back for the next turn.
            let _ = self.conductor.register_meta_tools(&self.tools);
        }

        let text = match (&last_completed_task, self.conductor.plan()) {
            (Some(id), Some(plan)) => plan
                .task(id)
                .and_then(|t| t.result.clone())
                .unwrap_or_else(|| format!("task '{id}' completed")),
            _ => String::new(),
        };

        Ok(self.response_for(text, mode, None))
    }

    fn respond_with_plan_summary(&self) -> UniversalResponse {
        self.response_for(self.plan_summary_text(), self.conductor.mode(), None)
    }

    fn respond_paused(&self) -> UniversalResponse {
        self.response_for(String::new(), self.conductor.mode(), None)
    }

    fn plan_summary_text(&self) -> String {
        match self.conductor.plan() {
            Some(plan) => {
                let steps: Vec<String> = plan.tasks.iter().map(|t| format!("- {} ({})", t.name, t.id)).collect();
                format!("Proposed plan for: {}\n{}", plan.goal, steps.join("\n"))
            }
            None => String::new(),
        }
    }

    fn response_for(&self, text: String, mode: Mode, usage: Option<Usage>) -> UniversalResponse {
        let plan = self.conductor.plan();
        let plan_status = plan.as_ref().map(|p| p.status);
        let task_progress = plan.as_ref().map(TaskProgress::from_plan);
        let (needs_user_action, user_action_type) = match (mode, &plan_status) {
            (Mode::Planning, Some(PlanStatus::Draft) | Some(PlanStatus::AwaitingApproval)) => (true, Some(UserActionType::ApprovePlan)),
            (Mode::Executing { paused: true }, _) => (true, Some(UserActionType::ResumeExecution)),
            _ => (false, None),
        };

        UniversalResponse { text, mode, plan, plan_status, task_progress, usage, needs_user_action, user_action_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_model::mock::MockProvider;
    use agentrt_session::InMemoryStorage;
    use agentrt_tools::policy::PermissionDecision;
    use async_trait::async_trait;

    struct AllowAll;
    #[async_trait]
    impl PermissionManager for AllowAll {
        async fn ask(&self, _tool_name: &str, _arguments: &serde_json::Value) -> PermissionDecision {
            PermissionDecision::AllowOnce
        }
    }

    fn config(storage: Arc<dyn Storage>) -> AgentConfig {
        AgentConfig {
            system_prompt: "you are a helpful agent".to_string(),
            provider: Arc::new(MockProvider::new()),
            permission_manager: Arc::new(AllowAll),
            storage,
            tools: vec![],
            runtime: agentrt_config::RuntimeConfig::default(),
        }
    }

    #[tokio::test]
    async fn simple_input_stays_interactive_with_nonempty_response() {
        let storage = Arc::new(InMemoryStorage::new());
        let agent = Agent::create("s1", config(storage)).unwrap();
        let response = agent.chat("what is 2+2").await.unwrap();
        assert_eq!(response.mode, Mode::Interactive);
        assert!(!response.text.is_empty());
        assert!(response.plan.is_none());
    }

    #[tokio::test]
    async fn complex_input_enters_planning_with_pending_plan() {
        let storage = Arc::new(InMemoryStorage::new());
        let agent = Agent::create("s1", config(storage)).unwrap();
        let response = agent.chat("search for X and then email the results to Y").await.unwrap();
        assert_eq!(response.mode, Mode::Planning);
        assert!(response.plan.unwrap().tasks.len() >= 2);
        assert!(response.needs_user_action);
    }

    #[tokio::test]
    async fn save_then_resume_restores_conversation() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let agent = Agent::create("s1", config(storage.clone())).unwrap();
        agent.chat("what is 2+2").await.unwrap();
        agent.chat("and what is 3+3").await.unwrap();
        agent.save().await.unwrap();

        let resumed = Agent::resume("s1", config(storage)).await.unwrap();
        assert_eq!(resumed.context.conversation_snapshot().len(), agent.context.conversation_snapshot().len());
    }

    #[tokio::test]
    async fn resume_missing_session_errors() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let err = Agent::resume("missing", config(storage)).await.unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn destroyed_agent_rejects_further_turns() {
        let storage = Arc::new(InMemoryStorage::new());
        let agent = Agent::create("s1", config(storage)).unwrap();
        agent.destroy();
        let err = agent.chat("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Destroyed));
    }
}
