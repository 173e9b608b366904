// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The fixed meta-tool set: `start_planning`, `modify_plan`,
//! `report_progress`, `request_approval`. Registered only in `Interactive`
//! mode and removed from the tool set seen by the execution-mode agent.
//! Mode-transition-via-tool-call and structured-progress-via-tool-call each
//! signal the conductor through a single typed channel rather than a shared
//! `Arc<Mutex<..>>`.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use agentrt_tools::{ApprovalPolicy, Tool, ToolOutput};

/// Names of the four meta-tools, used by the hygiene check that asserts
/// none of them leak into the execution-mode agent's tool set.
pub const META_TOOL_NAMES: &[&str] =
    &["start_planning", "modify_plan", "report_progress", "request_approval"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanMutation {
    AddTask { id: String, name: String, description: String, depends_on: Vec<String> },
    RemoveTask { id: String },
    SkipTask { id: String },
    UpdateTask { id: String, description: String },
}

/// What a meta-tool call signals back to the conductor. The conductor
/// drains these after each loop turn and applies mode transitions /
/// plan mutations; the tools themselves never touch `Mode` or `Plan`
/// directly, matching this crate's "conductor exclusively owns the plan
/// and mode" ownership rule.
#[derive(Debug, Clone)]
pub enum MetaSignal {
    StartPlanning { goal: String },
    ModifyPlan(PlanMutation),
    ReportProgress { message: String },
    RequestApproval { summary: String },
}

fn ack(kind: &str) -> ToolOutput {
    ToolOutput::text(format!("{kind} acknowledged"))
}

pub struct StartPlanningTool {
    tx: mpsc::Sender<MetaSignal>,
}

impl StartPlanningTool {
    pub fn new(tx: mpsc::Sender<MetaSignal>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Tool for StartPlanningTool {
    fn name(&self) -> &str {
        "start_planning"
    }

    fn description(&self) -> &str {
        "Request that the conductor switch from interactive mode into planning mode for a \
         multi-step goal. Call this instead of attempting the whole goal inline when it needs \
         more than one independent action."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "goal": { "type": "string", "description": "The overall goal to plan for" } },
            "required": ["goal"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Always
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<ToolOutput> {
        let goal = arguments.get("goal").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let _ = self.tx.send(MetaSignal::StartPlanning { goal }).await;
        Ok(ack("start_planning"))
    }
}

pub struct ModifyPlanTool {
    tx: mpsc::Sender<MetaSignal>,
}

impl ModifyPlanTool {
    pub fn new(tx: mpsc::Sender<MetaSignal>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Tool for ModifyPlanTool {
    fn name(&self) -> &str {
        "modify_plan"
    }

    fn description(&self) -> &str {
        "Propose a mutation to the current plan: add_task, remove_task, skip_task, or \
         update_task. Only valid while a plan is pending approval or execution is paused."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["add_task", "remove_task", "skip_task", "update_task"] },
                "id": { "type": "string" },
                "name": { "type": "string" },
                "description": { "type": "string" },
                "depends_on": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["action", "id"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Always
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<ToolOutput> {
        let action = arguments.get("action").and_then(|v| v.as_str()).unwrap_or_default();
        let id = arguments.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let mutation = match action {
            "add_task" => PlanMutation::AddTask {
                id,
                name: arguments.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                description: arguments.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                depends_on: arguments
                    .get("depends_on")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
                    .unwrap_or_default(),
            },
            "remove_task" => PlanMutation::RemoveTask { id },
            "skip_task" => PlanMutation::SkipTask { id },
            "update_task" => PlanMutation::UpdateTask {
                id,
                description: arguments.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            },
            other => return Ok(ToolOutput::error(format!("unknown plan mutation action '{other}'"))),
        };
        let _ = self.tx.send(MetaSignal::ModifyPlan(mutation)).await;
        Ok(ack("modify_plan"))
    }
}

pub struct ReportProgressTool {
    tx: mpsc::Sender<MetaSignal>,
}

impl ReportProgressTool {
    pub fn new(tx: mpsc::Sender<MetaSignal>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Tool for ReportProgressTool {
    fn name(&self) -> &str {
        "report_progress"
    }

    fn description(&self) -> &str {
        "Report a free-form progress update to the user without changing mode."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Always
    }

    fn blocking(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<ToolOutput> {
        let message = arguments.get("message").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let _ = self.tx.send(MetaSignal::ReportProgress { message }).await;
        Ok(ack("report_progress"))
    }
}

pub struct RequestApprovalTool {
    tx: mpsc::Sender<MetaSignal>,
}

impl RequestApprovalTool {
    pub fn new(tx: mpsc::Sender<MetaSignal>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Tool for RequestApprovalTool {
    fn name(&self) -> &str {
        "request_approval"
    }

    fn description(&self) -> &str {
        "Ask the user to explicitly approve the current plan before execution begins."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "summary": { "type": "string" } },
            "required": ["summary"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Always
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<ToolOutput> {
        let summary = arguments.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let _ = self.tx.send(MetaSignal::RequestApproval { summary }).await;
        Ok(ack("request_approval"))
    }
}
