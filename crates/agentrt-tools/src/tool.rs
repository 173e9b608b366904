// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `Tool` trait and the types the registry and executor pass around it.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::policy::ApprovalPolicy;

/// A model-issued tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A single part of a tool's output, mirroring the content-part split used
/// for message content so tool output can carry images alongside text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolOutputPart {
    Text(String),
    Image { url: String },
}

/// Which smart-truncation strategy applies to this tool's output when the
/// context manager needs to shrink it to fit budget. See `agentrt-context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Keep a prefix and a suffix, drop the middle (e.g. long shell output).
    HeadTail,
    /// A list of discrete matches (e.g. search results); truncate by dropping
    /// whole entries from the tail, never mid-entry.
    MatchList,
    /// File contents; truncate with awareness of line boundaries.
    FileContent,
    /// No special structure assumed.
    #[default]
    Generic,
}

/// The result of running a tool, successful or not. Errors are represented
/// here rather than as a `Result` at the executor boundary: any thrown error
/// converts into a structured `ToolOutput`, so the agentic loop always gets
/// one to record, never a bare `Err` it has to special-case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub parts: Vec<ToolOutputPart>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<OutputCategory>,
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        Self { parts: vec![ToolOutputPart::Text(s.into())], error: None, category: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { parts: vec![], error: Some(message.into()), category: None }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn as_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ToolOutputPart::Text(t) => Some(t.as_str()),
                ToolOutputPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// serde can't derive on an enum without variants carrying data issues here;
// OutputCategory needs manual (de)serialize support since it's stored in
// descriptors that may round-trip through config, not just runtime structs.
impl Serialize for OutputCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = match self {
            OutputCategory::HeadTail => "head_tail",
            OutputCategory::MatchList => "match_list",
            OutputCategory::FileContent => "file_content",
            OutputCategory::Generic => "generic",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for OutputCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "head_tail" => OutputCategory::HeadTail,
            "match_list" => OutputCategory::MatchList,
            "file_content" => OutputCategory::FileContent,
            _ => OutputCategory::Generic,
        })
    }
}

/// State of one in-flight or completed tool invocation, tracked by the
/// executor across the pending→executing→terminal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExecutionState {
    Pending,
    Executing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

/// A registered tool implementation.
///
/// Descriptor-ish metadata (`blocking`, `timeout`, `cacheable`) is exposed as
/// methods here with defaults, and snapshotted into a [`crate::registry::ToolDescriptor`]
/// at registration time so the executor can introspect a tool's properties
/// without invoking `execute`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    /// Permission policy applied when no caller override exists.
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Once
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    /// Whether the agentic loop must wait for this tool's result before the
    /// next LLM call, vs. finalizing later.
    fn blocking(&self) -> bool {
        true
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether successful results may be served from the registry's cache.
    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::text(arguments.to_string()))
        }
    }

    #[tokio::test]
    async fn echo_tool_returns_text_output() {
        let tool = EchoTool;
        let out = tool.execute(serde_json::json!({"x": 1})).await.unwrap();
        assert!(!out.is_error());
        assert_eq!(out.as_text(), r#"{"x":1}"#);
    }

    #[test]
    fn tool_output_error_has_no_parts() {
        let out = ToolOutput::error("boom");
        assert!(out.is_error());
        assert_eq!(out.as_text(), "");
    }

    #[test]
    fn output_category_roundtrips_through_json() {
        for cat in [
            OutputCategory::HeadTail,
            OutputCategory::MatchList,
            OutputCategory::FileContent,
            OutputCategory::Generic,
        ] {
            let s = serde_json::to_string(&cat).unwrap();
            let back: OutputCategory = serde_json::from_str(&s).unwrap();
            assert_eq!(back, cat);
        }
    }
}
