// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The tool registry and its executor: resolve a call to a registered tool,
//! check permission, run it under a timeout and a cancellation signal, and
//! cache the result when the tool allows it.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use std::sync::Arc;
use thiserror::Error;

use crate::policy::{check_permission, ApprovalPolicy, PermissionManager, SessionApprovalCache};
use crate::tool::{OutputCategory, Tool, ToolCall, ToolExecutionState, ToolOutput};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered in namespace '{1}'")]
    DuplicateName(String, String),
    #[error("no tool named '{0}' is registered")]
    NotFound(String),
}

/// Validate `arguments` against `schema`. Mirrors the corpus's
/// `validate_arguments` graceful-skip behavior: a schema that fails to
/// compile never blocks execution, it just means validation is skipped for
/// that tool. Returns the joined validator error messages on mismatch.
fn validate_arguments(schema: &serde_json::Value, arguments: &serde_json::Value) -> Result<(), String> {
    let Ok(validator) = jsonschema::validator_for(schema) else {
        return Ok(());
    };
    let errors: Vec<String> = validator.iter_errors(arguments).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// A snapshot of a registered tool's properties, taken at registration time
/// so the executor can introspect blocking/timeout/cacheable without an
/// `execute` call.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub blocking: bool,
    pub timeout: Option<Duration>,
    pub cacheable: bool,
    pub default_policy: ApprovalPolicy,
    pub output_category: OutputCategory,
}

impl ToolDescriptor {
    fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
            blocking: tool.blocking(),
            timeout: tool.timeout(),
            cacheable: tool.cacheable(),
            default_policy: tool.default_policy(),
            output_category: tool.output_category(),
        }
    }
}

struct Registration {
    tool: Arc<dyn Tool>,
    descriptor: ToolDescriptor,
    enabled: bool,
}

struct CacheEntry {
    output: ToolOutput,
    recorded_at: Instant,
}

/// Caches successful tool outputs keyed by `(tool name, normalized-args
/// fingerprint)`. Populated only on success; a cache miss never fails a
/// call, it just means the tool runs again.
struct ToolCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl ToolCache {
    fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn get(&self, name: &str, args_key: &str) -> Option<ToolOutput> {
        let mut entries = self.entries.lock().unwrap();
        let key = (name.to_string(), args_key.to_string());
        match entries.get(&key) {
            Some(entry) if entry.recorded_at.elapsed() < self.ttl => Some(entry.output.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    fn put(&self, name: &str, args_key: &str, output: ToolOutput) {
        let key = (name.to_string(), args_key.to_string());
        self.entries.lock().unwrap().insert(key, CacheEntry { output, recorded_at: Instant::now() });
    }
}

fn args_key(args: &serde_json::Value) -> String {
    serde_json::to_string(args).unwrap_or_default()
}

/// The outcome of one `execute` call, including the lifecycle state so
/// callers can distinguish a genuine tool error from a timeout or
/// cancellation without parsing the error string.
pub struct ExecutionResult {
    pub state: ToolExecutionState,
    pub output: ToolOutput,
}

/// Registry of available tools plus their executor.
///
/// `unsafe impl Sync` is not needed here: `Arc<dyn Tool>` is already
/// `Send + Sync` as long as every `Tool` impl is, which the trait bound
/// requires. Interior state (`registrations`) lives behind a `Mutex` for the
/// rare registration/disable path; the hot `execute` path never needs to
/// lock it beyond a quick lookup-and-clone of the `Arc`.
pub struct ToolRegistry {
    registrations: Mutex<HashMap<String, Registration>>,
    cache: ToolCache,
    /// Applied to a call whose tool leaves `Tool::timeout()` at `None`, e.g.
    /// from `agentrt_config::LoopConfig::default_tool_timeout_secs`. A tool
    /// that declares its own timeout is never overridden.
    default_timeout: Mutex<Option<Duration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            cache: ToolCache::new(Duration::from_secs(300)),
            default_timeout: Mutex::new(None),
        }
    }

    pub fn set_default_timeout(&self, timeout: Duration) {
        *self.default_timeout.lock().unwrap() = Some(timeout);
    }

    /// Register a tool under an optional namespace prefix (`"fs"` +
    /// `"read_file"` → registered name `"fs.read_file"`). Fails if the
    /// resulting name already exists.
    pub fn register(&self, tool: Arc<dyn Tool>, namespace: Option<&str>) -> Result<(), RegistryError> {
        let base_name = tool.name().to_string();
        let full_name = match namespace {
            Some(ns) => format!("{ns}.{base_name}"),
            None => base_name,
        };
        let mut registrations = self.registrations.lock().unwrap();
        if registrations.contains_key(&full_name) {
            return Err(RegistryError::DuplicateName(full_name, namespace.unwrap_or("").to_string()));
        }
        let mut descriptor = ToolDescriptor::from_tool(tool.as_ref());
        descriptor.name = full_name.clone();
        registrations.insert(full_name, Registration { tool, descriptor, enabled: true });
        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        self.registrations.lock().unwrap().remove(name);
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) {
        if let Some(reg) = self.registrations.lock().unwrap().get_mut(name) {
            reg.enabled = enabled;
        }
    }

    /// All currently enabled tool descriptors.
    pub fn get_enabled(&self) -> Vec<ToolDescriptor> {
        self.registrations
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.descriptor.clone())
            .collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        self.registrations.lock().unwrap().get(name).map(|r| r.descriptor.clone())
    }

    fn lookup(&self, name: &str) -> Option<(Arc<dyn Tool>, ToolDescriptor)> {
        let registrations = self.registrations.lock().unwrap();
        let reg = registrations.get(name)?;
        if !reg.enabled {
            return None;
        }
        Some((reg.tool.clone(), reg.descriptor.clone()))
    }

    /// Resolve, permission-check, execute under timeout/cancellation, and
    /// cache a tool call. Never returns `Err` for a tool-level failure —
    /// those come back as `ExecutionResult { state: Failed, .. }` with the
    /// error recorded on the `ToolOutput`. `Err` is reserved for the call
    /// resolving to nothing registered.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        call: &ToolCall,
        manager: &dyn PermissionManager,
        approval_cache: &SessionApprovalCache,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
    ) -> Result<ExecutionResult, RegistryError> {
        let (tool, descriptor) = self.lookup(&call.name).ok_or_else(|| RegistryError::NotFound(call.name.clone()))?;

        if let Err(reason) = validate_arguments(&descriptor.parameters, &call.arguments) {
            return Ok(ExecutionResult {
                state: ToolExecutionState::Failed,
                output: ToolOutput::error(format!("invalid arguments for tool '{}': {reason}", descriptor.name)),
            });
        }

        if descriptor.cacheable {
            if let Some(cached) = self.cache.get(&descriptor.name, &args_key(&call.arguments)) {
                return Ok(ExecutionResult { state: ToolExecutionState::Completed, output: cached });
            }
        }

        let allowed = check_permission(descriptor.default_policy, &descriptor.name, &call.arguments, manager, approval_cache).await;
        if !allowed {
            return Ok(ExecutionResult {
                state: ToolExecutionState::Failed,
                output: ToolOutput::error(format!("permission denied for tool '{}'", descriptor.name)),
            });
        }

        let run = tool.execute(call.arguments.clone());
        let effective_timeout = descriptor.timeout.or_else(|| *self.default_timeout.lock().unwrap());
        let outcome = match effective_timeout {
            Some(timeout) => {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => return Ok(cancelled_result()),
                    result = tokio::time::timeout(timeout, run) => match result {
                        Ok(inner) => inner,
                        Err(_) => return Ok(ExecutionResult {
                            state: ToolExecutionState::Timeout,
                            output: ToolOutput::error(format!("tool '{}' timed out after {:?}", descriptor.name, timeout)),
                        }),
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => return Ok(cancelled_result()),
                    result = run => result,
                }
            }
        };

        match outcome {
            Ok(output) if !output.is_error() => {
                if descriptor.cacheable {
                    self.cache.put(&descriptor.name, &args_key(&call.arguments), output.clone());
                }
                Ok(ExecutionResult { state: ToolExecutionState::Completed, output })
            }
            Ok(output) => Ok(ExecutionResult { state: ToolExecutionState::Failed, output }),
            Err(e) => Ok(ExecutionResult { state: ToolExecutionState::Failed, output: ToolOutput::error(e.to_string()) }),
        }
    }
}

fn cancelled_result() -> ExecutionResult {
    ExecutionResult { state: ToolExecutionState::Cancelled, output: ToolOutput::error("tool execution cancelled") }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PermissionDecision;
    use crate::tool::ToolOutput;
    use async_trait::async_trait;

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Always
        }
        fn cacheable(&self) -> bool {
            true
        }
        async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::text(arguments.to_string()))
        }
    }

    struct SlowTool;
    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps forever"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Always
        }
        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(10))
        }
        async fn execute(&self, _arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolOutput::text("never"))
        }
    }

    struct SlowToolNoTimeout;
    #[async_trait]
    impl Tool for SlowToolNoTimeout {
        fn name(&self) -> &str {
            "slow_no_timeout"
        }
        fn description(&self) -> &str {
            "sleeps forever and declares no timeout of its own"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Always
        }
        async fn execute(&self, _arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolOutput::text("never"))
        }
    }

    struct AlwaysDeny;
    #[async_trait]
    impl PermissionManager for AlwaysDeny {
        async fn ask(&self, _tool_name: &str, _arguments: &serde_json::Value) -> PermissionDecision {
            PermissionDecision::Deny
        }
    }
    struct AlwaysAllow;
    #[async_trait]
    impl PermissionManager for AlwaysAllow {
        async fn ask(&self, _tool_name: &str, _arguments: &serde_json::Value) -> PermissionDecision {
            PermissionDecision::AllowOnce
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall { id: "1".into(), name: name.into(), arguments: args }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), None).unwrap();
        let err = registry.register(Arc::new(EchoTool), None).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_, _)));
    }

    #[test]
    fn namespace_prefixes_registered_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), Some("fs")).unwrap();
        assert!(registry.descriptor("fs.echo").is_some());
    }

    #[tokio::test]
    async fn execute_runs_registered_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("echo", serde_json::json!({"a": 1})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Completed);
        assert_eq!(result.output.as_text(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_not_found_error() {
        let registry = ToolRegistry::new();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let err = registry
            .execute(&call("missing", serde_json::json!({})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn execute_denies_when_permission_manager_denies() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        // default_policy is Always for EchoTool, so deny manager is not even consulted.
        let result = registry
            .execute(&call("echo", serde_json::json!({})), &AlwaysDeny, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Completed);
    }

    #[tokio::test]
    async fn execute_times_out_slow_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("slow", serde_json::json!({})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Timeout);
    }

    #[tokio::test]
    async fn registry_default_timeout_applies_when_tool_declares_none() {
        let registry = ToolRegistry::new();
        registry.set_default_timeout(Duration::from_millis(10));
        registry.register(Arc::new(SlowToolNoTimeout), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("slow_no_timeout", serde_json::json!({})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Timeout);
    }

    #[tokio::test]
    async fn tool_declared_timeout_takes_precedence_over_registry_default() {
        let registry = ToolRegistry::new();
        registry.set_default_timeout(Duration::from_secs(60));
        registry.register(Arc::new(SlowTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("slow", serde_json::json!({})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Timeout);
    }

    #[tokio::test]
    async fn execute_cancels_when_signal_fires() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool), None).unwrap();
        let (tx, mut cancel) = tokio::sync::watch::channel(false);
        tx.send(true).unwrap();
        let result = registry
            .execute(&call("slow", serde_json::json!({})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Cancelled);
    }

    #[tokio::test]
    async fn cacheable_tool_reuses_result() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let args = serde_json::json!({"a": 1});
        let first = registry.execute(&call("echo", args.clone()), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel).await.unwrap();
        let second = registry.execute(&call("echo", args), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel).await.unwrap();
        assert_eq!(first.output.as_text(), second.output.as_text());
    }

    struct StrictTool;
    #[async_trait]
    impl Tool for StrictTool {
        fn name(&self) -> &str {
            "strict"
        }
        fn description(&self) -> &str {
            "requires an integer 'count' argument"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "count": { "type": "integer" } },
                "required": ["count"],
            })
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Always
        }
        async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::text(arguments.to_string()))
        }
    }

    #[tokio::test]
    async fn execute_rejects_arguments_that_fail_schema_validation() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StrictTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("strict", serde_json::json!({"count": "not a number"})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Failed);
        assert!(result.output.is_error());
    }

    #[tokio::test]
    async fn execute_rejects_missing_required_argument() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StrictTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("strict", serde_json::json!({})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Failed);
        assert!(result.output.is_error());
    }

    #[tokio::test]
    async fn execute_accepts_arguments_that_satisfy_schema() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StrictTool), None).unwrap();
        let (_tx, mut cancel) = tokio::sync::watch::channel(false);
        let result = registry
            .execute(&call("strict", serde_json::json!({"count": 3})), &AlwaysAllow, &SessionApprovalCache::default(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(result.state, ToolExecutionState::Completed);
    }
}
