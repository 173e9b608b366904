// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Permission policy and the session-scoped approval cache.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// How a tool invocation is gated.
///
/// Widened from a simpler allow/ask/deny split into four states so a policy
/// can distinguish "approved just this once" from "approved for the rest of
/// the session" without the caller re-asking on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Ask every time; the answer is not cached.
    Once,
    /// Ask once, then remember the approval for the rest of the session
    /// (subject to [`SessionApprovalCache`]'s TTL).
    Session,
    /// Never ask; always allowed.
    Always,
    /// Never ask; always denied.
    Never,
}

/// What the external permission manager decided for one `ask` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    AllowOnce,
    AllowSession,
    Deny,
}

/// The caller-supplied authority that decides whether a tool call may run.
///
/// Implementations typically prompt a human or consult a rules file; this
/// crate ships no concrete implementation beyond the in-module test double,
/// since the actual prompting surface (TUI, web, CLI) is out of scope here.
#[async_trait::async_trait]
pub trait PermissionManager: Send + Sync {
    async fn ask(&self, tool_name: &str, arguments: &serde_json::Value) -> PermissionDecision;
}

/// A stable fingerprint of a tool call's arguments, used as the cache key
/// alongside the tool name. Built from the canonical JSON serialization so
/// that key ordering differences in the source `Value` don't defeat caching
/// (`serde_json::Value` maps preserve insertion order, so we sort keys
/// first via `to_string` on a normalized clone).
fn fingerprint(arguments: &serde_json::Value) -> String {
    let normalized = normalize(arguments);
    let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn normalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), normalize(v));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(normalize).collect())
        }
        other => other.clone(),
    }
}

/// In-memory cache of session-scoped tool approvals, keyed by
/// `(tool_name, argument_fingerprint)`. A single `Mutex` guards the map,
/// matching this codebase's lock discipline for shared, low-contention
/// state: correctness over throughput, since approval checks are not a hot
/// loop.
pub struct SessionApprovalCache {
    ttl: Duration,
    approvals: Mutex<HashMap<(String, String), Instant>>,
}

impl SessionApprovalCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, approvals: Mutex::new(HashMap::new()) }
    }

    pub fn record(&self, tool_name: &str, arguments: &serde_json::Value) {
        let key = (tool_name.to_string(), fingerprint(arguments));
        self.approvals.lock().unwrap().insert(key, Instant::now());
    }

    /// Returns `true` if a non-expired session approval exists for this
    /// exact tool/argument pair.
    pub fn is_approved(&self, tool_name: &str, arguments: &serde_json::Value) -> bool {
        let key = (tool_name.to_string(), fingerprint(arguments));
        let mut approvals = self.approvals.lock().unwrap();
        match approvals.get(&key) {
            Some(recorded_at) if recorded_at.elapsed() < self.ttl => true,
            Some(_) => {
                approvals.remove(&key);
                false
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.approvals.lock().unwrap().clear();
    }
}

impl Default for SessionApprovalCache {
    fn default() -> Self {
        // Long enough to cover one interactive session, short enough that a
        // session left open overnight doesn't silently keep approving.
        Self::new(Duration::from_secs(8 * 60 * 60))
    }
}

/// Resolve the final allow/deny decision for one tool call, consulting the
/// session cache before falling back to the permission manager.
pub async fn check_permission(
    policy: ApprovalPolicy,
    tool_name: &str,
    arguments: &serde_json::Value,
    manager: &dyn PermissionManager,
    cache: &SessionApprovalCache,
) -> bool {
    match policy {
        ApprovalPolicy::Always => true,
        ApprovalPolicy::Never => false,
        ApprovalPolicy::Once => {
            matches!(manager.ask(tool_name, arguments).await, PermissionDecision::AllowOnce | PermissionDecision::AllowSession)
        }
        ApprovalPolicy::Session => {
            if cache.is_approved(tool_name, arguments) {
                return true;
            }
            match manager.ask(tool_name, arguments).await {
                PermissionDecision::AllowOnce => true,
                PermissionDecision::AllowSession => {
                    cache.record(tool_name, arguments);
                    true
                }
                PermissionDecision::Deny => false,
            }
        }
    }
}
