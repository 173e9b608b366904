// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The serializable state of one agent session.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use agentrt_model::Message;

/// A complete, storage-opaque snapshot of one session's state.
///
/// `agent_state` is left as an opaque JSON value rather than a typed
/// `(mode, pending_plan, task_index)` triple: this crate sits at the bottom
/// of the dependency graph (no internal crate depends on it, it depends on
/// none), so it cannot name `agentrt-conductor`'s `ModeState`/`Plan` types
/// without an upward dependency. The facade crate, which depends on both,
/// is responsible for serializing/deserializing the conductor's actual
/// state into and out of this field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub conversation: Vec<Message>,
    /// Keyed by plugin section name, populated from `Section::serialize_state`.
    pub plugin_states: HashMap<String, serde_json::Value>,
    pub system_prompt: String,
    pub agent_state: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SessionSnapshot {
    pub fn new(session_id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            conversation: Vec::new(),
            plugin_states: HashMap::new(),
            system_prompt: system_prompt.into(),
            agent_state: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_snapshot_has_empty_conversation_and_null_agent_state() {
        let snapshot = SessionSnapshot::new("s1", "you are helpful");
        assert!(snapshot.conversation.is_empty());
        assert_eq!(snapshot.agent_state, serde_json::Value::Null);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut snapshot = SessionSnapshot::new("s1", "sys");
        snapshot.conversation.push(Message::user("hi"));
        snapshot.metadata.insert("key".to_string(), serde_json::json!("value"));
        let encoded = serde_json::to_vec(&snapshot).unwrap();
        let decoded: SessionSnapshot = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.session_id, snapshot.session_id);
        assert_eq!(decoded.conversation.len(), 1);
        assert_eq!(decoded.metadata.get("key"), Some(&serde_json::json!("value")));
    }
}
