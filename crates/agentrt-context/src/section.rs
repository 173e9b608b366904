// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Plugin-produced sections contribute content to the system preamble and
//! participate in compaction and session persistence.
use async_trait::async_trait;

/// Priority 0 means "never compacted" — the section's content is load-bearing
/// for every turn (e.g. the base system prompt) and must survive any
/// compaction pass untouched.
pub const PRIORITY_NEVER_COMPACT: u8 = 0;

#[async_trait]
pub trait Section: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> u8 {
        PRIORITY_NEVER_COMPACT
    }

    fn compactable(&self) -> bool {
        self.priority() > PRIORITY_NEVER_COMPACT
    }

    /// Render this section's current content for inclusion in the preamble.
    async fn produce_content(&self) -> String;

    /// Token cost of this section's current content.
    async fn token_size(&self) -> usize {
        agentrt_tokens::estimate_text(&self.produce_content().await)
    }

    /// Shrink this section's content to free roughly `target_tokens`,
    /// returning the tokens actually freed. A no-op section (the default)
    /// always returns 0 and is simply skipped by the compaction driver.
    async fn compact(&self, _target_tokens: usize) -> usize {
        0
    }

    /// Serialize this section's internal state for session persistence.
    fn serialize_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Restore internal state from a previously serialized value.
    fn restore_state(&self, _state: &serde_json::Value) {}
}
