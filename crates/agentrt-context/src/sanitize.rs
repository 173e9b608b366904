// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The pair sanitizer: the mandatory last step of `prepare()`. Any strategy
//! may remove individual messages, which can orphan a tool_use/tool_result
//! pair; this scan restores the invariant unconditionally, independent of
//! which strategy ran or whether one ran at all.
use std::collections::HashSet;

use agentrt_model::Message;

/// Remove any `tool_use` whose id has no later matching `tool_result`, and
/// any `tool_result` whose id has no earlier matching `tool_use`. Runs in
/// two passes so removal in one direction can't hide a pair that would
/// otherwise have been valid.
pub fn sanitize_tool_pairs(messages: Vec<Message>) -> Vec<Message> {
    let mut result_ids: HashSet<&str> = HashSet::new();
    let mut call_ids: HashSet<&str> = HashSet::new();
    for m in &messages {
        if m.is_tool_call() {
            if let Some(id) = m.tool_pair_id() {
                call_ids.insert(id);
            }
        } else if m.is_tool_result() {
            if let Some(id) = m.tool_pair_id() {
                result_ids.insert(id);
            }
        }
    }

    messages
        .into_iter()
        .filter(|m| {
            if m.is_tool_call() {
                m.tool_pair_id().map(|id| result_ids.contains(id)).unwrap_or(false)
            } else if m.is_tool_result() {
                m.tool_pair_id().map(|id| call_ids.contains(id)).unwrap_or(false)
            } else {
                true
            }
        })
        .collect()
}
