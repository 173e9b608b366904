// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Canned correction messages injected into the conversation when the model
//! misbehaves in one of a few well-known ways, instead of failing the turn.
pub const WRAP_UP_NOTICE_TEMPLATE: &str = "You have reached the maximum tool-call budget ({max_iterations} rounds). \
Do not call any more tools. \
Write a concise summary of: (1) what has been completed, \
(2) what still remains to be done, and (3) how to continue.";

pub const EMPTY_TURN_NUDGE: &str =
    "You produced a thinking block but no response or tool call. Please continue with your next action.";

pub const MALFORMED_TOOL_CALL_NUDGE: &str = "You output a tool call using an incorrect format (XML/function tags \
in the text response). Do not include tool calls in your text. \
Use the JSON tool-call protocol provided by your schema.";

pub const MID_TASK_STALL_NUDGE: &str =
    "You have not finished the task yet. Please continue with your next tool call.";

pub fn wrap_up_message(max_iterations: u32) -> String {
    WRAP_UP_NOTICE_TEMPLATE.replace("{max_iterations}", &max_iterations.to_string())
}

/// Heuristic: does this text contain a tool call expressed as inline
/// XML/function-call markup instead of the structured tool-call protocol?
/// Reasoning models occasionally emit `<tool_call>`/`<function=...>`-style
/// tags in their text output; this lets the loop nudge them back onto the
/// schema instead of silently accepting malformed text as the final answer.
pub fn text_contains_malformed_tool_call(text: &str) -> bool {
    const MARKERS: &[&str] = &["<tool_call", "<function=", "<function_call", "</tool_call>", "<|tool_call|>"];
    MARKERS.iter().any(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_up_message_embeds_round_count() {
        let msg = wrap_up_message(25);
        assert!(msg.contains("25 rounds"));
    }

    #[test]
    fn detects_xml_style_tool_call_markers() {
        assert!(text_contains_malformed_tool_call("<tool_call>{\"name\": \"x\"}</tool_call>"));
        assert!(text_contains_malformed_tool_call("<function=read_file>"));
    }

    #[test]
    fn plain_text_is_not_flagged() {
        assert!(!text_contains_malformed_tool_call("Here is the answer you asked for."));
    }
}
