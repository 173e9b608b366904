// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Rule-based intent classification. Deterministic per input, pluggable
//! behind [`ClassifyIntent`] — the default implementation's exact regexes
//! are tuning knobs, not part of the contract; the output taxonomy and the
//! downstream conductor transitions are what's fixed.
use regex::Regex;
use std::sync::OnceLock;

use crate::state::Mode;

/// The fixed taxonomy a classifier must map every utterance onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Simple,
    Complex,
    Approval,
    Rejection,
    Interrupt,
    StatusQuery,
    PlanModify,
    Feedback,
}

pub trait ClassifyIntent: Send + Sync {
    /// Classify one raw utterance given the conductor's current mode — the
    /// same text means different things in `Planning` ("yes" = approval)
    /// than in `Interactive` ("yes" = feedback).
    fn classify(&self, utterance: &str, mode: Mode) -> Intent;
}

/// One-shot patterns that never trigger planning even when they'd otherwise
/// read as a single action verb plus an object — a lone "search for X" is
/// simple, not complex, regardless of sentence length.
const SINGLE_TOOL_EXEMPTIONS: &[&str] = &["search", "fetch", "lookup", "look up", "summarize", "summarise"];

pub(crate) const SEQUENCING_MARKERS: &[&str] = &["then", "after that", "afterwards", "once that", "and then", "next,"];

/// Action verbs whose co-occurrence (two or more distinct ones) signals a
/// multi-step request rather than one call to one tool.
const ACTION_VERBS: &[&str] = &[
    "search", "find", "fetch", "download", "email", "send", "write", "create", "delete", "update",
    "summarize", "summarise", "analyze", "analyse", "compare", "deploy", "build", "test", "run",
    "install", "configure", "refactor", "review", "publish", "upload", "schedule", "notify",
];

/// Utterance length (characters) above which, combined with any sequencing
/// marker or multiple action verbs, the classifier leans toward `Complex`.
const LONG_UTTERANCE_CHARS: usize = 160;

fn approval_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(yes|yep|yeah|approve[d]?|go ahead|confirmed?|looks good|lgtm|sounds good|do it|sure)\b").unwrap())
}

fn rejection_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(no|nope|reject(ed)?|cancel|don'?t|stop that|not quite|instead|change)\b").unwrap())
}

fn interrupt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(stop|pause|wait|hold on|halt|interrupt)\b").unwrap())
}

fn resume_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(resume|continue|keep going|carry on)\b").unwrap())
}

fn status_query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(what'?s the (status|progress)|how (far|much).*(done|left)|are you done|progress report)").unwrap())
}

fn plan_modify_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(add|remove|drop|skip|update|change|modify|edit)\s+(a\s+|the\s+)?task\b").unwrap()
    })
}

/// An utterance that explicitly asks for a plan rather than merely reading
/// as complex from surface features. Per `DESIGN.md`'s open-question
/// decision, this overrides the single-tool exemption: a user who explicitly
/// asks for a plan gets one even if the rest of the sentence matches an
/// exempted one-shot pattern.
fn explicit_plan_request_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(make|create|draft|come up with|give me)\s+a\s+plan\b|\bplan\s+(this\s+)?out\b|\bplan\s+it\s+out\b").unwrap())
}

/// Default, deterministic rule-based classifier driven by heuristics:
/// multiple distinct action verbs, sequencing markers, length, and the
/// single-tool exemption list.
#[derive(Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    fn looks_complex(&self, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();

        if explicit_plan_request_regex().is_match(&lower) {
            return true;
        }

        if SINGLE_TOOL_EXEMPTIONS.iter().any(|p| lower.trim_start().starts_with(p)) {
            return false;
        }

        let has_sequencing = SEQUENCING_MARKERS.iter().any(|m| lower.contains(m));
        let distinct_verbs = ACTION_VERBS.iter().filter(|v| lower.contains(*v)).count();
        let is_long = utterance.chars().count() >= LONG_UTTERANCE_CHARS;

        has_sequencing || distinct_verbs >= 2 || (is_long && distinct_verbs >= 1)
    }
}

impl ClassifyIntent for HeuristicClassifier {
    fn classify(&self, utterance: &str, mode: Mode) -> Intent {
        let trimmed = utterance.trim();

        if mode.is_planning() {
            if plan_modify_regex().is_match(trimmed) {
                return Intent::PlanModify;
            }
            if approval_regex().is_match(trimmed) {
                return Intent::Approval;
            }
            if rejection_regex().is_match(trimmed) {
                return Intent::Rejection;
            }
        }

        if mode.is_executing() {
            if mode.is_paused() && resume_regex().is_match(trimmed) {
                return Intent::Approval;
            }
            if interrupt_regex().is_match(trimmed) {
                return Intent::Interrupt;
            }
            if status_query_regex().is_match(trimmed) {
                return Intent::StatusQuery;
            }
            if plan_modify_regex().is_match(trimmed) {
                return Intent::PlanModify;
            }
        }

        if status_query_regex().is_match(trimmed) {
            return Intent::StatusQuery;
        }

        if mode.is_interactive() && self.looks_complex(trimmed) {
            return Intent::Complex;
        }

        if mode.is_interactive() {
            return Intent::Simple;
        }

        Intent::Feedback
    }
}
