// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `ModelProvider` trait is the only thing the agentic loop knows about
//! LLM vendors. Concrete vendor adapters (Anthropic, OpenAI, Bedrock, ...)
//! are explicitly out of scope for this crate — they live downstream and
//! implement this trait.
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// A cancellation signal threaded through `stream()`.
///
/// Implementations must stop producing events (in a best-effort, bounded
/// amount of time) once this resolves to `true`. It is a thin wrapper around
/// `tokio::sync::watch` rather than a dedicated cancellation-token crate,
/// matching the channel-based cancellation idiom already used throughout
/// this codebase's agentic loop.
#[derive(Clone)]
pub struct CancelSignal(tokio::sync::watch::Receiver<bool>);

impl CancelSignal {
    pub fn new(rx: tokio::sync::watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// A signal that never fires; useful for call sites that do not support
    /// cancellation (tests, one-shot scripts).
    pub fn never() -> Self {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        Self(rx)
    }

    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|v| *v).await;
    }
}

/// A source of `CancelSignal`s. Holding the sender lets a caller fire
/// cancellation from outside the streaming task.
pub struct CancelHandle(tokio::sync::watch::Sender<bool>);

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (Self(tx), CancelSignal::new(rx))
    }

    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    ///
    /// `cancel` must be honored: once it resolves, the stream should stop
    /// producing further events in bounded time. Callers are still
    /// responsible for timing out providers that ignore it.
    async fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelSignal,
    ) -> anyhow::Result<ResponseStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_handle_fires_signal() {
        let (handle, mut signal) = CancelHandle::new();
        assert!(!signal.is_cancelled());
        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[test]
    fn never_signal_reports_not_cancelled() {
        assert!(!CancelSignal::never().is_cancelled());
    }
}
