//! Deterministic completion provider for tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

use super::provider::{
    CompletionProvider, CompletionResult, CompletionStream, PromptMessage, ProviderError,
    StreamEvent,
};

/// A [`CompletionProvider`] that replays a scripted stream.
///
/// Emits its deltas, optionally waits on a gate, then terminates with
/// either a successful result aggregating the deltas or a scripted
/// failure. Records every invocation and its prompt.
pub struct ScriptedProvider {
    deltas: Vec<String>,
    failure: Option<ProviderError>,
    connect_failure: Option<ProviderError>,
    gate: Option<Arc<Notify>>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<std::sync::Mutex<Vec<Vec<PromptMessage>>>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            failure: None,
            connect_failure: None,
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Terminate the stream with `error` instead of a result. Scripted
    /// deltas are still emitted first.
    pub fn with_failure(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Fail `stream_completion` itself; the stream never starts.
    pub fn with_connect_failure(mut self, error: ProviderError) -> Self {
        self.connect_failure = Some(error);
        self
    }

    /// Hold the stream open after its deltas until the returned gate is
    /// notified.
    pub fn with_gate(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// How many times `stream_completion` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts passed to each invocation, in call order.
    pub fn recorded_prompts(&self) -> Vec<Vec<PromptMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_completion(
        &self,
        messages: Vec<PromptMessage>,
    ) -> Result<CompletionStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(messages);

        if let Some(error) = &self.connect_failure {
            return Err(error.clone());
        }

        let deltas = self.deltas.clone();
        let failure = self.failure.clone();
        let gate = self.gate.clone();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut text = String::new();
            for delta in deltas {
                text.push_str(&delta);
                if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                    return;
                }
            }

            if let Some(gate) = gate {
                gate.notified().await;
            }

            let terminal = match failure {
                Some(error) => StreamEvent::Failed(error),
                None => StreamEvent::Completed(CompletionResult {
                    id: "chatcmpl-scripted".to_string(),
                    created: 1714561200,
                    model: "scripted".to_string(),
                    text,
                }),
            };
            let _ = tx.send(terminal).await;
        });

        Ok(rx)
    }
}
