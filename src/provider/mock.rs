use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;

use crate::{
    error::ServiceError,
    provider::{FragmentStream, GenerationResult, StreamItem, TextGenerator},
    settings::ProviderSettings,
};

/// What one scripted provider call should do.
pub enum ScriptedCall {
    /// Emit the fragments, then complete with their concatenation.
    Stream {
        fragments: Vec<String>,
        tokens_consumed: u64,
        tokens_prompt: u64,
    },
    /// Emit the fragments, then fail mid-stream.
    FailAfter {
        fragments: Vec<String>,
        error: String,
    },
    /// Fail before producing anything.
    Fail { error: String },
}

/// Scripted generator for tests. Calls pop script entries in order; when the
/// script runs dry every further call streams a fixed canned chapter.
pub struct MockGenerator {
    script: Mutex<VecDeque<ScriptedCall>>,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(calls: Vec<ScriptedCall>) -> Self {
        Self {
            script: Mutex::new(calls.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_call(&self) -> ScriptedCall {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedCall::Stream {
                fragments: vec![
                    "The night train ".to_string(),
                    "left without ".to_string(),
                    "its driver.".to_string(),
                ],
                tokens_consumed: 42,
                tokens_prompt: 7,
            })
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn result_of(fragments: &[String], tokens_consumed: u64, tokens_prompt: u64) -> GenerationResult {
    GenerationResult {
        text: fragments.concat(),
        tokens_consumed,
        tokens_prompt,
        finish_reason: Some("stop".to_string()),
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _model: &str,
        _settings: &ProviderSettings,
    ) -> Result<GenerationResult, ServiceError> {
        match self.next_call() {
            ScriptedCall::Stream {
                fragments,
                tokens_consumed,
                tokens_prompt,
            } => Ok(result_of(&fragments, tokens_consumed, tokens_prompt)),
            ScriptedCall::FailAfter { error, .. } | ScriptedCall::Fail { error } => {
                Err(ServiceError::Provider(error))
            }
        }
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _model: &str,
        _settings: &ProviderSettings,
    ) -> Result<FragmentStream, ServiceError> {
        let items: Vec<Result<StreamItem, ServiceError>> = match self.next_call() {
            ScriptedCall::Stream {
                fragments,
                tokens_consumed,
                tokens_prompt,
            } => {
                let result = result_of(&fragments, tokens_consumed, tokens_prompt);
                fragments
                    .into_iter()
                    .map(|fragment| Ok(StreamItem::Fragment(fragment)))
                    .chain(std::iter::once(Ok(StreamItem::Completed(result))))
                    .collect()
            }
            ScriptedCall::FailAfter { fragments, error } => fragments
                .into_iter()
                .map(|fragment| Ok(StreamItem::Fragment(fragment)))
                .chain(std::iter::once(Err(ServiceError::Provider(error))))
                .collect(),
            ScriptedCall::Fail { error } => return Err(ServiceError::Provider(error)),
        };
        Ok(stream::iter(items).boxed())
    }
}
