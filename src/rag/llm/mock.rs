/// Scripted provider for tests and offline runs.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{LlmProvider, ProviderError};

/// Replays a fixed sequence of outcomes and records every call.
///
/// Once the script runs out, every further call answers with the fallback.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    delays: Mutex<VecDeque<Duration>>,
    fallback: String,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delays: Mutex::new(VecDeque::new()),
            fallback: "scripted answer".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `answer`.
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            fallback: answer.into(),
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before each response, in call order.
    #[must_use]
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *lock(&self.delays) = delays.into();
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// When each call started.
    pub fn call_instants(&self) -> Vec<Instant> {
        lock(&self.calls).iter().map(|(at, _)| *at).collect()
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        lock(&self.calls).push((Instant::now(), prompt.to_string()));

        let next = lock(&self.script).pop_front();
        let delay = lock(&self.delays).pop_front();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
