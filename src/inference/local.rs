//! Local inference executor
//!
//! The local engine is a process-wide shared resource: one loaded model
//! handle behind a `tokio::sync::Mutex`, so the agent's single-request
//! path and the runner's local lane never race on it. A second concurrent
//! caller waits for the lock rather than failing.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::LocalInferenceEngine;
use crate::config::LocalConfig;
use crate::errors::{LocalError, LocalResult};

/// Handle to a loaded model
#[derive(Debug, Clone)]
pub struct ModelHandle {
    pub model_id: String,
}

/// Serializes all access to the shared local engine
///
/// Loads the configured model lazily on first use and keeps the handle for
/// the lifetime of the process.
pub struct LocalExecutor {
    engine: Box<dyn LocalInferenceEngine>,
    config: LocalConfig,
    /// Held across the whole inference call; this is the singleton lock
    handle: Mutex<Option<ModelHandle>>,
}

impl LocalExecutor {
    pub fn new(engine: Box<dyn LocalInferenceEngine>, config: LocalConfig) -> Self {
        Self {
            engine,
            config,
            handle: Mutex::new(None),
        }
    }

    /// Run one local completion, loading the model on first use
    pub async fn infer(&self, prompt: &str) -> LocalResult<String> {
        let mut guard = self.handle.lock().await;
        if guard.is_none() {
            info!("Loading local model '{}'", self.config.model_id);
            *guard = Some(self.engine.load(&self.config.model_id).await?);
        }
        let handle = guard
            .as_ref()
            .ok_or_else(|| LocalError::InferenceError {
                message: "model handle missing after load".to_string(),
            })?;
        debug!("Running local inference on '{}'", handle.model_id);
        self.engine.infer(handle, prompt).await
    }
}

/// Deterministic stand-in for the out-of-scope model runtime
///
/// Produces an echo-style completion after a bounded simulated compute
/// delay, so sessions and tests exercise the real orchestration paths
/// without a model on disk.
pub struct MockLocalEngine {
    base_latency: Duration,
    per_token_latency: Duration,
    max_tokens: u32,
}

impl MockLocalEngine {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            base_latency: Duration::from_millis(80),
            per_token_latency: Duration::from_millis(2),
            max_tokens: config.max_tokens,
        }
    }

    /// A fast variant for tests that do not care about latency shape
    pub fn instant() -> Self {
        Self {
            base_latency: Duration::ZERO,
            per_token_latency: Duration::ZERO,
            max_tokens: 16,
        }
    }
}

#[async_trait]
impl LocalInferenceEngine for MockLocalEngine {
    async fn load(&self, model_id: &str) -> LocalResult<ModelHandle> {
        if model_id.is_empty() {
            return Err(LocalError::LoadError {
                model_id: model_id.to_string(),
                message: "empty model id".to_string(),
            });
        }
        Ok(ModelHandle {
            model_id: model_id.to_string(),
        })
    }

    async fn infer(&self, handle: &ModelHandle, prompt: &str) -> LocalResult<String> {
        let jitter_ms = rand::rng().random_range(0..=20);
        let delay = self.base_latency
            + self.per_token_latency * self.max_tokens
            + Duration::from_millis(jitter_ms);
        tokio::time::sleep(delay).await;
        Ok(format!(
            "[{}] completion for: {}",
            handle.model_id,
            prompt.chars().take(60).collect::<String>()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn executor() -> LocalExecutor {
        LocalExecutor::new(Box::new(MockLocalEngine::instant()), LocalConfig::default())
    }

    #[tokio::test]
    async fn loads_once_and_completes() {
        let executor = executor();
        let first = executor.infer("hello").await.unwrap();
        let second = executor.infer("again").await.unwrap();
        assert!(first.contains("hello"));
        assert!(second.contains("again"));
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized_not_raced() {
        let executor = Arc::new(executor());
        let mut handles = Vec::new();
        for i in 0..8 {
            let executor = executor.clone();
            handles.push(tokio::spawn(async move {
                executor.infer(&format!("prompt {i}")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn empty_model_id_is_a_load_error() {
        let executor = LocalExecutor::new(
            Box::new(MockLocalEngine::instant()),
            LocalConfig {
                model_id: String::new(),
                ..LocalConfig::default()
            },
        );
        let err = executor.infer("hi").await.unwrap_err();
        assert!(matches!(err, LocalError::LoadError { .. }));
    }
}
