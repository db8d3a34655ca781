//! Inference executors and collaborator contracts
//!
//! The model runtime and the wire-level cloud client are external
//! collaborators behind the [`LocalInferenceEngine`] and
//! [`CloudInferenceService`] traits. The executors in this module own the
//! concurrency discipline around them: the local engine is a singleton
//! serialized across all callers, the cloud service runs under a bounded
//! concurrency cap with a mandatory per-call timeout.

pub mod cloud;
pub mod local;

pub use cloud::{CloudExecutor, HttpCloudService, MockCloudService, ProbeReport};
pub use local::{LocalExecutor, MockLocalEngine, ModelHandle};

use async_trait::async_trait;

use crate::errors::{CloudResult, LocalResult};

/// Contract for the local model runtime (out-of-scope internals)
#[async_trait]
pub trait LocalInferenceEngine: Send + Sync {
    /// Load a model and return a handle to it
    async fn load(&self, model_id: &str) -> LocalResult<ModelHandle>;

    /// Run one completion against a loaded model
    async fn infer(&self, handle: &ModelHandle, prompt: &str) -> LocalResult<String>;
}

/// Contract for the remote inference service (out-of-scope wire client)
#[async_trait]
pub trait CloudInferenceService: Send + Sync {
    /// Run one completion against the configured provider
    async fn infer(&self, prompt: &str) -> CloudResult<String>;

    /// Provider name for logs and probe reports
    fn provider(&self) -> &str;
}
