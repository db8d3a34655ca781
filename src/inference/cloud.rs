//! Cloud inference executor and clients
//!
//! [`CloudExecutor`] wraps any [`CloudInferenceService`] with two
//! policies: bounded concurrency (a semaphore cap) and a mandatory
//! per-call timeout. There is no retry; a timed-out slot is recorded as a
//! `Timeout` failure and the lane moves on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::CloudInferenceService;
use crate::config::CloudConfig;
use crate::errors::{CloudError, CloudResult};

/// Applies the concurrency cap and timeout around a cloud service
pub struct CloudExecutor {
    service: Arc<dyn CloudInferenceService>,
    permits: Arc<Semaphore>,
    call_timeout: Duration,
}

impl CloudExecutor {
    pub fn new(service: Arc<dyn CloudInferenceService>, config: &CloudConfig) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            call_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn provider(&self) -> &str {
        self.service.provider()
    }

    /// Run one cloud completion under the cap and timeout
    pub async fn infer(&self, prompt: &str) -> CloudResult<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CloudError::network("cloud executor shut down"))?;
        match timeout(self.call_timeout, self.service.infer(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CloudError::Timeout {
                timeout_secs: self.call_timeout.as_secs(),
            }),
        }
    }

    /// One bounded connectivity check; affects no session
    pub async fn probe(&self) -> ProbeReport {
        let started = Instant::now();
        let outcome = self.infer("connectivity check").await;
        let latency = started.elapsed();
        match outcome {
            Ok(_) => ProbeReport {
                provider: self.provider().to_string(),
                reachable: true,
                latency,
                error: None,
            },
            Err(e) => {
                warn!("Connectivity probe for {} failed: {}", self.provider(), e);
                ProbeReport {
                    provider: self.provider().to_string(),
                    reachable: false,
                    latency,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Result of a connectivity probe
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub provider: String,
    pub reachable: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

/// OpenAI-compatible chat completions client
///
/// Works against any provider exposing the `chat/completions` shape; the
/// per-call timeout lives in the executor, not here.
pub struct HttpCloudService {
    client: reqwest::Client,
    config: CloudConfig,
}

impl HttpCloudService {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }

    /// Map a non-success HTTP status onto the per-call error taxonomy
    fn classify_status(status: reqwest::StatusCode, body: &str, provider: &str) -> CloudError {
        match status.as_u16() {
            401 | 403 => CloudError::AuthError {
                message: format!("{provider} returned {status}"),
            },
            429 if body.to_ascii_lowercase().contains("quota") => CloudError::QuotaExceeded {
                provider: provider.to_string(),
            },
            429 => CloudError::RateLimited {
                provider: provider.to_string(),
            },
            _ => CloudError::network(format!("{provider} returned {status}: {body}")),
        }
    }

    fn extract_completion(value: &serde_json::Value) -> Option<String> {
        value
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(|s| s.trim().to_string())
    }
}

#[async_trait]
impl CloudInferenceService for HttpCloudService {
    async fn infer(&self, prompt: &str) -> CloudResult<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.config.max_tokens,
        });

        let mut request = self.client.post(self.completions_url()).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        debug!("Sending cloud completion request to {}", self.config.provider);
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CloudError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                CloudError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body, &self.config.provider));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CloudError::network(format!("malformed response body: {e}")))?;
        Self::extract_completion(&value).ok_or_else(|| {
            CloudError::network("response carried no completion choices".to_string())
        })
    }

    fn provider(&self) -> &str {
        &self.config.provider
    }
}

/// Canned-response cloud service for offline runs and tests
///
/// Simulated latency grows with prompt length, mimicking a network round
/// trip plus generation time.
pub struct MockCloudService {
    base_latency: Duration,
}

impl MockCloudService {
    pub fn new() -> Self {
        Self {
            base_latency: Duration::from_millis(500),
        }
    }

    /// A fast variant for tests that do not care about latency shape
    pub fn instant() -> Self {
        Self {
            base_latency: Duration::ZERO,
        }
    }
}

impl Default for MockCloudService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudInferenceService for MockCloudService {
    async fn infer(&self, prompt: &str) -> CloudResult<String> {
        let delay = self.base_latency + Duration::from_millis(prompt.len() as u64 * 10);
        tokio::time::sleep(delay).await;
        Ok(format!(
            "Mock cloud response to: {}",
            prompt.chars().take(50).collect::<String>()
        ))
    }

    fn provider(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StallingService;

    #[async_trait]
    impl CloudInferenceService for StallingService {
        async fn infer(&self, _prompt: &str) -> CloudResult<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        fn provider(&self) -> &str {
            "stalling"
        }
    }

    fn config_with_timeout(timeout_secs: u64) -> CloudConfig {
        CloudConfig {
            timeout_secs,
            ..CloudConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_the_timeout_yields_a_timeout_error() {
        let executor = CloudExecutor::new(Arc::new(StallingService), &config_with_timeout(2));
        let err = executor.infer("hi").await.unwrap_err();
        assert!(matches!(err, CloudError::Timeout { timeout_secs: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn mock_service_answers_within_the_timeout() {
        let executor = CloudExecutor::new(
            Arc::new(MockCloudService::new()),
            &config_with_timeout(30),
        );
        let response = executor.infer("what is edge computing?").await.unwrap();
        assert!(response.starts_with("Mock cloud response"));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_reports_unreachable_on_timeout() {
        let executor = CloudExecutor::new(Arc::new(StallingService), &config_with_timeout(1));
        let report = executor.probe().await;
        assert!(!report.reachable);
        assert_eq!(report.provider, "stalling");
        assert!(report.error.is_some());
    }

    #[test]
    fn status_classification_follows_the_taxonomy() {
        use reqwest::StatusCode;
        assert!(matches!(
            HttpCloudService::classify_status(StatusCode::UNAUTHORIZED, "", "openai"),
            CloudError::AuthError { .. }
        ));
        assert!(matches!(
            HttpCloudService::classify_status(
                StatusCode::TOO_MANY_REQUESTS,
                "monthly quota exhausted",
                "openai"
            ),
            CloudError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            HttpCloudService::classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down", "openai"),
            CloudError::RateLimited { .. }
        ));
        assert!(matches!(
            HttpCloudService::classify_status(StatusCode::BAD_GATEWAY, "", "openai"),
            CloudError::NetworkError { .. }
        ));
    }

    #[test]
    fn completion_extraction_reads_the_first_choice() {
        let value = json!({
            "choices": [{"message": {"content": "  hello there  "}}]
        });
        assert_eq!(
            HttpCloudService::extract_completion(&value).as_deref(),
            Some("hello there")
        );
        assert_eq!(HttpCloudService::extract_completion(&json!({})), None);
    }
}
