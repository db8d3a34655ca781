//! Application configuration
//!
//! Typed configuration loaded once at startup from a TOML file. Every value
//! is validated before any component is constructed; a missing or invalid
//! value is a fatal [`AppError::Configuration`]. There is no dynamic lookup
//! at runtime, components receive the validated sections they need.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::models::PowerModel;

fn default_battery_threshold() -> f64 {
    20.0
}
fn default_high_temp_limit() -> f64 {
    70.0
}
fn default_baseline_idle_watts() -> f64 {
    5.0
}
fn default_max_cpu_watts() -> f64 {
    25.0
}
fn default_window_capacity() -> usize {
    60
}
fn default_min_samples() -> usize {
    5
}
fn default_drain_min_elapsed_secs() -> f64 {
    30.0
}
fn default_duration_secs() -> u64 {
    300
}
fn default_sampling_interval_secs() -> f64 {
    1.0
}
fn default_grace_period_secs() -> f64 {
    5.0
}
fn default_output_dir() -> String {
    "sessions".to_string()
}
fn default_test_prompts() -> Vec<String> {
    vec![
        "What is machine learning?".to_string(),
        "Explain quantum computing".to_string(),
        "How does a neural network work?".to_string(),
        "What are the benefits of edge computing?".to_string(),
    ]
}
fn default_local_model() -> String {
    "gpt2".to_string()
}
fn default_max_tokens() -> u32 {
    50
}
fn default_temperature() -> f64 {
    0.7
}
fn default_cloud_provider() -> String {
    "openai".to_string()
}
fn default_cloud_timeout_secs() -> u64 {
    30
}
fn default_cloud_max_concurrency() -> usize {
    4
}
fn default_true() -> bool {
    true
}

/// How routing treats a sensor the host cannot read
///
/// `Pass` treats an absent sensor as a passed check (a desktop without a
/// battery may still run locally). `Defer` is the conservative variant:
/// an absent sensor routes the request off-device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AbsentSensorPolicy {
    #[default]
    Pass,
    Defer,
}

/// Routing threshold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Minimum battery percent for local execution (0-100)
    #[serde(default = "default_battery_threshold")]
    pub battery_threshold: f64,
    /// Temperature ceiling for local execution, degrees Celsius
    #[serde(default = "default_high_temp_limit")]
    pub high_temp_limit: f64,
    #[serde(default)]
    pub absent_sensor_policy: AbsentSensorPolicy,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            battery_threshold: default_battery_threshold(),
            high_temp_limit: default_high_temp_limit(),
            absent_sensor_policy: AbsentSensorPolicy::default(),
        }
    }
}

/// Power estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_baseline_idle_watts")]
    pub baseline_idle_watts: f64,
    #[serde(default = "default_max_cpu_watts")]
    pub max_cpu_watts: f64,
    /// Sliding window capacity in snapshots
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// Below this many snapshots an estimate is flagged low confidence
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Minimum separation between the two battery samples a drain rate
    /// is derived from
    #[serde(default = "default_drain_min_elapsed_secs")]
    pub drain_min_elapsed_secs: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            baseline_idle_watts: default_baseline_idle_watts(),
            max_cpu_watts: default_max_cpu_watts(),
            window_capacity: default_window_capacity(),
            min_samples: default_min_samples(),
            drain_min_elapsed_secs: default_drain_min_elapsed_secs(),
        }
    }
}

impl PowerConfig {
    pub fn power_model(&self) -> PowerModel {
        PowerModel {
            baseline_idle_watts: self.baseline_idle_watts,
            max_cpu_watts: self.max_cpu_watts,
        }
    }
}

/// Experiment session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Total session duration in seconds
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Sampling lane interval in seconds
    #[serde(default = "default_sampling_interval_secs")]
    pub sampling_interval_secs: f64,
    /// How long an in-flight call may outlive cancellation before it is
    /// abandoned and recorded as failed
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: f64,
    /// Directory session documents are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Prompts cycled round-robin by each inference lane
    #[serde(default = "default_test_prompts")]
    pub test_prompts: Vec<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            sampling_interval_secs: default_sampling_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
            output_dir: default_output_dir(),
            test_prompts: default_test_prompts(),
        }
    }
}

/// Local inference engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_model")]
    pub model_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_id: default_local_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Cloud inference service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Whether a cloud path is configured at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cloud_provider")]
    pub provider: String,
    /// OpenAI-compatible chat completions base URL
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Mandatory per-call timeout in seconds
    #[serde(default = "default_cloud_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum concurrent in-flight cloud calls
    #[serde(default = "default_cloud_max_concurrency")]
    pub max_concurrency: usize,
    /// Serve canned responses instead of calling the provider
    #[serde(default = "default_true")]
    pub use_mock_cloud: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_cloud_provider(),
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_cloud_timeout_secs(),
            max_concurrency: default_cloud_max_concurrency(),
            use_mock_cloud: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
}

impl Config {
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var("EDGE_OPTIMIZER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Load configuration, writing a default file when none exists
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        let config: Config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)
                .map_err(|e| AppError::configuration(format!("{config_file}: {e}")))?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::internal(e.to_string()))?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every value; any violation is fatal at startup
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=100.0).contains(&self.thresholds.battery_threshold) {
            return Err(AppError::configuration(format!(
                "thresholds.battery_threshold must be within 0-100, got {}",
                self.thresholds.battery_threshold
            )));
        }
        if !self.thresholds.high_temp_limit.is_finite() || self.thresholds.high_temp_limit <= 0.0 {
            return Err(AppError::configuration(format!(
                "thresholds.high_temp_limit must be a positive temperature, got {}",
                self.thresholds.high_temp_limit
            )));
        }
        if self.power.baseline_idle_watts < 0.0 || !self.power.baseline_idle_watts.is_finite() {
            return Err(AppError::configuration(
                "power.baseline_idle_watts must be non-negative",
            ));
        }
        if self.power.max_cpu_watts <= 0.0 || !self.power.max_cpu_watts.is_finite() {
            return Err(AppError::configuration(
                "power.max_cpu_watts must be positive",
            ));
        }
        if self.power.window_capacity == 0 {
            return Err(AppError::configuration(
                "power.window_capacity must be at least 1",
            ));
        }
        if !self.power.drain_min_elapsed_secs.is_finite() || self.power.drain_min_elapsed_secs < 0.0
        {
            return Err(AppError::configuration(
                "power.drain_min_elapsed_secs must be finite and non-negative",
            ));
        }
        if self.experiment.duration_secs == 0 {
            return Err(AppError::configuration(
                "experiment.duration_secs must be positive",
            ));
        }
        if !self.experiment.sampling_interval_secs.is_finite()
            || self.experiment.sampling_interval_secs <= 0.0
        {
            return Err(AppError::configuration(
                "experiment.sampling_interval_secs must be finite and positive",
            ));
        }
        if !self.experiment.grace_period_secs.is_finite()
            || self.experiment.grace_period_secs < 0.0
        {
            return Err(AppError::configuration(
                "experiment.grace_period_secs must be finite and non-negative",
            ));
        }
        if self.experiment.test_prompts.is_empty() {
            return Err(AppError::configuration(
                "experiment.test_prompts must contain at least one prompt",
            ));
        }
        if self.cloud.timeout_secs == 0 {
            return Err(AppError::configuration(
                "cloud.timeout_secs must be positive",
            ));
        }
        if self.cloud.max_concurrency == 0 {
            return Err(AppError::configuration(
                "cloud.max_concurrency must be at least 1",
            ));
        }
        if self.cloud.enabled && !self.cloud.use_mock_cloud && self.cloud.api_url.is_empty() {
            return Err(AppError::configuration(
                "cloud.api_url is required when cloud is enabled and not mocked",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn battery_threshold_out_of_range_is_fatal() {
        let mut config = Config::default();
        config.thresholds.battery_threshold = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sampling_interval_is_fatal() {
        let mut config = Config::default();
        config.experiment.sampling_interval_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_durations_are_fatal() {
        // NaN compares false against every threshold, so each duration
        // check needs its own finiteness guard; a NaN interval would
        // otherwise panic later in Duration::from_secs_f64.
        let mut config = Config::default();
        config.experiment.sampling_interval_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.experiment.grace_period_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.power.drain_min_elapsed_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn real_cloud_requires_api_url() {
        let mut config = Config::default();
        config.cloud.use_mock_cloud = false;
        config.cloud.api_url = String::new();
        assert!(config.validate().is_err());

        config.cloud.api_url = "https://api.openai.com/v1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn absent_sensor_policy_parses_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [thresholds]
            absent_sensor_policy = "defer"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.thresholds.absent_sensor_policy,
            AbsentSensorPolicy::Defer
        );
    }
}
