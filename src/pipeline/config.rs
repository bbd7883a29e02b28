//! Pipeline configuration.
//!
//! Retry and pacing constants live in explicit structs that are passed into
//! the retry controller and the orchestrator at construction, so tests can
//! inject zero-delay variants.

use std::time::Duration;
use thiserror::Error;

use crate::llm::DEFAULT_MODEL;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per unit, including the first one.
    pub max_attempts: u32,
    /// Delay before growth is applied.
    pub base_delay: Duration,
    /// Multiplier applied once per attempt already made.
    pub growth_factor: f64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            growth_factor: 1.5,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget as the default, but without any waiting.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Delay before the next attempt once `attempt_count` attempts have been
    /// made: `base * growth^attempt_count + jitter`.
    pub fn delay_for(&self, attempt_count: u32, jitter: Duration) -> Duration {
        let exponent = i32::try_from(attempt_count).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        let backoff = Duration::try_from_secs_f64(scaled.max(0.0)).unwrap_or(Duration::MAX);
        backoff.saturating_add(jitter)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "growth_factor must be a finite value of at least 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Settings for one orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub retry: RetryPolicy,
    /// Minimum spacing between two unit dispatches.
    pub inter_unit_delay: Duration,
    /// Units generated concurrently; 1 means strictly sequential.
    pub max_in_flight: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            inter_unit_delay: Duration::from_secs(1),
            max_in_flight: 1,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-delay configuration for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            retry: RetryPolicy::immediate(),
            inter_unit_delay: Duration::ZERO,
            max_in_flight: 1,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_inter_unit_delay(mut self, delay: Duration) -> Self {
        self.inter_unit_delay = delay;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if self.max_in_flight == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_in_flight must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full process configuration, usually read from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch: BatchConfig,
    /// Model requested from the generation service.
    pub model: String,
    /// Sampling temperature for generation.
    pub temperature: f64,
    /// sqlx SQLite connection URL.
    pub database_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            database_url: "sqlite://lessonforge.db?mode=rwc".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LESSONFORGE_MAX_ATTEMPTS`: Attempts per unit (default: 5)
    /// - `LESSONFORGE_BACKOFF_BASE_MS`: Backoff base in ms (default: 2000)
    /// - `LESSONFORGE_BACKOFF_GROWTH`: Backoff growth factor (default: 1.5)
    /// - `LESSONFORGE_JITTER_MS`: Maximum jitter in ms (default: 1000)
    /// - `LESSONFORGE_INTER_UNIT_DELAY_MS`: Spacing between units in ms (default: 1000)
    /// - `LESSONFORGE_MAX_IN_FLIGHT`: Concurrent units (default: 1)
    /// - `LESSONFORGE_MODEL`: Generation model (default: openai/gpt-4o-mini)
    /// - `LESSONFORGE_TEMPERATURE`: Sampling temperature (default: 0.7)
    /// - `DATABASE_URL`: SQLite connection URL (default: sqlite://lessonforge.db?mode=rwc)
    ///
    /// `LITELLM_API_BASE` and `LITELLM_API_KEY` are read by
    /// [`crate::llm::LiteLlmClient::from_env`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LESSONFORGE_MAX_ATTEMPTS") {
            config.batch.retry.max_attempts = parse_env_value(&val, "LESSONFORGE_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("LESSONFORGE_BACKOFF_BASE_MS") {
            let ms: u64 = parse_env_value(&val, "LESSONFORGE_BACKOFF_BASE_MS")?;
            config.batch.retry.base_delay = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("LESSONFORGE_BACKOFF_GROWTH") {
            config.batch.retry.growth_factor = parse_env_value(&val, "LESSONFORGE_BACKOFF_GROWTH")?;
        }

        if let Ok(val) = std::env::var("LESSONFORGE_JITTER_MS") {
            let ms: u64 = parse_env_value(&val, "LESSONFORGE_JITTER_MS")?;
            config.batch.retry.max_jitter = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("LESSONFORGE_INTER_UNIT_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "LESSONFORGE_INTER_UNIT_DELAY_MS")?;
            config.batch.inter_unit_delay = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("LESSONFORGE_MAX_IN_FLIGHT") {
            config.batch.max_in_flight = parse_env_value(&val, "LESSONFORGE_MAX_IN_FLIGHT")?;
        }

        if let Ok(val) = std::env::var("LESSONFORGE_MODEL") {
            config.model = val;
        }

        if let Ok(val) = std::env::var("LESSONFORGE_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "LESSONFORGE_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;

        if self.model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
