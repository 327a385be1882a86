use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::{CompletionProvider, CompletionRequest, CompletionResponse};

/// Errors raised while talking to a model provider
#[derive(Error, Debug, Clone)]
pub enum AiError {
    // Network and Connection Errors
    #[error("Network request failed: {message}")]
    NetworkError {
        message: String,
        retryable: bool,
        status_code: Option<u16>,
    },

    #[error("Connection timeout after {timeout:?}")]
    TimeoutError { timeout: Duration, retryable: bool },

    #[error("Connection refused to {endpoint}")]
    ConnectionRefused { endpoint: String },

    // Authentication Errors
    #[error("Invalid API key for provider {provider}")]
    InvalidApiKey { provider: String },

    // Rate Limiting Errors
    #[error("Rate limit exceeded. Retry after {retry_after:?}")]
    RateLimitExceeded {
        provider: String,
        retry_after: Option<Duration>,
    },

    // Request/Response Errors
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    #[error("Malformed response: {message}")]
    MalformedResponse {
        message: String,
        raw_response: Option<String>,
    },

    // Provider-Specific Errors
    #[error("Provider error from {provider}: {message}")]
    ProviderError {
        provider: String,
        message: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("Service unavailable for provider {provider}")]
    ServiceUnavailable {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("JSON parsing error: {message}")]
    JsonError {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    // Configuration Errors
    #[error("Invalid configuration: {field}: {message}")]
    ConfigurationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String, description: String },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        component: Option<String>,
    },
}

impl AiError {
    /// Check if this error type is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::NetworkError { retryable, .. } => *retryable,
            AiError::TimeoutError { retryable, .. } => *retryable,
            AiError::ProviderError { retryable, .. } => *retryable,
            AiError::RateLimitExceeded { .. }
            | AiError::ServiceUnavailable { .. }
            | AiError::ConnectionRefused { .. } => true,

            AiError::InvalidApiKey { .. }
            | AiError::InvalidRequest { .. }
            | AiError::MalformedResponse { .. }
            | AiError::JsonError { .. }
            | AiError::ConfigurationError { .. }
            | AiError::MissingConfiguration { .. }
            | AiError::InternalError { .. } => false,
        }
    }

    /// Get retry delay if applicable
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AiError::RateLimitExceeded { retry_after, .. } => *retry_after,
            AiError::ServiceUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get the provider associated with this error, if any
    pub fn provider(&self) -> Option<&str> {
        match self {
            AiError::InvalidApiKey { provider }
            | AiError::RateLimitExceeded { provider, .. }
            | AiError::ProviderError { provider, .. }
            | AiError::ServiceUnavailable { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Classify a non-success HTTP reply from a provider.
    ///
    /// Provider error bodies of the form `{"error": {"message": ...}}` are
    /// unwrapped to their message; anything else is kept verbatim.
    pub fn from_status(
        provider: &str,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.to_string());

        match status {
            401 | 403 => AiError::InvalidApiKey {
                provider: provider.to_string(),
            },
            429 => AiError::RateLimitExceeded {
                provider: provider.to_string(),
                retry_after,
            },
            500..=599 => AiError::ServiceUnavailable {
                provider: provider.to_string(),
                retry_after,
            },
            _ => AiError::ProviderError {
                provider: provider.to_string(),
                message,
                status_code: Some(status),
                retryable: false,
            },
        }
    }
}

// Conversion from common error types
impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout()
            || err.is_connect()
            || err.status().is_some_and(|s| s.is_server_error());

        let status_code = err.status().map(|s| s.as_u16());

        if err.is_timeout() {
            AiError::TimeoutError {
                timeout: Duration::from_secs(30),
                retryable: true,
            }
        } else if err.is_connect() {
            AiError::ConnectionRefused {
                endpoint: err.url().map_or("unknown".to_string(), |u| u.to_string()),
            }
        } else if err.is_decode() {
            AiError::MalformedResponse {
                message: err.to_string(),
                raw_response: None,
            }
        } else {
            AiError::NetworkError {
                message: err.to_string(),
                retryable,
                status_code,
            }
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        AiError::JsonError {
            message: err.to_string(),
            line: Some(err.line()),
            column: Some(err.column()),
        }
    }
}

impl From<std::io::Error> for AiError {
    fn from(err: std::io::Error) -> Self {
        AiError::InternalError {
            message: err.to_string(),
            component: Some("io".to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AiError>;

// RETRY LOGIC

/// Retry strategy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    pub backoff: BackoffStrategy,

    pub jitter: JitterStrategy,

    /// Whether to honour the provider's retry-after hint
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterStrategy::Full,
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// Default policy allowing `max_retries` retries after the first attempt.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries + 1,
            ..Self::default()
        }
    }
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,

    /// Linear backoff: delay = initial_delay * attempt
    Linear,

    /// Exponential backoff: delay = initial_delay * multiplier^(attempt - 1)
    Exponential { multiplier: f64 },
}

/// Jitter strategies to randomize retry delays
#[derive(Debug, Clone)]
pub enum JitterStrategy {
    None,

    /// Random delay between zero and the computed delay
    Full,

    /// Random delay between half and the full computed delay
    Half,
}

/// Runs an async operation until it succeeds, fails permanently or runs out of attempts
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !error.is_retryable() || attempt >= max_attempts {
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt, &error);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying provider request"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate the delay before the next retry attempt
    fn calculate_delay(&self, attempt: u32, error: &AiError) -> Duration {
        if self.config.respect_retry_after {
            if let Some(retry_after) = error.retry_after() {
                return std::cmp::min(retry_after, self.config.max_delay);
            }
        }

        let base_delay = match &self.config.backoff {
            BackoffStrategy::Fixed => self.config.initial_delay,

            BackoffStrategy::Linear => self.config.initial_delay.saturating_mul(attempt),

            BackoffStrategy::Exponential { multiplier } => {
                let delay_ms = self.config.initial_delay.as_millis() as f64
                    * multiplier.powi(attempt.saturating_sub(1) as i32);
                Duration::from_millis(delay_ms as u64)
            }
        };

        let base_delay = std::cmp::min(base_delay, self.config.max_delay);
        self.apply_jitter(base_delay)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let delay_ms = delay.as_millis() as u64;

        match &self.config.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => Duration::from_millis(rng.gen_range(0..=delay_ms)),
            JitterStrategy::Half => {
                let half = delay_ms / 2;
                Duration::from_millis(half + rng.gen_range(0..=half))
            }
        }
    }
}

/// A provider wrapper that retries transient failures
pub struct RetryingProvider {
    provider: Arc<dyn CompletionProvider>,
    executor: RetryExecutor,
}

impl RetryingProvider {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: RetryConfig) -> Self {
        Self {
            provider,
            executor: RetryExecutor::new(config),
        }
    }

    pub fn inner(&self) -> &Arc<dyn CompletionProvider> {
        &self.provider
    }
}

#[async_trait]
impl CompletionProvider for RetryingProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.executor
            .execute(|| {
                let request = request.clone();
                let provider = Arc::clone(&self.provider);
                async move { provider.complete(request).await }
            })
            .await
    }

    fn name(&self) -> &'static str {
        self.provider.name()
    }

    fn default_model(&self) -> &'static str {
        self.provider.default_model()
    }
}
