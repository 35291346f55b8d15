use std::time::Duration;
use tokio::time::sleep;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{warn, debug, error};
use crate::error::AppError;

/// Exponential backoff retry policy shared by the unit executor and the
/// outbound HTTP collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one (default: 3)
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 1000ms)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000ms)
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0, default: 0.0 for deterministic unit retries)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Policy for calls to external HTTP services
    pub fn for_external_api() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }

    /// Retries without waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay to wait after the given zero-based attempt failed.
    /// Doubles per attempt with the default multiplier, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential_delay = self.base_delay_ms as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay_ms as f64);

        if self.jitter_factor <= 0.0 || capped_delay <= 0.0 {
            return Duration::from_millis(capped_delay.max(0.0) as u64);
        }

        let mut rng = rand::thread_rng();
        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((capped_delay + jitter).max(0.0) as u64)
    }

    /// Worst-case time spent sleeping between attempts
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| {
                let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
                let capped = raw.min(self.max_delay_ms as f64);
                Duration::from_millis((capped * (1.0 + self.jitter_factor)) as u64)
            })
            .sum()
    }
}

/// Determines if an error is worth retrying
pub fn is_retryable_error(error: &AppError) -> bool {
    match error {
        AppError::ExternalServiceError(_) | AppError::ExternalApiError(_) => true,
        AppError::CacheError(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("connection")
                || msg_lower.contains("timeout")
                || msg_lower.contains("broken pipe")
        }
        AppError::InternalError(msg) => msg.to_lowercase().contains("timed out"),
        AppError::ValidationError(_)
        | AppError::NotFound(_)
        | AppError::ConfigError(_)
        | AppError::UnsupportedProtocol(_)
        | AppError::Cancelled(_) => false,
    }
}

/// Execute a future with exponential backoff retry logic
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut last_error = None;
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        debug!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = max_attempts,
            "Executing operation with retry logic"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable_error(&error) {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %error,
                        "Operation failed with non-retryable error"
                    );
                    return Err(error);
                }

                if attempt == max_attempts - 1 {
                    error!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                    last_error = Some(error);
                    break;
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying after delay"
                );
                last_error = Some(error);

                sleep(delay).await;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        AppError::InternalError("Retry logic failed without capturing error".to_string())
    }))
}
