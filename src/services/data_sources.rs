use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::error::{is_retryable_error, AppError};
use crate::models::{SourceKind, SourceResponse};

/// Confidence assumed for a successful fetch whose payload carries none
const DEFAULT_CONFIDENCE_HINT: f64 = 0.8;

/// Contract every upstream data-fetch client fulfils. Failures come back as
/// unsuccessful responses, never as errors.
#[async_trait]
pub trait DataSourceClient: Send + Sync {
    fn source(&self) -> SourceKind;
    async fn fetch(&self, subject: &str, timeout: Duration) -> SourceResponse;
}

/// URL path segment for a subject name
pub fn subject_slug(subject: &str) -> String {
    subject
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// JSON-over-HTTP source at `GET {base_url}/{kind}/{slug}`
#[derive(Clone)]
pub struct HttpDataSource {
    client: Client,
    base_url: String,
    source: SourceKind,
    retry_attempts: usize,
}

impl HttpDataSource {
    pub fn new(source: SourceKind, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            source,
            retry_attempts: 2,
        }
    }

    pub fn with_retry_attempts(mut self, retry_attempts: usize) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    fn url_for(&self, subject: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.source.as_str(), subject_slug(subject))
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<Value, AppError> {
        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("{} has no data at {}", self.source, url)));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalServiceError(format!(
                "{} source returned {}: {}",
                self.source, status, error_text
            )));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse {} response: {}", self.source, e)))?;
        Ok(payload)
    }
}

#[async_trait]
impl DataSourceClient for HttpDataSource {
    fn source(&self) -> SourceKind {
        self.source
    }

    async fn fetch(&self, subject: &str, timeout: Duration) -> SourceResponse {
        let url = self.url_for(subject);
        debug!(source = %self.source, url = %url, "Fetching source data");

        let strategy = ExponentialBackoff::from_millis(10)
            .factor(10)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.retry_attempts);

        let result = RetryIf::spawn(strategy, || self.fetch_once(&url, timeout), is_retryable_error).await;

        match result {
            Ok(payload) if payload.is_object() => {
                let confidence = payload
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_CONFIDENCE_HINT);
                SourceResponse::ok(self.source, payload, confidence)
            }
            Ok(_) => {
                warn!(source = %self.source, subject = %subject, "Source returned a non-object payload");
                SourceResponse::failed(self.source, "unexpected payload shape")
            }
            Err(e) => {
                warn!(source = %self.source, subject = %subject, error = %e, "Source fetch failed");
                SourceResponse::failed(self.source, e.to_string())
            }
        }
    }
}
