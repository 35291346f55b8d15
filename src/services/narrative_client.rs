use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{with_retry, AppError, RetryPolicy};

/// Text-generation collaborator used for optional narrative summaries
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &Value) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    context: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Client for the text-generation microservice
#[derive(Clone)]
pub struct NarrativeClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl NarrativeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            retry_policy: RetryPolicy::for_external_api(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Check if the text-generation service is healthy
    pub async fn health_check(&self) -> Result<bool, AppError> {
        let url = format!("{}/health", self.base_url);

        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Narrative service health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn generate_once(&self, prompt: &str, context: &Value) -> Result<String, AppError> {
        let url = format!("{}/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&GenerateRequest { prompt, context })
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Narrative request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalServiceError(format!(
                "Narrative service returned {}: {}",
                status, error_text
            )));
        }

        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse narrative response: {}", e)))?;

        Ok(body.text)
    }
}

#[async_trait]
impl NarrativeGenerator for NarrativeClient {
    async fn generate(&self, prompt: &str, context: &Value) -> Result<String, AppError> {
        with_retry("narrative_generate", &self.retry_policy, || self.generate_once(prompt, context)).await
    }
}

/// Offline generator that always declines, so callers use their deterministic text
#[derive(Debug, Clone, Default)]
pub struct StaticNarrator;

#[async_trait]
impl NarrativeGenerator for StaticNarrator {
    async fn generate(&self, _prompt: &str, _context: &Value) -> Result<String, AppError> {
        Err(AppError::ExternalServiceError("Narrative generation disabled".to_string()))
    }
}
