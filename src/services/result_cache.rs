use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::utils::caching::{CacheConfig, CacheStats, CacheStore, MultiLayerCache};
use crate::utils::time::day_key;
use crate::models::FinalAssessment;

/// Per-day memoization of finished assessments
pub struct AssessmentCache {
    inner: MultiLayerCache<FinalAssessment>,
}

impl AssessmentCache {
    pub fn new(config: CacheConfig, l2_store: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            inner: MultiLayerCache::new("risk_assessments", config, l2_store),
        }
    }

    /// Hex SHA-256 of `risk_assessment_{subject}_{YYYY-MM-DD}`
    pub fn cache_key(subject_name: &str, at: DateTime<Utc>) -> String {
        let normalized = subject_name.trim().to_lowercase().replace(' ', "_");
        let raw = format!("risk_assessment_{}_{}", normalized, day_key(at));
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    pub async fn get(&self, subject_name: &str) -> Option<FinalAssessment> {
        let key = Self::cache_key(subject_name, Utc::now());
        let cached = self.inner.get(&key).await;
        debug!(subject = %subject_name, hit = cached.is_some(), "Assessment cache lookup");
        cached
    }

    pub async fn put(&self, assessment: &FinalAssessment) {
        let key = Self::cache_key(&assessment.subject_name, Utc::now());
        self.inner.set(&key, assessment.clone()).await;
    }

    pub async fn clear(&self) {
        self.inner.clear().await;
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
