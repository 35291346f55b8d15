use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{RunContext, UnitId, UnitResult};

/// Progress of one run as seen by the store
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub run_id: String,
    pub subject_name: String,
    pub units_completed: Vec<UnitId>,
    pub successful_units: usize,
    pub elapsed_ms: i64,
}

/// In-memory map of run id to accumulating run context
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, RunContext>>>,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_age,
        }
    }

    pub async fn create(&self, context: RunContext) {
        let mut sessions = self.sessions.write().await;
        debug!(run_id = %context.run_id, subject = %context.subject_name, "Session created");
        sessions.insert(context.run_id.clone(), context);
    }

    /// Append a unit result. A second result for the same unit is rejected.
    pub async fn append(&self, run_id: &str, result: UnitResult) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let context = sessions
            .get_mut(run_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", run_id)))?;

        let unit_id = result.unit_id.clone();
        if !context.append(result) {
            warn!(run_id = %run_id, unit = %unit_id, "Rejected duplicate unit result");
            return Err(AppError::ValidationError(format!(
                "Unit {} already reported for run {}",
                unit_id, run_id
            )));
        }
        Ok(())
    }

    /// Snapshot of the run context as it stands now
    pub async fn get(&self, run_id: &str) -> Option<RunContext> {
        self.sessions.read().await.get(run_id).cloned()
    }

    pub async fn summary(&self, run_id: &str) -> Option<SessionSummary> {
        let sessions = self.sessions.read().await;
        let context = sessions.get(run_id)?;
        Some(SessionSummary {
            run_id: context.run_id.clone(),
            subject_name: context.subject_name.clone(),
            units_completed: context.prior_results.keys().cloned().collect(),
            successful_units: context.successful_results().count(),
            elapsed_ms: (Utc::now() - context.started_at).num_milliseconds(),
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict sessions older than `max_age`. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - max_age;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, context| context.started_at > cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed = removed, remaining = sessions.len(), "Swept expired sessions");
        }
        removed
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    /// Run `sweep` on an interval until `shutdown` fires
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.sweep().await;
                    }
                }
            }
        })
    }
}
