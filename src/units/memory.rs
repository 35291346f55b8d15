use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::UnitId;

pub const MAX_HISTORY: usize = 100;
/// Runs a unit must have before its calibration moves off 1.0
const CALIBRATION_MIN_RUNS: u64 = 10;
const CALIBRATION_FLOOR: f64 = 0.5;

/// Track record of one unit for one subject
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubjectHistory {
    pub runs: u32,
    pub successes: u32,
    pub last_confidence: Option<f64>,
}

impl SubjectHistory {
    pub fn success_rate(&self) -> Option<f64> {
        if self.runs == 0 {
            return None;
        }
        Some(self.successes as f64 / self.runs as f64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentRecord {
    pub run_id: String,
    pub subject: String,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct UnitState {
    subjects: HashMap<String, SubjectHistory>,
    history: VecDeque<AssessmentRecord>,
    calibration_factor: f64,
    total_runs: u64,
    total_successes: u64,
    last_run: Option<DateTime<Utc>>,
}

impl Default for UnitState {
    fn default() -> Self {
        Self {
            subjects: HashMap::new(),
            history: VecDeque::with_capacity(MAX_HISTORY),
            calibration_factor: 1.0,
            total_runs: 0,
            total_successes: 0,
            last_run: None,
        }
    }
}

/// Run statistics of one unit across all subjects
#[derive(Debug, Clone, Serialize)]
pub struct UnitStats {
    pub unit_id: UnitId,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub success_rate: Option<f64>,
    pub last_run: Option<DateTime<Utc>>,
    pub calibration_factor: f64,
    pub history_len: usize,
}

/// Long-lived per-unit memory shared by every run of the process
#[derive(Debug, Default)]
pub struct UnitMemory {
    units: RwLock<HashMap<UnitId, UnitState>>,
}

impl UnitMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(subject: &str) -> String {
        subject.trim().to_lowercase()
    }

    /// Success rate of `unit` on `subject`, `None` when the pair has never run
    pub async fn historical_success(&self, unit_id: &UnitId, subject: &str) -> Option<f64> {
        let units = self.units.read().await;
        units
            .get(unit_id)
            .and_then(|state| state.subjects.get(&Self::normalize(subject)))
            .and_then(SubjectHistory::success_rate)
    }

    /// Multiplier applied to the unit's confidence. Stays at 1.0 until the unit
    /// has `CALIBRATION_MIN_RUNS` runs, then follows its overall success rate:
    /// units succeeding at least half the time keep 1.0, a unit that never
    /// succeeds bottoms out at 0.5.
    pub async fn calibration_factor(&self, unit_id: &UnitId) -> f64 {
        let units = self.units.read().await;
        units.get(unit_id).map(|s| s.calibration_factor).unwrap_or(1.0)
    }

    /// Record one execution. Only successful runs enter the assessment history.
    pub async fn record(&self, unit_id: &UnitId, subject: &str, run_id: &str, succeeded: bool, confidence: f64) {
        let now = Utc::now();
        let mut units = self.units.write().await;
        let state = units.entry(unit_id.clone()).or_default();

        state.total_runs += 1;
        state.last_run = Some(now);

        let entry = state.subjects.entry(Self::normalize(subject)).or_default();
        entry.runs += 1;

        if succeeded {
            state.total_successes += 1;
            entry.successes += 1;
            entry.last_confidence = Some(confidence);

            if state.history.len() == MAX_HISTORY {
                state.history.pop_front();
            }
            state.history.push_back(AssessmentRecord {
                run_id: run_id.to_string(),
                subject: subject.to_string(),
                confidence,
                recorded_at: now,
            });
        }

        if state.total_runs >= CALIBRATION_MIN_RUNS {
            let success_rate = state.total_successes as f64 / state.total_runs as f64;
            state.calibration_factor = (CALIBRATION_FLOOR + success_rate).min(1.0);
        }
    }

    pub async fn subject_history(&self, unit_id: &UnitId, subject: &str) -> Option<SubjectHistory> {
        let units = self.units.read().await;
        units
            .get(unit_id)
            .and_then(|state| state.subjects.get(&Self::normalize(subject)))
            .cloned()
    }

    pub async fn stats(&self, unit_id: &UnitId) -> UnitStats {
        let units = self.units.read().await;
        match units.get(unit_id) {
            Some(state) => UnitStats {
                unit_id: unit_id.clone(),
                total_runs: state.total_runs,
                successful_runs: state.total_successes,
                success_rate: (state.total_runs > 0)
                    .then(|| state.total_successes as f64 / state.total_runs as f64),
                last_run: state.last_run,
                calibration_factor: state.calibration_factor,
                history_len: state.history.len(),
            },
            None => UnitStats {
                unit_id: unit_id.clone(),
                total_runs: 0,
                successful_runs: 0,
                success_rate: None,
                last_run: None,
                calibration_factor: 1.0,
                history_len: 0,
            },
        }
    }

    pub async fn clear(&self) {
        self.units.write().await.clear();
    }
}
