use chrono::{DateTime, Utc};

use crate::utils::math::{clamp_unit, mean, round_to};
use crate::utils::time::linear_freshness;

pub const FRESHNESS_WINDOW_HOURS: f64 = 24.0;
pub const FRESHNESS_FLOOR: f64 = 0.1;

const DATA_QUALITY_WEIGHT: f64 = 0.4;
const COMPLETENESS_WEIGHT: f64 = 0.6;
const CURRENT_WEIGHT: f64 = 0.7;
const HISTORY_WEIGHT: f64 = 0.3;

/// Everything the executor knows about a finished analysis when scoring it
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceInputs {
    pub field_presence: f64,
    pub observed_at: Option<DateTime<Utc>>,
    pub has_warnings: bool,
    pub completeness: f64,
    pub historical_success: Option<f64>,
    pub calibration_factor: f64,
}

impl ConfidenceInputs {
    pub fn data_quality(&self, now: DateTime<Utc>) -> f64 {
        let mut parts = vec![clamp_unit(self.field_presence)];
        if let Some(observed_at) = self.observed_at {
            parts.push(linear_freshness(observed_at, now, FRESHNESS_WINDOW_HOURS, FRESHNESS_FLOOR));
        }
        parts.push(if self.has_warnings { 0.5 } else { 1.0 });
        mean(&parts).unwrap_or(0.0)
    }
}

/// Confidence in [0, 1], rounded to 3 decimals
pub fn compute_confidence(inputs: &ConfidenceInputs, now: DateTime<Utc>) -> f64 {
    let mut confidence =
        inputs.data_quality(now) * DATA_QUALITY_WEIGHT + clamp_unit(inputs.completeness) * COMPLETENESS_WEIGHT;

    if let Some(history) = inputs.historical_success {
        confidence = confidence * CURRENT_WEIGHT + clamp_unit(history) * HISTORY_WEIGHT;
    }

    round_to(clamp_unit(confidence * inputs.calibration_factor), 3)
}
