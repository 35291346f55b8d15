use serde::Serialize;

use crate::models::RiskCategory;
use crate::risk::errors::RiskError;

pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Category weights used by synthesis. Only listed categories are scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightSet {
    entries: Vec<(RiskCategory, f64)>,
}

impl WeightSet {
    /// Validate and build a weight set. Weights must lie in (0, 1], categories
    /// must be unique and the total must be 1.0 within tolerance.
    pub fn new(entries: Vec<(RiskCategory, f64)>) -> Result<Self, RiskError> {
        if entries.is_empty() {
            return Err(RiskError::InvalidWeights {
                reason: "at least one category is required".to_string(),
            });
        }
        for (index, (category, weight)) in entries.iter().enumerate() {
            if !weight.is_finite() || *weight <= 0.0 || *weight > 1.0 {
                return Err(RiskError::InvalidWeights {
                    reason: format!("{} weight {} is outside (0, 1]", category, weight),
                });
            }
            if entries[..index].iter().any(|(other, _)| other == category) {
                return Err(RiskError::InvalidWeights {
                    reason: format!("{} is listed twice", category),
                });
            }
        }

        let sum: f64 = entries.iter().map(|(_, weight)| weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RiskError::WeightSum { sum });
        }
        Ok(Self { entries })
    }

    /// Rescale positive weights so they sum to 1.0
    pub fn normalized(entries: Vec<(RiskCategory, f64)>) -> Result<Self, RiskError> {
        let sum: f64 = entries.iter().map(|(_, weight)| weight.max(0.0)).sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(RiskError::WeightSum { sum });
        }
        let scaled = entries
            .into_iter()
            .filter(|(_, weight)| *weight > 0.0)
            .map(|(category, weight)| (category, weight / sum))
            .collect();
        Self::new(scaled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weight(&self, category: RiskCategory) -> Option<f64> {
        self.entries.iter().find(|(c, _)| *c == category).map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RiskCategory, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, weight)| weight).sum()
    }
}

impl Default for WeightSet {
    fn default() -> Self {
        Self {
            entries: vec![
                (RiskCategory::Security, 0.35),
                (RiskCategory::Financial, 0.30),
                (RiskCategory::Technical, 0.20),
                (RiskCategory::Governance, 0.15),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sums_to_one() {
        let weights = WeightSet::default();
        assert!((weights.total() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
        assert_eq!(weights.len(), 4);
        assert_eq!(weights.weight(RiskCategory::Security), Some(0.35));
    }

    #[test]
    fn test_rejects_bad_sum() {
        let result = WeightSet::new(vec![(RiskCategory::Security, 0.5), (RiskCategory::Financial, 0.4)]);
        assert!(matches!(result, Err(RiskError::WeightSum { .. })));
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(WeightSet::new(vec![]).is_err());
        let duplicate = WeightSet::new(vec![(RiskCategory::Security, 0.5), (RiskCategory::Security, 0.5)]);
        assert!(matches!(duplicate, Err(RiskError::InvalidWeights { .. })));
    }

    #[test]
    fn test_normalized_rescales() {
        let weights = WeightSet::normalized(vec![(RiskCategory::Security, 3.0), (RiskCategory::Financial, 2.0)]).unwrap();
        assert!((weights.weight(RiskCategory::Security).unwrap() - 0.6).abs() < 1e-12);
        assert!((weights.weight(RiskCategory::Financial).unwrap() - 0.4).abs() < 1e-12);
    }
}
