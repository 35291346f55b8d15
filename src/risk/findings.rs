use std::collections::HashSet;

use crate::models::{ClassifiedRisk, GapImpact, Severity};
use crate::risk::components::UnitOutputs;

const CRITICAL_SCORE_MAX: f64 = 30.0;
const MAJOR_SCORE_MAX: f64 = 55.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Critical,
    Major,
    Minor,
}

impl Bucket {
    fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Bucket::Critical,
            Severity::High => Bucket::Major,
            Severity::Medium | Severity::Low => Bucket::Minor,
        }
    }

    /// Eligibility from the health score of the factor the risk came from
    fn from_factor_score(score: f64) -> Self {
        if score < CRITICAL_SCORE_MAX {
            Bucket::Critical
        } else if score < MAJOR_SCORE_MAX {
            Bucket::Major
        } else {
            Bucket::Minor
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub critical: Vec<String>,
    pub major: Vec<String>,
    pub minor: Vec<String>,
    seen: HashSet<String>,
}

impl Findings {
    fn push(&mut self, bucket: Bucket, text: &str) {
        if !self.seen.insert(text.to_string()) {
            return;
        }
        let target = match bucket {
            Bucket::Critical => &mut self.critical,
            Bucket::Major => &mut self.major,
            Bucket::Minor => &mut self.minor,
        };
        target.push(text.to_string());
    }

    fn push_risk(&mut self, risk: &ClassifiedRisk, factor_score: Option<f64>) {
        let by_severity = Bucket::from_severity(risk.severity);
        let bucket = factor_score
            .map(Bucket::from_factor_score)
            .map_or(by_severity, |by_score| by_severity.min(by_score));
        self.push(bucket, &risk.description);
    }
}

/// Bucket every analyst risk into critical, major or minor findings. A risk
/// lands in the more severe of its severity bucket and its factor-score
/// bucket. High-impact data gaps are critical. Texts appear once, first
/// occurrence wins.
pub fn extract_findings(outputs: &UnitOutputs) -> Findings {
    let mut findings = Findings::default();

    if let Some((_, report)) = outputs.security {
        for risk in &report.risks {
            let group = if risk.category == "governance" {
                &report.governance
            } else {
                &report.technical
            };
            let score = group.component(&risk.subcategory).map(|factor| factor.score);
            findings.push_risk(risk, score);
        }
    }

    if let Some((_, report)) = outputs.financial {
        for risk in &report.risks {
            let score = [&report.financial, &report.market, &report.liquidity, &report.sustainability]
                .iter()
                .find_map(|group| group.component(&risk.subcategory))
                .map(|factor| factor.score);
            findings.push_risk(risk, score);
        }
    }

    if let Some((_, report)) = outputs.discovery {
        for gap in report.data_gaps.iter().filter(|gap| gap.impact == GapImpact::High) {
            findings.push(Bucket::Critical, &gap.finding());
        }
    }
    findings
}
