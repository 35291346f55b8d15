use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{is_present, DiscoveryReport, FinancialReport, SecurityReport, SynthesisOutcome};

/// Identifier of an analysis unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub const DATA_HUNTER: &'static str = "data_hunter";
    pub const PROTOCOL_ANALYST: &'static str = "protocol_analyst";
    pub const MARKET_INTELLIGENCE: &'static str = "market_intelligence";
    pub const RISK_SYNTHESIZER: &'static str = "risk_synthesizer";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Role a unit plays in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Discovery,
    Analysis,
    Synthesis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovery,
    Analysis,
    Synthesis,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Analysis => "analysis",
            Phase::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

/// Structured output of a unit, one variant per report type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum UnitPayload {
    Empty,
    Discovery(Box<DiscoveryReport>),
    Security(Box<SecurityReport>),
    Financial(Box<FinancialReport>),
    Synthesis(Box<SynthesisOutcome>),
}

impl UnitPayload {
    /// Fraction of `fields` present and non-empty in the serialized report
    pub fn field_presence(&self, fields: &[&str]) -> f64 {
        if fields.is_empty() {
            return 1.0;
        }
        let data = match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let present = fields.iter().filter(|field| is_present(data.get(**field))).count();
        present as f64 / fields.len() as f64
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            UnitPayload::Discovery(report) => Some(report.observed_at),
            UnitPayload::Security(report) => Some(report.observed_at),
            UnitPayload::Financial(report) => Some(report.observed_at),
            UnitPayload::Empty | UnitPayload::Synthesis(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, UnitPayload::Empty)
    }
}

/// Outcome of executing one unit within one run. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub unit_id: UnitId,
    pub kind: UnitKind,
    pub succeeded: bool,
    pub payload: UnitPayload,
    pub confidence: f64,
    pub reasoning: String,
    pub duration_ms: u64,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl UnitResult {
    pub fn failure(unit_id: UnitId, kind: UnitKind, errors: Vec<String>, duration_ms: u64, attempts: u32) -> Self {
        Self {
            unit_id,
            kind,
            succeeded: false,
            payload: UnitPayload::Empty,
            confidence: 0.0,
            reasoning: String::new(),
            duration_ms,
            attempts,
            completed_at: Utc::now(),
            errors,
        }
    }
}

/// Shared state of one assessment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub subject_name: String,
    pub started_at: DateTime<Utc>,
    pub parameters: BTreeMap<String, Value>,
    pub prior_results: BTreeMap<UnitId, UnitResult>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, subject_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            subject_name: subject_name.into(),
            started_at: Utc::now(),
            parameters: BTreeMap::new(),
            prior_results: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Record a unit's result. A unit that already reported keeps its first result.
    pub fn append(&mut self, result: UnitResult) -> bool {
        if self.prior_results.contains_key(&result.unit_id) {
            return false;
        }
        self.prior_results.insert(result.unit_id.clone(), result);
        true
    }

    pub fn result(&self, unit_id: &str) -> Option<&UnitResult> {
        self.prior_results.get(&UnitId::from(unit_id))
    }

    /// Discovery report from a successful discovery unit, if one ran
    pub fn discovery(&self) -> Option<&DiscoveryReport> {
        self.prior_results.values().find_map(|result| match (&result.payload, result.succeeded) {
            (UnitPayload::Discovery(report), true) => Some(report.as_ref()),
            _ => None,
        })
    }

    pub fn successful_results(&self) -> impl Iterator<Item = &UnitResult> {
        self.prior_results.values().filter(|result| result.succeeded)
    }
}
