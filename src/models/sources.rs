use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream data sources consulted for a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Github,
    DefiData,
    Blockchain,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Github, SourceKind::DefiData, SourceKind::Blockchain];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Github => "github",
            SourceKind::DefiData => "defi_data",
            SourceKind::Blockchain => "blockchain",
        }
    }

    /// Top-level payload fields a complete response from this source carries
    pub fn expected_fields(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Github => &["health_score", "repository_metrics", "health_components"],
            SourceKind::DefiData => &["financial_health_score", "tvl_metrics", "price_metrics"],
            SourceKind::Blockchain => &["onchain_health_score", "contract_verification", "network_activity"],
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response contract every data-fetch client returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResponse {
    pub source: SourceKind,
    pub success: bool,
    pub payload: Value,
    pub confidence_hint: f64,
    pub errors: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl SourceResponse {
    pub fn ok(source: SourceKind, payload: Value, confidence_hint: f64) -> Self {
        Self {
            source,
            success: true,
            payload,
            confidence_hint: confidence_hint.clamp(0.0, 1.0),
            errors: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    pub fn failed(source: SourceKind, error: impl Into<String>) -> Self {
        Self {
            source,
            success: false,
            payload: Value::Null,
            confidence_hint: 0.0,
            errors: vec![error.into()],
            fetched_at: Utc::now(),
        }
    }

    /// Fraction of the source's expected fields present and non-empty
    pub fn completeness(&self) -> f64 {
        if !self.success {
            return 0.0;
        }
        let expected = self.source.expected_fields();
        let present = expected
            .iter()
            .filter(|field| is_present(self.payload.get(**field)))
            .count();
        present as f64 / expected.len() as f64
    }

    pub fn protocol_name(&self) -> Option<&str> {
        self.payload.get("protocol_name").and_then(Value::as_str)
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.payload.get("last_updated").and_then(Value::as_str)
    }
}

/// Truthiness of a JSON field: present, non-null, non-empty, non-zero
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryMetrics {
    pub commits_30d: u64,
    pub unique_authors: u64,
    pub security_commits: u64,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthComponents {
    pub community_engagement: f64,
    pub maintenance_quality: f64,
    pub security_awareness: f64,
}

/// Development activity snapshot from a code-hosting source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSnapshot {
    pub protocol_name: Option<String>,
    pub health_score: Option<f64>,
    pub repository_metrics: RepositoryMetrics,
    pub health_components: HealthComponents,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractVerification {
    pub is_verified: bool,
    pub optimization_used: bool,
    pub license_type: Option<String>,
    pub compiler_version: Option<String>,
    pub proxy: bool,
    pub implementation: Option<String>,
}

impl ContractVerification {
    pub fn has_implementation(&self) -> bool {
        self.implementation.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// Contract and chain activity snapshot from a block explorer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnchainSnapshot {
    pub protocol_name: Option<String>,
    pub onchain_health_score: Option<f64>,
    pub contract_verification: ContractVerification,
    pub health_components: HealthComponents,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvlPoint {
    pub tvl_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvlMetrics {
    pub current_tvl_usd: f64,
    pub tvl_change_30d_percent: f64,
    pub historical_tvl: Vec<TvlPoint>,
    pub mcap_tvl_ratio: Option<f64>,
    pub tvl_rank: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainDistribution {
    pub chain_count: u32,
    pub chains: BTreeMap<String, f64>,
    pub total_tvl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceMetrics {
    pub current_price_usd: f64,
    pub price_change_24h_percent: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketData {
    pub price_change_7d_percent: Option<f64>,
    pub price_change_30d_percent: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub all_time_high: Option<f64>,
    pub liquidity_score: Option<f64>,
}

/// TVL, price and market snapshot from a DeFi data aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSnapshot {
    pub protocol_name: Option<String>,
    pub category: Option<String>,
    pub tvl_metrics: Option<TvlMetrics>,
    pub chain_distribution: ChainDistribution,
    pub price_metrics: Option<PriceMetrics>,
    pub market_data: Option<MarketData>,
}

/// Typed snapshots handed from discovery to the analysis units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshots {
    pub github: Option<GithubSnapshot>,
    pub onchain: Option<OnchainSnapshot>,
    pub market: Option<MarketSnapshot>,
}

impl SourceSnapshots {
    pub fn is_empty(&self) -> bool {
        self.github.is_none() && self.onchain.is_none() && self.market.is_none()
    }

    /// Parse a successful response into the matching typed snapshot.
    /// Malformed payloads leave the slot empty.
    pub fn absorb(&mut self, response: &SourceResponse) {
        if !response.success {
            return;
        }
        match response.source {
            SourceKind::Github => {
                self.github = serde_json::from_value(response.payload.clone()).ok();
            }
            SourceKind::Blockchain => {
                self.onchain = serde_json::from_value(response.payload.clone()).ok();
            }
            SourceKind::DefiData => {
                self.market = serde_json::from_value(response.payload.clone()).ok();
            }
        }
    }
}
