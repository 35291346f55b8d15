use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::models::{
    AnalysisGroup, ClassifiedRisk, FactorAssessment, FinancialReport, Impact, MarketData, MarketSnapshot,
    MarketSourcesUsed, PriceMetrics, RiskFactors, RunContext, Severity, SourceKind, TvlMetrics, UnitId, UnitKind,
    UnitPayload,
};
use crate::services::{DataSourceClient, NarrativeGenerator};
use crate::units::data_hunter::fetch_snapshots;
use crate::units::traits::{AnalysisUnit, UnitAnalysis, UnitError};
use crate::utils::math::{coefficient_of_variation, round_to};

const FINANCIAL_WEIGHT: f64 = 0.35;
const MARKET_WEIGHT: f64 = 0.25;
const LIQUIDITY_WEIGHT: f64 = 0.25;
const SUSTAINABILITY_WEIGHT: f64 = 0.15;

const TVL_DECLINE_HIGH: f64 = -30.0;
const TVL_DECLINE_CRITICAL: f64 = -50.0;
const VOLUME_RATIO_LOW: f64 = 0.5;
const VOLATILITY_HIGH: f64 = 30.0;
const FINANCIAL_COMPONENT_COUNT: f64 = 4.0;

const CRITICAL_KEYWORDS: [&str; 4] = ["critical", "significant", "high", "extremely"];
const HIGH_KEYWORDS: [&str; 4] = ["decline", "low", "poor", "small"];

const MILLION: f64 = 1_000_000.0;
const BILLION: f64 = 1_000_000_000.0;

/// Read-only view over a market snapshot with absent sections defaulted
struct MarketView<'a> {
    snapshot: &'a MarketSnapshot,
    tvl: TvlMetrics,
    price: PriceMetrics,
    market: MarketData,
}

impl<'a> MarketView<'a> {
    fn new(snapshot: &'a MarketSnapshot) -> Self {
        Self {
            snapshot,
            tvl: snapshot.tvl_metrics.clone().unwrap_or_default(),
            price: snapshot.price_metrics.clone().unwrap_or_default(),
            market: snapshot.market_data.clone().unwrap_or_default(),
        }
    }

    /// Volume over market cap in percent, when both are positive
    fn volume_ratio(&self) -> Option<f64> {
        (self.price.market_cap_usd > 0.0 && self.price.volume_24h_usd > 0.0)
            .then(|| self.price.volume_24h_usd / self.price.market_cap_usd * 100.0)
    }

    fn mcap_tvl_ratio(&self) -> Option<f64> {
        self.tvl.mcap_tvl_ratio.filter(|r| *r != 0.0)
    }
}

fn tvl_analysis(view: &MarketView) -> FactorAssessment {
    let tvl = view.tvl.current_tvl_usd;
    let change = view.tvl.tvl_change_30d_percent;
    let mut score = 50.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if tvl > 0.0 {
        score += ((tvl / MILLION).log10() * 15.0).min(50.0);
        if tvl > BILLION {
            details.push(format!("Large-scale protocol with ${:.1}B TVL", tvl / BILLION));
        } else if tvl > 100.0 * MILLION {
            details.push(format!("Medium-scale protocol with ${:.0}M TVL", tvl / MILLION));
        } else {
            details.push(format!("Small-scale protocol with ${:.1}M TVL", tvl / MILLION));
            if tvl < 10.0 * MILLION {
                risks.push("Low TVL indicates limited adoption".to_string());
                score -= 15.0;
            }
        }
    }

    if change > 20.0 {
        score += 15.0;
        details.push(format!("Strong TVL growth of {:.1}% in 30 days", change));
    } else if change > 0.0 {
        score += 5.0;
        details.push(format!("Positive TVL growth of {:.1}% in 30 days", change));
    } else if change > TVL_DECLINE_HIGH {
        score -= 10.0;
        details.push(format!("TVL decline of {:.1}% in 30 days", change));
    } else if change > TVL_DECLINE_CRITICAL {
        score -= 25.0;
        risks.push(format!("Significant TVL decline of {:.1}% in 30 days", change));
    } else {
        score -= 40.0;
        risks.push(format!("Critical TVL decline of {:.1}% in 30 days", change));
    }

    let trend = if change > 5.0 {
        "growth"
    } else if change > -5.0 {
        "stable"
    } else {
        "decline"
    };
    FactorAssessment::new("tvl_analysis", score, details, risks).with_label(trend)
}

fn growth_analysis(view: &MarketView) -> FactorAssessment {
    let distribution = &view.snapshot.chain_distribution;
    let chain_count = distribution.chain_count;
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if chain_count > 5 {
        score += 20.0;
        details.push(format!("Multi-chain presence across {} networks", chain_count));
    } else if chain_count > 1 {
        score += 10.0;
        details.push(format!("Multi-chain deployment on {} networks", chain_count));
    } else {
        risks.push("Single-chain dependency".to_string());
        score -= 10.0;
    }

    let largest_chain = distribution
        .chains
        .iter()
        .filter(|(name, _)| !name.ends_with("_percentage"))
        .map(|(_, tvl)| *tvl)
        .fold(None, |max: Option<f64>, tvl| Some(max.map_or(tvl, |m| m.max(tvl))));
    if let Some(largest) = largest_chain.filter(|_| distribution.total_tvl > 0.0) {
        let concentration = largest / distribution.total_tvl * 100.0;
        if concentration > 80.0 {
            risks.push("High chain concentration risk".to_string());
            score -= 15.0;
        } else if concentration > 60.0 {
            details.push("Moderate chain concentration".to_string());
            score -= 5.0;
        } else {
            details.push("Well-distributed across chains".to_string());
            score += 10.0;
        }
    }

    let diversification = if chain_count > 3 {
        "high"
    } else if chain_count > 1 {
        "medium"
    } else {
        "low"
    };
    FactorAssessment::new("growth_analysis", score, details, risks).with_label(diversification)
}

fn stability_analysis(view: &MarketView) -> FactorAssessment {
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if view.tvl.historical_tvl.len() >= 5 {
        let values: Vec<f64> = view.tvl.historical_tvl.iter().map(|p| p.tvl_usd).collect();
        if let Some(volatility) = coefficient_of_variation(&values) {
            if volatility < 0.1 {
                score += 20.0;
                details.push("Low TVL volatility indicates stability".to_string());
            } else if volatility < 0.3 {
                score += 10.0;
                details.push("Moderate TVL volatility".to_string());
            } else {
                score -= 15.0;
                risks.push("High TVL volatility".to_string());
            }
        }
    }

    if let Some(ratio) = view.mcap_tvl_ratio() {
        if (0.5..=2.0).contains(&ratio) {
            score += 10.0;
            details.push("Healthy market cap to TVL ratio".to_string());
        } else if ratio > 5.0 {
            score -= 10.0;
            risks.push("High market cap relative to TVL".to_string());
        } else if ratio < 0.2 {
            score -= 5.0;
            details.push("Low market cap relative to TVL".to_string());
        }
    }
    FactorAssessment::new("stability_analysis", score, details, risks)
}

fn scale_analysis(view: &MarketView) -> FactorAssessment {
    let tvl = view.tvl.current_tvl_usd;
    let mut score = 50.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if tvl > 5.0 * BILLION {
        score += 30.0;
        details.push("Top-tier protocol by TVL".to_string());
    } else if tvl > BILLION {
        score += 20.0;
        details.push("Large-scale protocol".to_string());
    } else if tvl > 100.0 * MILLION {
        score += 10.0;
        details.push("Medium-scale protocol".to_string());
    } else if tvl > 10.0 * MILLION {
        details.push("Small-scale protocol".to_string());
    } else {
        risks.push("Very small protocol scale".to_string());
        score -= 20.0;
    }

    if let Some(rank) = view.tvl.tvl_rank.filter(|r| *r > 0) {
        if rank <= 10 {
            score += 20.0;
            details.push(format!("Top 10 protocol by TVL (rank #{})", rank));
        } else if rank <= 50 {
            score += 10.0;
            details.push(format!("Top 50 protocol by TVL (rank #{})", rank));
        } else if rank <= 100 {
            details.push(format!("Top 100 protocol by TVL (rank #{})", rank));
        } else {
            details.push(format!("Ranked #{} by TVL", rank));
        }
    }
    FactorAssessment::new("scale_analysis", score, details, risks)
}

fn price_performance(view: &MarketView) -> FactorAssessment {
    let price = view.price.current_price_usd;
    let change_24h = view.price.price_change_24h_percent;
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if price > 0.0 {
        details.push(format!("Current token price: ${:.2}", price));
        if change_24h.abs() < 5.0 {
            score += 10.0;
            details.push("Stable price action (24h)".to_string());
        } else if change_24h.abs() < 15.0 {
            details.push(format!("Moderate price movement: {:.1}% (24h)", change_24h));
        } else if change_24h.abs() > VOLATILITY_HIGH {
            score -= 15.0;
            risks.push(format!("High price volatility: {:.1}% (24h)", change_24h));
        }

        let change_7d = view.market.price_change_7d_percent.unwrap_or(0.0);
        let change_30d = view.market.price_change_30d_percent.unwrap_or(0.0);
        if change_7d != 0.0 && change_30d != 0.0 {
            if change_30d > 20.0 {
                score += 15.0;
                details.push(format!("Strong 30-day performance: {:.1}%", change_30d));
            } else if change_30d < -30.0 {
                score -= 10.0;
                risks.push(format!("Poor 30-day performance: {:.1}%", change_30d));
            }
        }
    }

    let trend = if change_24h > 5.0 {
        "bullish"
    } else if change_24h < -5.0 {
        "bearish"
    } else {
        "stable"
    };
    FactorAssessment::new("price_performance", score, details, risks).with_label(trend)
}

fn trading_activity(view: &MarketView) -> FactorAssessment {
    let volume = view.price.volume_24h_usd;
    let mut score = 50.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if volume > 0.0 {
        if volume > 10.0 * MILLION {
            score += 20.0;
            details.push(format!("High trading volume: ${:.1}M", volume / MILLION));
        } else if volume > MILLION {
            score += 10.0;
            details.push(format!("Good trading volume: ${:.1}M", volume / MILLION));
        } else if volume < 100_000.0 {
            score -= 15.0;
            risks.push("Low trading volume".to_string());
        }
    }

    if let Some(ratio) = view.volume_ratio() {
        if (1.0..=15.0).contains(&ratio) {
            score += 15.0;
            details.push(format!("Healthy volume/mcap ratio: {:.1}%", ratio));
        } else if ratio > 50.0 {
            score -= 10.0;
            risks.push("Extremely high trading turnover".to_string());
        } else if ratio < VOLUME_RATIO_LOW {
            score -= 10.0;
            risks.push("Low trading activity relative to market cap".to_string());
        }
    }

    let liquidity = if volume > 10.0 * MILLION {
        "high"
    } else if volume > MILLION {
        "medium"
    } else {
        "low"
    };
    FactorAssessment::new("trading_activity", score, details, risks).with_label(liquidity)
}

fn market_position(view: &MarketView) -> FactorAssessment {
    let market_cap = view.price.market_cap_usd;
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if let Some(rank) = view.market.market_cap_rank.filter(|r| *r > 0) {
        if rank <= 20 {
            score += 25.0;
            details.push(format!("Top 20 token by market cap (rank #{})", rank));
        } else if rank <= 100 {
            score += 15.0;
            details.push(format!("Top 100 token by market cap (rank #{})", rank));
        } else if rank <= 500 {
            score += 5.0;
            details.push(format!("Top 500 token by market cap (rank #{})", rank));
        } else {
            details.push(format!("Market cap rank: #{}", rank));
        }
    }

    if market_cap > 0.0 {
        if market_cap > 10.0 * BILLION {
            score += 20.0;
            details.push("Large-cap token".to_string());
        } else if market_cap > BILLION {
            score += 10.0;
            details.push("Mid-cap token".to_string());
        } else if market_cap < 100.0 * MILLION {
            risks.push("Small market capitalization".to_string());
            score -= 10.0;
        }
    }
    FactorAssessment::new("market_position", score, details, risks)
}

fn volatility_assessment(view: &MarketView) -> FactorAssessment {
    let change_24h = view.price.price_change_24h_percent;
    let mut score = 70.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if change_24h.abs() < 5.0 {
        score += 15.0;
        details.push("Low 24h price volatility".to_string());
    } else if change_24h.abs() > 20.0 {
        score -= 20.0;
        risks.push("High 24h price volatility".to_string());
    }

    if view.market.price_change_7d_percent.map(|c| c.abs() > 40.0).unwrap_or(false) {
        score -= 15.0;
        risks.push("High 7-day price volatility".to_string());
    }

    let price = view.price.current_price_usd;
    if let Some(ath) = view.market.all_time_high.filter(|a| *a != 0.0) {
        if price > 0.0 {
            let distance = (ath - price) / ath * 100.0;
            if distance < 20.0 {
                details.push("Near all-time high".to_string());
                score += 5.0;
            } else if distance > 80.0 {
                details.push("Far from all-time high".to_string());
                score -= 5.0;
            }
        }
    }

    let level = if change_24h.abs() < 5.0 {
        "low"
    } else if change_24h.abs() > 20.0 {
        "high"
    } else {
        "medium"
    };
    FactorAssessment::new("volatility_assessment", score, details, risks).with_label(level)
}

fn trading_liquidity(view: &MarketView) -> FactorAssessment {
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if let Some(liquidity) = view.market.liquidity_score.filter(|l| *l != 0.0) {
        score = liquidity * 100.0;
        if score > 80.0 {
            details.push("Excellent liquidity depth".to_string());
        } else if score > 60.0 {
            details.push("Good liquidity depth".to_string());
        } else if score < 40.0 {
            risks.push("Poor liquidity depth".to_string());
        }
    }
    FactorAssessment::new("trading_liquidity", score, details, risks)
}

fn market_depth(view: &MarketView) -> FactorAssessment {
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if let Some(ratio) = view.volume_ratio() {
        if (2.0..=20.0).contains(&ratio) {
            score += 20.0;
            details.push("Healthy market depth indicators".to_string());
        } else if ratio < 1.0 {
            score -= 15.0;
            risks.push("Low market depth".to_string());
        } else if ratio > 50.0 {
            score -= 10.0;
            risks.push("Potentially thin order book".to_string());
        }
    }
    FactorAssessment::new("market_depth", score, details, risks)
}

fn liquidity_stability(view: &MarketView) -> FactorAssessment {
    let change = view.tvl.tvl_change_30d_percent;
    let mut score = 70.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if change.abs() < 20.0 {
        score += 15.0;
        details.push("Stable liquidity over 30 days".to_string());
    } else if change < -50.0 {
        score -= 25.0;
        risks.push("Significant liquidity outflow".to_string());
    }
    FactorAssessment::new("liquidity_stability", score, details, risks)
}

fn revenue_model(view: &MarketView) -> FactorAssessment {
    let category = view.snapshot.category.clone().unwrap_or_default().to_lowercase();
    let change = view.tvl.tvl_change_30d_percent;
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if category.contains("lending") {
        score += 10.0;
        details.push("Lending protocol - sustainable fee model".to_string());
    } else if category.contains("dex") || category.contains("exchange") {
        score += 15.0;
        details.push("DEX protocol - trading fee revenue".to_string());
    } else if category.contains("yield") || category.contains("farming") {
        score -= 5.0;
        details.push("Yield farming - sustainability depends on incentives".to_string());
    }

    if change > 10.0 {
        score += 15.0;
        details.push("Growing TVL indicates healthy revenue model".to_string());
    } else if change < -20.0 {
        score -= 10.0;
        risks.push("Declining TVL may indicate revenue model issues".to_string());
    }
    FactorAssessment::new("revenue_model", score, details, risks)
}

fn yield_sources(view: &MarketView) -> FactorAssessment {
    let chain_count = view.snapshot.chain_distribution.chain_count;
    let tvl = view.tvl.current_tvl_usd;
    let mut score = 65.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if chain_count > 3 {
        score += 15.0;
        details.push("Multi-chain deployment diversifies yield sources".to_string());
    } else if chain_count == 1 {
        score -= 10.0;
        risks.push("Single-chain dependency for yield generation".to_string());
    }

    if tvl > BILLION {
        score += 10.0;
        details.push("Large TVL indicates mature yield generation".to_string());
    } else if tvl < 50.0 * MILLION {
        score -= 5.0;
        details.push("Small TVL - yield sustainability unproven".to_string());
    }
    FactorAssessment::new("yield_sources", score, details, risks)
}

fn economic_sustainability(view: &MarketView) -> FactorAssessment {
    let mut score = 60.0;
    let mut details = Vec::new();
    let mut risks = Vec::new();

    if let Some(ratio) = view.mcap_tvl_ratio() {
        if (0.3..=3.0).contains(&ratio) {
            score += 15.0;
            details.push("Healthy market cap to TVL ratio".to_string());
        } else if ratio > 10.0 {
            score -= 10.0;
            risks.push("Very high market cap relative to TVL".to_string());
        } else if ratio < 0.1 {
            score -= 5.0;
            details.push("Very low market cap relative to TVL".to_string());
        }
    }

    if view.snapshot.tvl_metrics.is_some() && view.snapshot.price_metrics.is_some() {
        score += 10.0;
        details.push("Comprehensive market data suggests established protocol".to_string());
    }
    FactorAssessment::new("economic_sustainability", score, details, risks)
}

fn risk_severity(description: &str, factor_score: f64) -> Severity {
    let lower = description.to_lowercase();
    if CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k)) || factor_score < 20.0 {
        Severity::Critical
    } else if HIGH_KEYWORDS.iter().any(|k| lower.contains(k)) || factor_score < 40.0 {
        Severity::High
    } else if factor_score < 60.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn classify(category: &str, group: &AnalysisGroup) -> Vec<ClassifiedRisk> {
    group
        .components
        .iter()
        .flat_map(|factor| {
            factor.risks.iter().map(move |risk| ClassifiedRisk {
                category: category.to_string(),
                subcategory: factor.name.clone(),
                description: risk.clone(),
                severity: risk_severity(risk, factor.score),
                impact: Impact::from_factor_score(factor.score),
            })
        })
        .collect()
}

pub fn financial_rating(financial_score: f64) -> &'static str {
    if financial_score >= 85.0 {
        "EXCELLENT"
    } else if financial_score >= 70.0 {
        "GOOD"
    } else if financial_score >= 55.0 {
        "MODERATE"
    } else if financial_score >= 40.0 {
        "POOR"
    } else {
        "CRITICAL"
    }
}

fn recommendations(financial: &AnalysisGroup, market: &AnalysisGroup, liquidity: &AnalysisGroup) -> Vec<String> {
    let mut recommendations = Vec::new();
    let label = |group: &AnalysisGroup, name: &str| group.component(name).and_then(|f| f.label.clone());

    if label(financial, "tvl_analysis").as_deref() == Some("decline") {
        recommendations.push("Monitor TVL trends closely for further decline".to_string());
    }
    if label(market, "trading_activity").as_deref() == Some("low") {
        recommendations.push("Exercise caution due to low trading liquidity".to_string());
    }
    if liquidity.overall_score < 50.0 {
        recommendations.push("Consider potential liquidity constraints for large positions".to_string());
    }
    recommendations
}

/// Score a market snapshot into a financial report plus the analyst's own confidence
pub fn assess_market(snapshot: &MarketSnapshot) -> (FinancialReport, f64) {
    let view = MarketView::new(snapshot);

    let financial = AnalysisGroup::from_components(vec![
        tvl_analysis(&view),
        growth_analysis(&view),
        stability_analysis(&view),
        scale_analysis(&view),
    ]);
    let market = AnalysisGroup::from_components(vec![
        price_performance(&view),
        trading_activity(&view),
        market_position(&view),
        volatility_assessment(&view),
    ]);
    let liquidity = AnalysisGroup::from_components(vec![
        trading_liquidity(&view),
        market_depth(&view),
        liquidity_stability(&view),
    ]);
    let sustainability = AnalysisGroup::from_components(vec![
        revenue_model(&view),
        yield_sources(&view),
        economic_sustainability(&view),
    ]);

    let mut risks = classify("financial", &financial);
    risks.extend(classify("market", &market));
    risks.extend(classify("liquidity", &liquidity));
    risks.extend(classify("sustainability", &sustainability));

    let mut risk_factors = RiskFactors::default();
    for risk in &risks {
        risk_factors.push(risk.severity, &risk.description);
    }

    let financial_health_score = round_to(
        financial.overall_score * FINANCIAL_WEIGHT
            + market.overall_score * MARKET_WEIGHT
            + liquidity.overall_score * LIQUIDITY_WEIGHT
            + sustainability.overall_score * SUSTAINABILITY_WEIGHT,
        2,
    );

    let availability = [
        if snapshot.tvl_metrics.is_some() { 0.9 } else { 0.3 },
        if snapshot.price_metrics.is_some() { 0.9 } else { 0.4 },
        if snapshot.market_data.is_some() { 0.8 } else { 0.5 },
        financial.components.len() as f64 / FINANCIAL_COMPONENT_COUNT,
    ];
    let confidence = (availability.iter().sum::<f64>() / availability.len() as f64).clamp(0.4, 1.0);

    let report = FinancialReport {
        financial_health_score,
        financial_rating: financial_rating(financial.overall_score).to_string(),
        recommendations: recommendations(&financial, &market, &liquidity),
        financial,
        market,
        liquidity,
        sustainability,
        risks,
        risk_factors,
        sources_used: MarketSourcesUsed {
            defi_data: true,
            tvl: snapshot.tvl_metrics.is_some(),
            price: snapshot.price_metrics.is_some(),
        },
        narrative: None,
        observed_at: Utc::now(),
    };
    (report, confidence)
}

/// Analysis unit scoring financial, market, liquidity and sustainability health
pub struct MarketIntelligence {
    sources: Vec<Arc<dyn DataSourceClient>>,
    fetch_timeout: Duration,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
}

impl MarketIntelligence {
    pub fn new(sources: Vec<Arc<dyn DataSourceClient>>, fetch_timeout: Duration) -> Self {
        Self {
            sources,
            fetch_timeout,
            narrator: None,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    async fn market_snapshot(&self, ctx: &RunContext) -> Option<MarketSnapshot> {
        if let Some(market) = ctx.discovery().and_then(|d| d.snapshots.market.clone()) {
            return Some(market);
        }
        debug!(protocol = %ctx.subject_name, "No discovery market snapshot, fetching directly");
        fetch_snapshots(&self.sources, &[SourceKind::DefiData], &ctx.subject_name, self.fetch_timeout)
            .await
            .market
    }
}

#[async_trait]
impl AnalysisUnit for MarketIntelligence {
    fn unit_id(&self) -> UnitId {
        UnitId::from(UnitId::MARKET_INTELLIGENCE)
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Analysis
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["financial_health_score", "financial", "market", "liquidity"]
    }

    async fn analyze(&self, ctx: &RunContext) -> Result<UnitAnalysis, UnitError> {
        info!(protocol = %ctx.subject_name, run_id = %ctx.run_id, "Starting financial analysis");

        let snapshot = self.market_snapshot(ctx).await.ok_or_else(|| UnitError::MissingData {
            field: "defi_data snapshot".to_string(),
        })?;
        let (mut report, completeness) = assess_market(&snapshot);

        if let Some(narrator) = &self.narrator {
            let prompt = format!(
                "Analyze the financial assessment for {} and summarize its market strengths and vulnerabilities.",
                ctx.subject_name
            );
            let high_risk_count = report
                .risks
                .iter()
                .filter(|r| matches!(r.severity, Severity::Critical | Severity::High))
                .count();
            let context = json!({
                "financial_score": report.financial.overall_score,
                "market_score": report.market.overall_score,
                "liquidity_score": report.liquidity.overall_score,
                "sustainability_score": report.sustainability.overall_score,
                "high_risk_count": high_risk_count,
                "total_risks": report.risks.len(),
            });
            report.narrative = narrator.generate(&prompt, &context).await.ok();
        }

        let mut warnings = Vec::new();
        if snapshot.tvl_metrics.is_none() {
            warnings.push("tvl metrics unavailable".to_string());
        }
        if snapshot.price_metrics.is_none() {
            warnings.push("price metrics unavailable".to_string());
        }

        let reasoning = report
            .narrative
            .clone()
            .unwrap_or_else(|| format!("Financial analysis completed for {}", ctx.subject_name));
        info!(
            protocol = %ctx.subject_name,
            financial_health_score = report.financial_health_score,
            risks_identified = report.risks.len(),
            "Financial analysis completed"
        );

        Ok(UnitAnalysis::new(UnitPayload::Financial(Box::new(report)), completeness, reasoning).with_warnings(warnings))
    }
}
