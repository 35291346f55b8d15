pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod risk;
pub mod services;
pub mod units;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

pub use error::types::*;

use crate::config::Settings;
use crate::models::SourceKind;
use crate::orchestrator::{AssessmentOrchestrator, OrchestratorConfig, UnitRoster};
use crate::risk::SynthesisEngine;
use crate::services::{
    AssessmentCache, DataSourceClient, HttpDataSource, NarrativeClient, NarrativeGenerator, SessionStore,
};
use crate::units::{
    DataHunter, ExecutorConfig, MarketIntelligence, ProtocolAnalyst, RiskSynthesizer, UnitExecutor, UnitMemory,
};
use crate::utils::{CacheConfig, CacheStore, RedisStore};

/// Shared state handed to every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AssessmentOrchestrator>,
    pub settings: Settings,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<AssessmentOrchestrator>, settings: Settings) -> Self {
        Self {
            orchestrator,
            settings,
            started_at: Utc::now(),
        }
    }
}

fn build_sources(settings: &Settings) -> Vec<Arc<dyn DataSourceClient>> {
    let retries = settings.sources.retry_attempts;
    vec![
        Arc::new(HttpDataSource::new(SourceKind::Github, &settings.sources.github_url).with_retry_attempts(retries)),
        Arc::new(HttpDataSource::new(SourceKind::DefiData, &settings.sources.defi_data_url).with_retry_attempts(retries)),
        Arc::new(HttpDataSource::new(SourceKind::Blockchain, &settings.sources.blockchain_url).with_retry_attempts(retries)),
    ]
}

fn build_cache(settings: &Settings) -> Option<AssessmentCache> {
    if !settings.cache.enabled {
        return None;
    }
    let config = CacheConfig::risk_assessments()
        .with_ttl(Duration::from_secs(settings.cache.ttl_seconds))
        .with_capacity(settings.cache.max_capacity);

    let l2: Option<Arc<dyn CacheStore>> = if settings.cache.redis_enabled {
        match RedisStore::open(&settings.cache.redis_url) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, running with in-memory cache only");
                None
            }
        }
    } else {
        None
    };
    Some(AssessmentCache::new(config, l2))
}

/// Wire the units, engine, store and cache described by `settings`
pub fn build_orchestrator(settings: &Settings) -> Result<AssessmentOrchestrator, AppError> {
    let weights = settings
        .weights
        .to_weight_set()
        .map_err(|e| AppError::ConfigError(e.to_string()))?;
    let engine = Arc::new(SynthesisEngine::new(weights, SynthesisEngine::default().expected_units().to_vec()));

    let sources = build_sources(settings);
    let fetch_timeout = Duration::from_secs(settings.sources.fetch_timeout_seconds);
    let narrator: Option<Arc<dyn NarrativeGenerator>> = settings.narrative.enabled.then(|| {
        Arc::new(NarrativeClient::new(
            &settings.narrative.url,
            Duration::from_secs(settings.narrative.timeout_seconds),
        )) as Arc<dyn NarrativeGenerator>
    });

    let mut data_hunter = DataHunter::new(sources.clone(), fetch_timeout);
    let mut protocol_analyst = ProtocolAnalyst::new(sources.clone(), fetch_timeout);
    let mut market_intelligence = MarketIntelligence::new(sources, fetch_timeout);
    let mut risk_synthesizer = RiskSynthesizer::new(Arc::clone(&engine));
    if let Some(narrator) = &narrator {
        data_hunter = data_hunter.with_narrator(Arc::clone(narrator));
        protocol_analyst = protocol_analyst.with_narrator(Arc::clone(narrator));
        market_intelligence = market_intelligence.with_narrator(Arc::clone(narrator));
        risk_synthesizer = risk_synthesizer.with_narrator(Arc::clone(narrator));
    }

    let roster = UnitRoster {
        discovery: Arc::new(data_hunter),
        analysis: vec![Arc::new(protocol_analyst), Arc::new(market_intelligence)],
        synthesis: Arc::new(risk_synthesizer),
    };

    let store = SessionStore::new(settings.session.max_age());
    let executor = UnitExecutor::new(
        ExecutorConfig {
            timeout: settings.orchestrator.unit_timeout(),
            retry_policy: settings.orchestrator.retry_policy(),
        },
        store.clone(),
        Arc::new(UnitMemory::new()),
    );
    let config = OrchestratorConfig {
        validate_subjects: settings.orchestrator.validate_subjects,
        max_concurrent_units: settings.orchestrator.max_concurrent_units,
    };

    let mut orchestrator = AssessmentOrchestrator::new(roster, engine, executor, store, config)?;
    if let Some(cache) = build_cache(settings) {
        orchestrator = orchestrator.with_cache(cache);
    }
    info!(
        narrative_enabled = settings.narrative.enabled,
        cache_enabled = settings.cache.enabled,
        "Assessment orchestrator assembled"
    );
    Ok(orchestrator)
}
