mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use common::*;
use defi_risk_orchestrator::models::*;
use defi_risk_orchestrator::orchestrator::HealthState;
use defi_risk_orchestrator::risk::WeightSet;
use defi_risk_orchestrator::services::AssessmentCache;
use defi_risk_orchestrator::units::{AnalysisUnit, UnitError, TIMEOUT_ERROR};
use defi_risk_orchestrator::utils::CacheConfig;

const SUBJECT: &str = "Aave V3";

fn missing(field: &str) -> Behavior {
    Behavior::Fail(UnitError::MissingData { field: field.to_string() })
}

fn healthy_units() -> (Arc<StubUnit>, Arc<StubUnit>, Arc<StubUnit>) {
    (
        discovery_unit(Behavior::Succeed(discovery_payload(80.0))),
        security_unit(Behavior::Succeed(security_payload(60.0))),
        market_unit(Behavior::Succeed(financial_payload(40.0))),
    )
}

fn analysis(units: &[&Arc<StubUnit>]) -> Vec<Arc<dyn AnalysisUnit>> {
    units.iter().map(|u| Arc::clone(*u) as Arc<dyn AnalysisUnit>).collect()
}

#[tokio::test]
async fn test_full_run_produces_medium_assessment() {
    let (discovery, security, market) = healthy_units();
    let orchestrator = orchestrator_with(
        discovery.clone(),
        analysis(&[&security, &market]),
        two_category_weights(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let assessment = outcome.assessment().expect("assessment");

    assert_eq!(assessment.final_score, 48.0);
    assert_eq!(assessment.risk_tier, RiskTier::Medium);
    assert_eq!(assessment.subject_name, SUBJECT);
    assert!(assessment.run_id.starts_with("assessment_aave_v3_"));
    assert_eq!((discovery.calls(), security.calls(), market.calls()), (1, 1, 1));

    let ctx = orchestrator.store().get(&assessment.run_id).await.unwrap();
    assert_eq!(ctx.prior_results.len(), 4);
    assert!(ctx.result(UnitId::RISK_SYNTHESIZER).unwrap().succeeded);
}

#[tokio::test]
async fn test_failed_discovery_still_scores_from_analysts() {
    let discovery = discovery_unit(Behavior::Fail(UnitError::Upstream {
        source_name: "defillama".to_string(),
        message: "connection refused".to_string(),
    }));
    let security = security_unit(Behavior::Succeed(security_payload(60.0)));
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery.clone(),
        analysis(&[&security, &market]),
        two_category_weights(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let assessment = outcome.assessment().expect("assessment");

    assert_eq!(assessment.final_score, 48.0);
    assert_eq!(assessment.risk_tier, RiskTier::Medium);
    // upstream errors are retried once under the test policy
    assert_eq!(discovery.calls(), 2);

    let ctx = orchestrator.store().get(&assessment.run_id).await.unwrap();
    let hunter = ctx.result(UnitId::DATA_HUNTER).unwrap();
    assert!(!hunter.succeeded);
    assert_eq!(hunter.attempts, 2);
    assert_eq!(
        hunter.errors,
        vec!["Upstream source failed: defillama - connection refused".to_string()]
    );
    assert!(ctx.result(UnitId::RISK_SYNTHESIZER).unwrap().succeeded);
}

#[tokio::test]
async fn test_panicking_analysis_unit_is_recorded_as_failure() {
    let discovery = discovery_unit(Behavior::Succeed(discovery_payload(80.0)));
    let security = security_unit(Behavior::Succeed(security_payload(60.0)));
    let market = market_unit(Behavior::Panic);
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let assessment = outcome.assessment().expect("assessment");
    assert!(assessment.component(RiskCategory::Financial).unwrap().is_default());
    assert_eq!(market.calls(), 1);

    let ctx = orchestrator.store().get(&assessment.run_id).await.unwrap();
    let market_result = ctx.result(UnitId::MARKET_INTELLIGENCE).unwrap();
    assert!(!market_result.succeeded);
    assert!(market_result.errors[0].starts_with("panic: index out of bounds"));
}

#[tokio::test]
async fn test_panicking_discovery_unit_does_not_abort_the_run() {
    let discovery = discovery_unit(Behavior::Panic);
    let security = security_unit(Behavior::Succeed(security_payload(60.0)));
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        two_category_weights(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let assessment = outcome.assessment().expect("assessment");
    assert_eq!(assessment.final_score, 48.0);

    let ctx = orchestrator.store().get(&assessment.run_id).await.unwrap();
    assert!(ctx.result(UnitId::DATA_HUNTER).unwrap().errors[0].starts_with("panic: "));
}

#[tokio::test]
async fn test_analysis_units_are_launched_together() {
    const IDS: [&str; 6] = ["analyst_1", "analyst_2", "analyst_3", "analyst_4", "analyst_5", "analyst_6"];
    let barrier = Arc::new(tokio::sync::Barrier::new(IDS.len()));
    let units: Vec<Arc<StubUnit>> = IDS
        .iter()
        .map(|&id| {
            StubUnit::new(
                id,
                UnitKind::Analysis,
                Behavior::Rendezvous(Arc::clone(&barrier), security_payload(60.0)),
            )
        })
        .collect();
    let orchestrator = orchestrator_with(
        discovery_unit(Behavior::Succeed(discovery_payload(80.0))),
        units.iter().map(|u| Arc::clone(u) as Arc<dyn AnalysisUnit>).collect(),
        WeightSet::default(),
        Duration::from_secs(2),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let assessment = outcome.assessment().expect("assessment");

    // every unit has to be in flight at once to pass the barrier before the timeout
    let ctx = orchestrator.store().get(&assessment.run_id).await.unwrap();
    for id in IDS {
        assert!(ctx.result(id).unwrap().succeeded, "{} did not pass the barrier", id);
    }
}

#[tokio::test]
async fn test_subject_aliases_resolve_to_canonical_name() {
    let (discovery, security, market) = healthy_units();
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        two_category_weights(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess("aave-v3").await;
    assert_eq!(outcome.assessment().unwrap().subject_name, SUBJECT);
}

#[tokio::test]
async fn test_single_success_ends_before_synthesis() {
    let discovery = discovery_unit(missing("sources"));
    let security = security_unit(Behavior::Succeed(security_payload(70.0)));
    let market = market_unit(missing("tvl_metrics"));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let report = match outcome {
        AssessmentOutcome::InsufficientData(report) => report,
        other => panic!("expected insufficient data, got {}", other.label()),
    };

    assert!(report.minimum_requirements_met);
    assert_eq!(report.available_units, vec![UnitId::from(UnitId::PROTOCOL_ANALYST)]);

    // failed units are recorded too, synthesis never ran
    let ctx = orchestrator.store().get(&report.run_id).await.unwrap();
    assert_eq!(ctx.prior_results.len(), 3);
    assert!(ctx.result(UnitId::RISK_SYNTHESIZER).is_none());
    assert_eq!(ctx.result(UnitId::DATA_HUNTER).unwrap().errors, vec!["Missing required data: sources".to_string()]);
}

#[tokio::test]
async fn test_two_successes_are_enough() {
    let discovery = discovery_unit(Behavior::Succeed(discovery_payload(80.0)));
    let security = security_unit(Behavior::Succeed(security_payload(70.0)));
    let market = market_unit(missing("tvl_metrics"));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let assessment = outcome.assessment().expect("assessment");
    assert!(assessment.component(RiskCategory::Financial).unwrap().is_default());
}

#[tokio::test]
async fn test_hanging_unit_times_out_without_blocking_the_run() {
    let discovery = discovery_unit(Behavior::Succeed(discovery_payload(80.0)));
    let security = security_unit(Behavior::Hang);
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_millis(200),
    );

    let started = Instant::now();
    let outcome = orchestrator.assess(SUBJECT).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let assessment = outcome.assessment().expect("assessment");
    assert!(assessment.component(RiskCategory::Security).unwrap().is_default());

    let ctx = orchestrator.store().get(&assessment.run_id).await.unwrap();
    let timed_out = ctx.result(UnitId::PROTOCOL_ANALYST).unwrap();
    assert!(!timed_out.succeeded);
    assert_eq!(timed_out.errors, vec![TIMEOUT_ERROR.to_string()]);
    assert_eq!(timed_out.attempts, 1);
}

#[tokio::test]
async fn test_cancellation_after_discovery() {
    let token = CancellationToken::new();
    let discovery = discovery_unit(Behavior::CancelRun(token.clone(), discovery_payload(80.0)));
    let security = security_unit(Behavior::Succeed(security_payload(60.0)));
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess_with_cancel(SUBJECT, token).await;
    let cancelled = match outcome {
        AssessmentOutcome::Cancelled(cancelled) => cancelled,
        other => panic!("expected cancellation, got {}", other.label()),
    };

    assert_eq!(cancelled.phase, Phase::Discovery);
    assert_eq!(cancelled.completed_units, vec![UnitId::from(UnitId::DATA_HUNTER)]);
    assert_eq!((security.calls(), market.calls()), (0, 0));
}

#[tokio::test]
async fn test_cancellation_interrupts_running_analysis() {
    let token = CancellationToken::new();
    let discovery = discovery_unit(Behavior::Succeed(discovery_payload(80.0)));
    let security = security_unit(Behavior::Hang);
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(60),
    );

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        })
    };

    let started = Instant::now();
    let outcome = orchestrator.assess_with_cancel(SUBJECT, token).await;
    canceller.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    let cancelled = match outcome {
        AssessmentOutcome::Cancelled(cancelled) => cancelled,
        other => panic!("expected cancellation, got {}", other.label()),
    };
    assert_eq!(cancelled.phase, Phase::Analysis);
    assert!(cancelled.completed_units.contains(&UnitId::from(UnitId::DATA_HUNTER)));
    assert!(cancelled.completed_units.contains(&UnitId::from(UnitId::MARKET_INTELLIGENCE)));
    assert!(!cancelled.completed_units.contains(&UnitId::from(UnitId::PROTOCOL_ANALYST)));
}

#[tokio::test]
async fn test_cached_assessment_skips_units() {
    let (discovery, security, market) = healthy_units();
    let orchestrator = orchestrator_with(
        discovery.clone(),
        analysis(&[&security, &market]),
        two_category_weights(),
        Duration::from_secs(5),
    )
    .with_cache(AssessmentCache::new(CacheConfig::risk_assessments(), None));

    let first = orchestrator.assess(SUBJECT).await;
    let second = orchestrator.assess("aave v3").await;

    assert_eq!(first, second);
    assert_eq!(discovery.calls(), 1);

    let stats = orchestrator.get_statistics().await;
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.assessments, 2);

    orchestrator.cleanup().await;
    assert_eq!(orchestrator.store().len().await, 0);
    orchestrator.assess(SUBJECT).await;
    assert_eq!(discovery.calls(), 2);
}

#[tokio::test]
async fn test_unsupported_subject_returns_error_stand_in() {
    let (discovery, security, market) = healthy_units();
    let orchestrator = orchestrator_with(
        discovery.clone(),
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess("Aavee Protocol").await;
    let error = match outcome {
        AssessmentOutcome::Error(error) => error,
        other => panic!("expected error, got {}", other.label()),
    };

    assert_eq!(error.error_kind, ErrorKind::UnsupportedSubject);
    assert_eq!(error.risk_tier, RiskTier::Critical);
    assert_eq!(error.final_score, 100.0);
    assert_eq!(error.confidence, 0.0);
    assert!(error.components.iter().all(|c| c.score == 100.0));
    assert!(error.suggestions.contains(&"Aave V3".to_string()));
    assert!(error.suggestions.len() <= 3);
    assert_eq!(discovery.calls(), 0);
    assert_eq!(orchestrator.get_statistics().await.errors, 1);
}

#[tokio::test]
async fn test_malformed_unit_output_becomes_workflow_failure() {
    let discovery = discovery_unit(Behavior::Succeed(discovery_payload(80.0)));
    let security = security_unit(Behavior::Succeed(discovery_payload(80.0)));
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let outcome = orchestrator.assess(SUBJECT).await;
    let error = match outcome {
        AssessmentOutcome::Error(error) => error,
        other => panic!("expected error, got {}", other.label()),
    };

    assert_eq!(error.error_kind, ErrorKind::WorkflowFailure);
    assert!(error.run_id.is_some());
    assert!(error.error.contains("Synthesis compilation failed"));
    assert_eq!(error.summary, "Risk assessment for Aave V3 failed: workflow_failure");
}

#[tokio::test]
async fn test_unit_status_degrades_with_failures() {
    let discovery = discovery_unit(Behavior::Succeed(discovery_payload(80.0)));
    let security = security_unit(missing("github"));
    let market = market_unit(Behavior::Succeed(financial_payload(40.0)));
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        WeightSet::default(),
        Duration::from_secs(5),
    );

    let before = orchestrator.get_unit_status().await;
    assert_eq!(before.overall_health, HealthState::Healthy);
    assert_eq!(before.units.len(), 4);

    orchestrator.assess(SUBJECT).await;

    let after = orchestrator.get_unit_status().await;
    assert_eq!(after.overall_health, HealthState::Degraded);
    let analyst = after
        .units
        .iter()
        .find(|u| u.stats.unit_id.as_str() == UnitId::PROTOCOL_ANALYST)
        .unwrap();
    assert_eq!(analyst.stats.total_runs, 1);
    assert_eq!(analyst.stats.success_rate, Some(0.0));

    orchestrator.cleanup().await;
    let cleared = orchestrator.get_unit_status().await;
    assert_eq!(cleared.overall_health, HealthState::Healthy);
    assert!(cleared.units.iter().all(|u| u.stats.total_runs == 0));
}

#[tokio::test]
async fn test_metrics_count_runs_and_units() {
    let (discovery, security, market) = healthy_units();
    let orchestrator = orchestrator_with(
        discovery,
        analysis(&[&security, &market]),
        two_category_weights(),
        Duration::from_secs(5),
    );

    orchestrator.assess(SUBJECT).await;

    let exported = orchestrator.metrics().export().unwrap();
    assert!(exported.contains("risk_orchestrator_runs_total{outcome=\"assessment\"} 1"));
    assert!(exported.contains("risk_orchestrator_unit_results_total"));
    assert!(exported.contains("unit=\"protocol_analyst\""));
}
