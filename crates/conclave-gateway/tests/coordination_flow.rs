//! End-to-end coordination through the Gateway

use async_trait::async_trait;
use conclave_core::{
    AgentRecommendation, AllocationStrategy, CoordinationPattern, Expert, ExpertId,
};
use conclave_gateway::{
    AssignExpertsRequest, CircuitState, ErrorCategory, ExpertConnector, Gateway, GatewayConfig,
    GatewayError, HandoffStatus, HandoffUrgency, InitiateHandoffRequest, LoopbackConnector,
    ResolveConflictsRequest,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Connector whose health can be flipped at runtime
#[derive(Default)]
struct FlakyConnector {
    down: AtomicBool,
    opens: AtomicUsize,
    delay: Option<Duration>,
}

impl FlakyConnector {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExpertConnector for FlakyConnector {
    async fn open(&self, expert: &Expert) -> conclave_gateway::Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Expert(format!("{} refused the session", expert.id)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

fn config() -> GatewayConfig {
    GatewayConfig::new()
        .with_expert(Expert::new("security", "local://security").with_specialty("auth"))
        .with_expert(Expert::new("architecture", "local://architecture"))
        .with_expert(Expert::new("testing", "local://testing"))
}

fn loopback_gateway(config: GatewayConfig) -> Gateway {
    Gateway::with_connector(config, Arc::new(LoopbackConnector)).unwrap()
}

#[tokio::test]
async fn test_assignment_patterns_and_strategies() {
    let gateway = loopback_gateway(config());

    let direct = assert_ok!(
        gateway
            .assign_experts(&AssignExpertsRequest::new("t1", "security").with_confidence(0.5))
            .await
    );
    assert_eq!(
        direct.coordination_pattern,
        CoordinationPattern::Direct
    );
    assert_eq!(
        direct.expert_allocation.allocation_strategy,
        AllocationStrategy::EnhancedValidation
    );

    let sequential = assert_ok!(
        gateway
            .assign_experts(
                &AssignExpertsRequest::new("t2", "architecture")
                    .with_secondary("security")
                    .with_secondary("testing")
                    .with_confidence(0.8),
            )
            .await
    );
    assert_eq!(
        sequential.coordination_pattern,
        CoordinationPattern::SequentialHandoff
    );
    assert_eq!(
        sequential.expert_allocation.secondary_experts,
        vec![ExpertId::from("security"), ExpertId::from("testing")]
    );
    assert!(!sequential.tracking_metadata.degraded);
}

#[tokio::test]
async fn test_handoff_lifecycle() {
    let gateway = loopback_gateway(config());
    let request = InitiateHandoffRequest::new("task-42", "security")
        .with_source("planner")
        .with_scope("auth-module")
        .with_subtask("Review token refresh")
        .with_payload(serde_json::json!({"files": ["auth.rs"]}))
        .with_urgency(HandoffUrgency::High);

    let initiated = assert_ok!(gateway.initiate_handoff(&request).await);
    assert!(initiated.handoff_id.starts_with("handoff-"));
    assert_eq!(initiated.status, HandoffStatus::Active);

    let status = assert_ok!(gateway.handoff_status(&initiated.handoff_id).await);
    assert_eq!(status.progress, 0.5);
    assert!(status.estimated_completion.is_some());

    let record = assert_ok!(gateway.handoff_record(&initiated.handoff_id));
    assert_eq!(record.context_scope, "auth-module");
    assert_eq!(record.subtask_description, "Review token refresh");
    assert_eq!(record.context_payload["files"][0], "auth.rs");
    assert_eq!(record.connection_id, initiated.connection_id);

    let ack = assert_ok!(
        gateway
            .complete_handoff(&initiated.handoff_id, serde_json::json!({"findings": 3}))
            .await
    );
    assert_eq!(ack.status, HandoffStatus::Completed);

    let status = assert_ok!(gateway.handoff_status(&initiated.handoff_id).await);
    assert_eq!(status.progress, 1.0);
    assert_eq!(status.estimated_completion, None);

    // terminal states are final
    let err = assert_err!(gateway.fail_handoff(&initiated.handoff_id, "late").await);
    assert!(matches!(err, GatewayError::InvalidTransition { .. }));
    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[tokio::test]
async fn test_handoff_validation_and_unknown_ids() {
    let gateway = loopback_gateway(config());

    let err = assert_err!(
        gateway
            .initiate_handoff(&InitiateHandoffRequest::new("", "security"))
            .await
    );
    assert!(matches!(err, GatewayError::MissingField("taskId")));

    let err = assert_err!(gateway.handoff_status("handoff-1-nothere0").await);
    assert!(matches!(err, GatewayError::HandoffNotFound(_)));
}

#[tokio::test]
async fn test_unknown_target_degrades_to_fallback_handoff() {
    let gateway = loopback_gateway(config());
    let initiated = assert_ok!(
        gateway
            .initiate_handoff(&InitiateHandoffRequest::new("task-7", "ghost"))
            .await
    );

    assert_eq!(initiated.status, HandoffStatus::InitiatedFallback);
    assert!(initiated.connection_id.starts_with("fallback-conn-"));

    let status = assert_ok!(gateway.handoff_status(&initiated.handoff_id).await);
    assert_eq!(status.progress, 0.1);

    let ack = assert_ok!(gateway.fail_handoff(&initiated.handoff_id, "no expert").await);
    assert_eq!(ack.status, HandoffStatus::Failed);
    assert_eq!(
        assert_ok!(gateway.handoff_status(&initiated.handoff_id).await).progress,
        0.0
    );
}

#[tokio::test]
async fn test_degraded_assignment_is_tagged_and_not_cached() {
    let connector = Arc::new(FlakyConnector::default());
    connector.down.store(true, Ordering::SeqCst);
    let gateway = Gateway::with_connector(config(), connector.clone()).unwrap();

    let request = AssignExpertsRequest::new("t1", "security").with_confidence(0.9);
    let first = assert_ok!(gateway.assign_experts(&request).await);
    assert_eq!(
        first.expert_allocation.allocation_strategy,
        AllocationStrategy::Fallback
    );
    assert!(first
        .task_persistence
        .session_id
        .starts_with("fallback-session-"));
    assert!(first.tracking_metadata.degraded);
    assert_eq!(
        first.tracking_metadata.degradation,
        Some(ErrorCategory::Uncategorized)
    );

    let second = assert_ok!(gateway.assign_experts(&request).await);
    assert!(!second.task_persistence.cached);
    assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_breaker_opens_fails_fast_and_recovers() {
    let connector = Arc::new(FlakyConnector::default());
    connector.down.store(true, Ordering::SeqCst);
    let config = config().with_breaker(2, Duration::from_millis(100));
    let gateway = Gateway::with_connector(config, connector.clone()).unwrap();

    let request = |n: u32| {
        AssignExpertsRequest::new(format!("t{n}"), "testing").with_description(format!("job {n}"))
    };

    for n in 0..2 {
        let response = assert_ok!(gateway.assign_experts(&request(n)).await);
        assert!(response.tracking_metadata.degraded);
    }
    assert_eq!(connector.opens.load(Ordering::SeqCst), 2);

    // open: no network, immediate circuit-open fallback
    let response = assert_ok!(gateway.assign_experts(&request(2)).await);
    assert_eq!(
        response.tracking_metadata.degradation,
        Some(ErrorCategory::CircuitOpen)
    );
    assert_eq!(connector.opens.load(Ordering::SeqCst), 2);

    let report = gateway.performance_metrics().await;
    assert_eq!(report.circuit_breakers[0].state, CircuitState::Open);
    assert!(!report.overall_health.healthy);

    // cooldown elapses, expert is back: the single trial closes the breaker
    connector.down.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let response = assert_ok!(gateway.assign_experts(&request(3)).await);
    assert!(!response.tracking_metadata.degraded);

    let report = gateway.performance_metrics().await;
    assert_eq!(report.circuit_breakers[0].state, CircuitState::Closed);
    assert_eq!(report.circuit_breakers[0].consecutive_failures, 0);
}

#[tokio::test]
async fn test_pool_cap_bounds_concurrent_handoffs() {
    let connector = Arc::new(FlakyConnector::slow(Duration::from_millis(100)));
    let mut config = config().with_max_sessions_per_expert(2);
    config.pool.acquire_timeout_ms = 50;
    let gateway = Gateway::with_connector(config, connector.clone()).unwrap();

    let requests: Vec<_> = (0..3)
        .map(|i| InitiateHandoffRequest::new(format!("task-{i}"), "security"))
        .collect();
    let results =
        futures::future::join_all(requests.iter().map(|r| gateway.initiate_handoff(r))).await;

    let statuses: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    let active: Vec<_> = statuses
        .iter()
        .filter(|s| s.status == HandoffStatus::Active)
        .collect();
    assert_eq!(active.len(), 2);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| s.status == HandoffStatus::InitiatedFallback)
            .count(),
        1
    );
    assert_eq!(connector.opens.load(Ordering::SeqCst), 2);

    // sessions go back to the pool once the handoffs are persisted
    let report = gateway.performance_metrics().await;
    assert_eq!(report.connection_pool[0].active, 0);
    assert_eq!(report.connection_pool[0].idle, 2);

    let next = assert_ok!(
        gateway
            .initiate_handoff(&InitiateHandoffRequest::new("task-9", "security"))
            .await
    );
    assert_eq!(next.status, HandoffStatus::Active);
    assert!(active.iter().any(|s| s.connection_id == next.connection_id));
    assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_open_handoffs_do_not_starve_assignments() {
    let gateway = loopback_gateway(config().with_max_sessions_per_expert(1));

    for i in 0..3 {
        let handoff = assert_ok!(
            gateway
                .initiate_handoff(&InitiateHandoffRequest::new(format!("task-{i}"), "security"))
                .await
        );
        assert_eq!(handoff.status, HandoffStatus::Active);
    }

    let response = assert_ok!(
        gateway
            .assign_experts(&AssignExpertsRequest::new("t1", "security"))
            .await
    );
    assert!(!response.tracking_metadata.degraded);
}

#[tokio::test]
async fn test_unregistered_experts_do_not_grow_metrics() {
    let gateway = loopback_gateway(config());

    for i in 0..200 {
        let response = assert_ok!(
            gateway
                .assign_experts(&AssignExpertsRequest::new(format!("t{i}"), format!("bogus-{i}")))
                .await
        );
        assert_eq!(
            response.tracking_metadata.degradation,
            Some(ErrorCategory::Unavailable)
        );
    }
    assert_ok!(
        gateway
            .assign_experts(&AssignExpertsRequest::new("t-real", "security"))
            .await
    );

    let report = gateway.performance_metrics().await;
    assert_eq!(report.circuit_breakers.len(), 1);
    assert_eq!(report.error_handling.total_errors, 200);
    assert!(report.error_handling.by_expert.is_empty());
    assert_eq!(report.connection_pool.len(), 1);
}

#[tokio::test]
async fn test_shutdown_resolves_in_flight_calls_into_fallback() {
    let connector = Arc::new(FlakyConnector::slow(Duration::from_secs(5)));
    let gateway = Gateway::with_connector(config(), connector).unwrap();
    let request = AssignExpertsRequest::new("t1", "architecture");

    let (response, _) = tokio::join!(gateway.assign_experts(&request), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        gateway.shutdown();
    });

    let response = assert_ok!(response);
    assert!(response.tracking_metadata.degraded);
    assert_eq!(
        response.tracking_metadata.degradation,
        Some(ErrorCategory::Uncategorized)
    );
}

#[tokio::test]
async fn test_concurrent_conflict_resolution() {
    let gateway = loopback_gateway(config());
    let request = ResolveConflictsRequest {
        agent_results: vec![
            AgentRecommendation::new("architecture", "Recommend implementing X", 0.9),
            AgentRecommendation::new("performance", "Should implement X", 0.85),
            AgentRecommendation::new("testing", "Recommend X", 0.8),
        ],
        conflict_threshold: "standard".into(),
    };

    let responses =
        futures::future::join_all((0..8).map(|_| gateway.resolve_conflicts(&request))).await;
    for response in responses {
        let response = response.unwrap();
        assert!(!response.escalation_needed());
        assert!(response.consensus_analysis.consensus_score > 70.0);
        assert!(!response.conflict_analysis.resolution_required);
        assert!(response.synthesized_recommendation.is_some());
    }

    let report = gateway.performance_metrics().await;
    assert_eq!(report.performance["resolve_conflicts"].count, 8);
}
