//! End-to-end resolution scenarios and consensus properties

use conclave_core::{
    AgentRecommendation, ConflictResolutionEngine, ConflictSeverity, ConflictThreshold,
    ConflictType, ConsensusLevel, MediationApproach, RecommendedAction,
};
use proptest::prelude::*;

fn resolve(recs: &[AgentRecommendation]) -> conclave_core::ResolutionReport {
    ConflictResolutionEngine::new()
        .resolve(recs, ConflictThreshold::Standard)
        .expect("valid recommendations")
}

#[test]
fn test_three_agreeing_experts_proceed() {
    let report = resolve(&[
        AgentRecommendation::new("architecture", "Recommend implementing X", 0.9),
        AgentRecommendation::new("performance", "Should implement X", 0.85),
        AgentRecommendation::new("testing", "Recommend X", 0.8),
    ]);

    assert!(report.consensus.score > 70.0);
    assert_eq!(report.consensus.level, ConsensusLevel::High);
    assert_eq!(report.consensus.agent_count, 3);
    assert!(report.conflicts.is_empty());
    assert_eq!(
        report.mediation_strategy.approach,
        MediationApproach::NoMediationNeeded
    );
    assert!(!report.escalation_needed);
    assert!(report.synthesized_recommendation.is_some());
    assert!(matches!(report.recommended_action, RecommendedAction::Proceed { .. }));
}

#[test]
fn test_two_contradicting_experts() {
    let report = resolve(&[
        AgentRecommendation::new("architecture", "Should implement", 0.9),
        AgentRecommendation::new("security", "Should not implement", 0.85),
    ]);

    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.conflict_type, ConflictType::DirectContradiction);
    assert_eq!(conflict.severity, ConflictSeverity::Medium);

    assert_eq!(report.escalation_needed, report.consensus.score < 50.0);
    assert!(report.consensus.score <= 40.0);
    assert_eq!(report.consensus.level, ConsensusLevel::Low);
    assert_eq!(
        report.mediation_strategy.approach,
        MediationApproach::HumanDecisionRequired
    );
    assert!(report.synthesized_recommendation.is_none());
    assert!(report.recommended_action.is_escalation());
}

#[test]
fn test_all_agreeing_many_agents() {
    let recs: Vec<_> = (0..5)
        .map(|i| AgentRecommendation::new(format!("expert-{i}"), "Must add rate limiting", 0.7))
        .collect();
    let report = resolve(&recs);
    assert_eq!(report.consensus.score, 100.0);
    assert_eq!(report.consensus.level, ConsensusLevel::High);
}

#[test]
fn test_contradicting_set_is_low() {
    let report = resolve(&[
        AgentRecommendation::new("a", "Should enable feature flags", 0.8),
        AgentRecommendation::new("b", "Should not enable feature flags", 0.8),
        AgentRecommendation::new("c", "Must not enable feature flags", 0.8),
    ]);
    assert!(report.consensus.score < 50.0);
    assert_eq!(report.consensus.level, ConsensusLevel::Low);
    assert_eq!(report.conflicts.len(), 2);
    assert!(report.escalation_needed);
}

#[test]
fn test_two_high_conflicts_escalate_despite_consensus() {
    // four agree, one dissents with very high confidence against two of them
    let report = resolve(&[
        AgentRecommendation::new("a", "Should vendor the SDK", 0.95),
        AgentRecommendation::new("b", "Should vendor the SDK", 0.95),
        AgentRecommendation::new("c", "Should vendor the SDK", 0.5),
        AgentRecommendation::new("d", "Should vendor the SDK", 0.5),
        AgentRecommendation::new("e", "Should not vendor the SDK", 0.95),
    ]);

    assert_eq!(report.consensus.score, 60.0);
    assert_eq!(report.count_by_severity(ConflictSeverity::High), 2);
    assert!(report.escalation_needed);
    assert!(report.synthesized_recommendation.is_none());
}

proptest! {
    #[test]
    fn prop_single_recommendation_scores_100(text in "[a-zA-Z ]{0,40}", confidence in 0.0f64..=1.0) {
        let report = ConflictResolutionEngine::new()
            .resolve(&[AgentRecommendation::new("solo", text, confidence)], ConflictThreshold::Standard)
            .unwrap();
        prop_assert_eq!(report.consensus.score, 100.0);
        prop_assert!(report.conflicts.is_empty());
    }

    #[test]
    fn prop_synthesis_iff_not_escalated(
        stances in proptest::collection::vec((any::<bool>(), 0.0f64..=1.0), 1..6),
        critical in any::<bool>(),
    ) {
        let recs: Vec<_> = stances
            .iter()
            .enumerate()
            .map(|(i, (affirm, confidence))| {
                let text = if *affirm { "Should deploy canary" } else { "Should not deploy canary" };
                AgentRecommendation::new(format!("e{i}"), text, *confidence)
            })
            .collect();
        let threshold = if critical { ConflictThreshold::Critical } else { ConflictThreshold::Standard };
        let report = ConflictResolutionEngine::new().resolve(&recs, threshold).unwrap();

        prop_assert_eq!(report.synthesized_recommendation.is_some(), !report.escalation_needed);
        prop_assert!((0.0..=100.0).contains(&report.consensus.score));

        let expected = report.conflicts.iter().any(|c| c.severity == ConflictSeverity::Critical)
            || report.consensus.score < 50.0
            || report.count_by_severity(ConflictSeverity::High) > 1;
        prop_assert_eq!(report.escalation_needed, expected);
    }
}
