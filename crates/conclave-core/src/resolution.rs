//! Conflict Resolution Engine
//!
//! Pure computation over a set of expert recommendations: consensus score,
//! conflict list, mediation strategy, escalation decision and, when no
//! escalation is needed, a synthesized recommendation to proceed with.
//!
//! The engine holds no state. Pairwise comparisons are independent, so a
//! single engine can be shared by any number of concurrent callers.

use serde::{Deserialize, Serialize};

use crate::analysis::{KeywordAnalyzer, Polarity, Statement, StatementAnalyzer};
use crate::conflict::{detect_conflicts, ConflictRecord, ConflictSeverity, ConflictThreshold};
use crate::consensus::ConsensusResult;
use crate::error::Result;
use crate::expert::ExpertId;
use crate::mediation::{MediationApproach, MediationStrategy};
use crate::recommendation::AgentRecommendation;

/// Consensus score below which a human must decide
pub const ESCALATION_SCORE: f64 = 50.0;

/// How quickly a human needs to look at an escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationUrgency {
    Immediate,
    Standard,
}

/// Position synthesized from the majority of experts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedRecommendation {
    pub recommendation: String,
    pub confidence: f64,
    pub supporting_experts: Vec<ExpertId>,
    pub dissenting_experts: Vec<ExpertId>,
    pub rationale: String,
}

/// What the downstream orchestrator should do next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RecommendedAction {
    #[serde(rename_all = "camelCase")]
    EscalateToHuman {
        urgency: EscalationUrgency,
        next_steps: Vec<String>,
    },
    /// `recommendation` is absent only when there was nothing to synthesize
    #[serde(rename_all = "camelCase")]
    Proceed {
        #[serde(skip_serializing_if = "Option::is_none")]
        recommendation: Option<SynthesizedRecommendation>,
        next_steps: Vec<String>,
    },
}

impl RecommendedAction {
    pub fn is_escalation(&self) -> bool {
        matches!(self, RecommendedAction::EscalateToHuman { .. })
    }

    pub fn next_steps(&self) -> &[String] {
        match self {
            RecommendedAction::EscalateToHuman { next_steps, .. }
            | RecommendedAction::Proceed { next_steps, .. } => next_steps,
        }
    }
}

/// Full outcome of one resolution call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub consensus: ConsensusResult,
    pub conflicts: Vec<ConflictRecord>,
    pub mediation_strategy: MediationStrategy,
    pub escalation_needed: bool,
    pub synthesized_recommendation: Option<SynthesizedRecommendation>,
    pub recommended_action: RecommendedAction,
}

impl ResolutionReport {
    pub fn count_by_severity(&self, severity: ConflictSeverity) -> usize {
        self.conflicts.iter().filter(|c| c.severity == severity).count()
    }
}

/// Escalate on any critical conflict, low consensus, or several high conflicts
pub fn escalation_required(consensus_score: f64, conflicts: &[ConflictRecord]) -> bool {
    let critical = conflicts
        .iter()
        .any(|c| c.severity == ConflictSeverity::Critical);
    let high = conflicts
        .iter()
        .filter(|c| c.severity == ConflictSeverity::High)
        .count();

    critical || consensus_score < ESCALATION_SCORE || high > 1
}

/// Conflict resolution engine, generic over the text analyzer
#[derive(Debug, Clone, Default)]
pub struct ConflictResolutionEngine<A = KeywordAnalyzer> {
    analyzer: A,
}

impl ConflictResolutionEngine<KeywordAnalyzer> {
    pub fn new() -> Self {
        Self {
            analyzer: KeywordAnalyzer,
        }
    }
}

impl<A: StatementAnalyzer> ConflictResolutionEngine<A> {
    pub fn with_analyzer(analyzer: A) -> Self {
        Self { analyzer }
    }

    /// Resolve a set of recommendations into a decision
    pub fn resolve(
        &self,
        recommendations: &[AgentRecommendation],
        threshold: ConflictThreshold,
    ) -> Result<ResolutionReport> {
        for rec in recommendations {
            rec.validate()?;
        }

        let statements: Vec<Statement> = recommendations
            .iter()
            .map(|r| self.analyzer.analyze(&r.recommendation))
            .collect();

        let consensus = ConsensusResult::measure(&statements);
        let conflicts = detect_conflicts(recommendations, &statements, threshold);
        let mediation_strategy = MediationStrategy::select(consensus.score, &conflicts);
        let escalation_needed = escalation_required(consensus.score, &conflicts);

        let synthesized_recommendation = if escalation_needed {
            None
        } else {
            synthesize(recommendations, &statements)
        };

        let recommended_action = if !escalation_needed {
            let mut next_steps = mediation_strategy.next_steps.clone();
            if synthesized_recommendation.is_some() {
                next_steps.push("Apply the synthesized recommendation".to_string());
            }
            RecommendedAction::Proceed {
                recommendation: synthesized_recommendation.clone(),
                next_steps,
            }
        } else {
            let urgency = if conflicts
                .iter()
                .any(|c| c.severity == ConflictSeverity::Critical)
            {
                EscalationUrgency::Immediate
            } else {
                EscalationUrgency::Standard
            };
            RecommendedAction::EscalateToHuman {
                urgency,
                next_steps: MediationStrategy::from_approach(
                    MediationApproach::HumanDecisionRequired,
                )
                .next_steps,
            }
        };

        Ok(ResolutionReport {
            consensus,
            conflicts,
            mediation_strategy,
            escalation_needed,
            synthesized_recommendation,
            recommended_action,
        })
    }
}

/// Pick the largest stance cluster (ties go to the higher summed confidence)
/// and speak with the voice of its most confident member.
fn synthesize(
    recommendations: &[AgentRecommendation],
    statements: &[Statement],
) -> Option<SynthesizedRecommendation> {
    let mut clusters: Vec<(Option<Polarity>, Vec<usize>)> = Vec::new();
    for (i, statement) in statements.iter().enumerate() {
        match clusters.iter_mut().find(|(p, _)| *p == statement.polarity) {
            Some((_, members)) => members.push(i),
            None => clusters.push((statement.polarity, vec![i])),
        }
    }

    let weight = |members: &[usize]| -> f64 {
        members.iter().map(|&i| recommendations[i].confidence).sum()
    };

    let (_, majority) = clusters.into_iter().max_by(|(_, a), (_, b)| {
        a.len()
            .cmp(&b.len())
            .then(weight(a).total_cmp(&weight(b)))
    })?;

    let lead = majority
        .iter()
        .copied()
        .max_by(|&a, &b| {
            recommendations[a]
                .confidence
                .total_cmp(&recommendations[b].confidence)
        })?;

    let confidence = weight(&majority) / majority.len() as f64;
    let supporting_experts = majority
        .iter()
        .map(|&i| recommendations[i].expert.clone())
        .collect();
    let dissenting_experts = (0..recommendations.len())
        .filter(|i| !majority.contains(i))
        .map(|i| recommendations[i].expert.clone())
        .collect();

    let rationales: Vec<&str> = majority
        .iter()
        .map(|&i| recommendations[i].rationale.trim())
        .filter(|r| !r.is_empty())
        .collect();
    let rationale = if rationales.is_empty() {
        format!(
            "{} of {} experts support this position",
            majority.len(),
            recommendations.len()
        )
    } else {
        rationales.join("; ")
    };

    Some(SynthesizedRecommendation {
        recommendation: recommendations[lead].recommendation.clone(),
        confidence,
        supporting_experts,
        dissenting_experts,
        rationale,
    })
}
