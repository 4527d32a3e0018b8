//! Mediation strategy selection

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictRecord;

/// Recommended resolution path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediationApproach {
    NoMediationNeeded,
    MajorityRule,
    AdditionalExpertConsultation,
    HumanDecisionRequired,
}

impl MediationApproach {
    /// Band table on the consensus score, used when at least one conflict exists
    pub fn for_score(score: f64) -> Self {
        if score > 70.0 {
            MediationApproach::MajorityRule
        } else if score > 40.0 {
            MediationApproach::AdditionalExpertConsultation
        } else {
            MediationApproach::HumanDecisionRequired
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediationStrategy {
    pub approach: MediationApproach,
    pub reasoning: String,
    pub next_steps: Vec<String>,
}

impl MediationStrategy {
    /// Derive the strategy from the consensus score and detected conflicts
    pub fn select(consensus_score: f64, conflicts: &[ConflictRecord]) -> Self {
        if conflicts.is_empty() {
            return Self::from_approach(MediationApproach::NoMediationNeeded);
        }
        Self::from_approach(MediationApproach::for_score(consensus_score))
    }

    pub fn from_approach(approach: MediationApproach) -> Self {
        let (reasoning, steps) = match approach {
            MediationApproach::NoMediationNeeded => (
                "No conflicting recommendations were detected",
                vec![],
            ),
            MediationApproach::MajorityRule => (
                "A clear majority of experts agree; the minority position is recorded",
                vec![
                    "Identify the majority position",
                    "Document the minority position and its rationale",
                    "Proceed with the majority recommendation",
                ],
            ),
            MediationApproach::AdditionalExpertConsultation => (
                "Experts are split; a tie-breaking domain expert is needed",
                vec![
                    "Identify a tie-breaking domain expert",
                    "Dispatch the conflicting positions to that expert",
                    "Re-run consensus analysis with the additional recommendation",
                ],
            ),
            MediationApproach::HumanDecisionRequired => (
                "Expert consensus is too low to resolve automatically",
                vec![
                    "Present all expert positions to a human reviewer",
                    "Highlight the points of disagreement",
                    "Request a decision and record it with the task",
                ],
            ),
        };

        Self {
            approach,
            reasoning: reasoning.to_string(),
            next_steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }
}
