//! Conflict detection between expert recommendations

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysis::Statement;
use crate::error::CoreError;
use crate::expert::ExpertId;
use crate::recommendation::AgentRecommendation;

/// Types of conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    /// One expert affirms what another negates
    DirectContradiction,
}

/// Conflict severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    /// Severity from the mean confidence of the two experts involved
    pub fn from_mean_confidence(mean: f64, threshold: ConflictThreshold) -> Self {
        if mean > 0.9 {
            match threshold {
                ConflictThreshold::Critical => ConflictSeverity::Critical,
                ConflictThreshold::Standard => ConflictSeverity::High,
            }
        } else if mean >= 0.7 {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }
}

/// Caller-selected severity mode. `Critical` promotes very confident
/// disagreements (mean confidence above 0.9) to critical severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictThreshold {
    #[default]
    Standard,
    Critical,
}

impl FromStr for ConflictThreshold {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "standard" | "low" | "medium" | "high" => Ok(ConflictThreshold::Standard),
            "critical" => Ok(ConflictThreshold::Critical),
            other => Err(CoreError::UnknownVariant {
                kind: "conflict threshold",
                value: other.to_string(),
            }),
        }
    }
}

/// A detected disagreement between two experts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: String,
    pub experts: (ExpertId, ExpertId),
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    pub statements: (String, String),
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.description)
    }
}

/// Find every pairwise direct contradiction.
///
/// `statements[i]` must be the analysis of `recommendations[i]`.
pub fn detect_conflicts(
    recommendations: &[AgentRecommendation],
    statements: &[Statement],
    threshold: ConflictThreshold,
) -> Vec<ConflictRecord> {
    debug_assert_eq!(recommendations.len(), statements.len());

    recommendations
        .iter()
        .zip(statements)
        .enumerate()
        .tuple_combinations()
        .filter(|((_, (_, sa)), (_, (_, sb)))| sa.contradicts(sb))
        .map(|((i, (a, _)), (j, (b, _)))| {
            let mean = (a.confidence + b.confidence) / 2.0;
            ConflictRecord {
                id: format!("conflict-{}-{}", i, j),
                experts: (a.expert.clone(), b.expert.clone()),
                conflict_type: ConflictType::DirectContradiction,
                severity: ConflictSeverity::from_mean_confidence(mean, threshold),
                description: format!(
                    "{} and {} give contradicting recommendations (mean confidence {:.2})",
                    a.expert, b.expert, mean
                ),
                statements: (a.recommendation.clone(), b.recommendation.clone()),
            }
        })
        .collect()
}
