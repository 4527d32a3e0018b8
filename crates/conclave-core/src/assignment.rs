//! Expert assignment decision tables and the Assignment record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::expert::ExpertId;

/// How primary and secondary experts are orchestrated for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinationPattern {
    Direct,
    PrimarySecondary,
    SequentialHandoff,
}

impl CoordinationPattern {
    pub fn for_secondary_count(count: usize) -> Self {
        match count {
            0 => CoordinationPattern::Direct,
            1 => CoordinationPattern::PrimarySecondary,
            _ => CoordinationPattern::SequentialHandoff,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoordinationPattern::Direct => "direct",
            CoordinationPattern::PrimarySecondary => "primary-secondary",
            CoordinationPattern::SequentialHandoff => "sequential-handoff",
        }
    }
}

/// How much validation an assignment gets, chosen from the caller's confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStrategy {
    HighConfidence,
    Standard,
    EnhancedValidation,
    /// Degraded: no session to the primary expert could be obtained
    Fallback,
}

impl AllocationStrategy {
    pub fn for_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            AllocationStrategy::HighConfidence
        } else if confidence >= 0.6 {
            AllocationStrategy::Standard
        } else {
            AllocationStrategy::EnhancedValidation
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllocationStrategy::HighConfidence => "high-confidence",
            AllocationStrategy::Standard => "standard",
            AllocationStrategy::EnhancedValidation => "enhanced-validation",
            AllocationStrategy::Fallback => "fallback",
        }
    }
}

/// Result of planning one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub task_id: String,
    pub coordination_pattern: CoordinationPattern,
    pub allocation_strategy: AllocationStrategy,
    pub primary_expert: ExpertId,
    pub secondary_experts: Vec<ExpertId>,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(
        task_id: impl Into<String>,
        primary_expert: ExpertId,
        secondary_experts: Vec<ExpertId>,
        confidence: f64,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("assignment-{}", Uuid::new_v4()),
            task_id: task_id.into(),
            coordination_pattern: CoordinationPattern::for_secondary_count(secondary_experts.len()),
            allocation_strategy: AllocationStrategy::for_confidence(confidence),
            primary_expert,
            secondary_experts,
            session_id: session_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Mark the assignment as degraded
    pub fn into_fallback(mut self) -> Self {
        self.allocation_strategy = AllocationStrategy::Fallback;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.allocation_strategy == AllocationStrategy::Fallback
    }
}
