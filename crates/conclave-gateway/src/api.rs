//! Wire shapes of the gateway operations

use chrono::{DateTime, Utc};
use conclave_core::{
    AgentRecommendation, AllocationStrategy, ConflictRecord, ConflictSeverity, ConsensusLevel,
    ConsensusResult, CoordinationPattern, ExpertId, MediationStrategy, RecommendedAction,
    ResolutionReport, SynthesizedRecommendation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::handoff::HandoffStatus;
use crate::planner::PlannedAssignment;
use crate::ErrorCategory;

pub use crate::handoff::HandoffRequest as InitiateHandoffRequest;
pub use crate::planner::AssignmentRequest as AssignExpertsRequest;

/// Where the assignment's session lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPersistence {
    pub session_id: String,
    /// Always true; later sessions can pick the task up by id
    pub cross_session_access: bool,
    pub task_id: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertAllocation {
    pub primary_expert: ExpertId,
    pub secondary_experts: Vec<ExpertId>,
    pub allocation_strategy: AllocationStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingMetadata {
    pub assignment_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<ErrorCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignExpertsResponse {
    pub coordination_pattern: CoordinationPattern,
    pub task_persistence: TaskPersistence,
    pub expert_allocation: ExpertAllocation,
    pub tracking_metadata: TrackingMetadata,
}

impl From<PlannedAssignment> for AssignExpertsResponse {
    fn from(planned: PlannedAssignment) -> Self {
        let a = planned.assignment;
        Self {
            coordination_pattern: a.coordination_pattern,
            task_persistence: TaskPersistence {
                session_id: a.session_id,
                cross_session_access: true,
                task_id: a.task_id,
                cached: planned.from_cache,
            },
            tracking_metadata: TrackingMetadata {
                assignment_id: a.id,
                timestamp: a.created_at,
                version: crate::VERSION.to_string(),
                degraded: a.allocation_strategy == AllocationStrategy::Fallback,
                degradation: planned.degradation,
            },
            expert_allocation: ExpertAllocation {
                primary_expert: a.primary_expert,
                secondary_experts: a.secondary_experts,
                allocation_strategy: a.allocation_strategy,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateHandoffResponse {
    pub handoff_id: String,
    pub status: HandoffStatus,
    pub connection_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteHandoffRequest {
    #[serde(default)]
    pub results: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailHandoffRequest {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictsRequest {
    pub agent_results: Vec<AgentRecommendation>,

    /// `standard` (default) or `critical`
    #[serde(default)]
    pub conflict_threshold: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusAnalysis {
    pub consensus_score: f64,
    pub consensus_level: ConsensusLevel,
    pub agent_count: usize,
}

impl From<ConsensusResult> for ConsensusAnalysis {
    fn from(consensus: ConsensusResult) -> Self {
        Self {
            consensus_score: consensus.score,
            consensus_level: consensus.level,
            agent_count: consensus.agent_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictAnalysis {
    pub conflicts_detected: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub resolution_required: bool,
    pub escalation_needed: bool,
    pub by_severity: BTreeMap<ConflictSeverity, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictsResponse {
    pub consensus_analysis: ConsensusAnalysis,
    pub conflict_analysis: ConflictAnalysis,
    pub mediation_strategy: MediationStrategy,
    pub synthesized_recommendation: Option<SynthesizedRecommendation>,
    pub recommendations: RecommendedAction,
}

impl ResolveConflictsResponse {
    pub fn escalation_needed(&self) -> bool {
        self.conflict_analysis.escalation_needed
    }
}

impl From<ResolutionReport> for ResolveConflictsResponse {
    fn from(report: ResolutionReport) -> Self {
        let mut by_severity = BTreeMap::new();
        for conflict in &report.conflicts {
            *by_severity.entry(conflict.severity).or_insert(0) += 1;
        }
        Self {
            consensus_analysis: report.consensus.into(),
            conflict_analysis: ConflictAnalysis {
                conflicts_detected: report.conflicts.len(),
                resolution_required: !report.conflicts.is_empty(),
                escalation_needed: report.escalation_needed,
                by_severity,
                conflicts: report.conflicts,
            },
            mediation_strategy: report.mediation_strategy,
            synthesized_recommendation: report.synthesized_recommendation,
            recommendations: report.recommended_action,
        }
    }
}
