//! Assignment planner - picks the coordination pattern and allocation
//! strategy for a task and binds it to a session with the primary expert

use conclave_core::{AllocationStrategy, Assignment, ExpertId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::{cache_key, normalize, ResultCache};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::pool::ConnectionPool;
use crate::{ErrorCategory, GatewayError, Result};

fn default_confidence() -> f64 {
    0.7
}

/// Input to [`AssignmentPlanner::assign`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub task_id: String,

    #[serde(default, alias = "workflowDescription")]
    pub description: String,

    pub primary_expert: ExpertId,

    #[serde(default)]
    pub secondary_experts: Vec<ExpertId>,

    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl AssignmentRequest {
    pub fn new(task_id: impl Into<String>, primary_expert: impl Into<ExpertId>) -> Self {
        Self {
            task_id: task_id.into(),
            description: String::new(),
            primary_expert: primary_expert.into(),
            secondary_experts: Vec::new(),
            confidence: default_confidence(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_secondary(mut self, expert: impl Into<ExpertId>) -> Self {
        self.secondary_experts.push(expert.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_id.trim().is_empty() {
            return Err(GatewayError::MissingField("taskId"));
        }
        if self.primary_expert.is_blank() {
            return Err(GatewayError::MissingField("primaryExpert"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(GatewayError::Validation(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if self.secondary_experts.iter().any(ExpertId::is_blank) {
            return Err(GatewayError::Validation(
                "secondary expert ids must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Cache key from the plan's semantic identity
    pub fn cache_key(&self) -> String {
        let mut secondaries: Vec<&str> = self.secondary_experts.iter().map(|e| e.as_str()).collect();
        secondaries.sort_unstable();
        let secondaries = secondaries.join(",");
        let description = normalize(&self.description);
        let strategy = AllocationStrategy::for_confidence(self.confidence);

        cache_key(
            "assignment",
            &[
                &description,
                self.primary_expert.as_str(),
                &secondaries,
                strategy.as_str(),
            ],
        )
    }
}

/// A planned assignment and how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAssignment {
    pub assignment: Assignment,
    pub from_cache: bool,
    /// Why the plan is degraded, if it is
    pub degradation: Option<ErrorCategory>,
}

pub struct AssignmentPlanner {
    dispatcher: Arc<Dispatcher>,
    pool: Arc<ConnectionPool>,
    cache: Arc<ResultCache>,
    ttl: Duration,
}

impl AssignmentPlanner {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        pool: Arc<ConnectionPool>,
        cache: Arc<ResultCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            cache,
            ttl,
        }
    }

    pub async fn assign(&self, request: &AssignmentRequest) -> Result<PlannedAssignment> {
        request.validate()?;

        let key = request.cache_key();
        match self.cache.get_json::<Assignment>(&key) {
            Ok(Some(mut assignment)) => {
                tracing::debug!("Assignment cache hit for task {}", request.task_id);
                assignment.task_id = request.task_id.clone();
                return Ok(PlannedAssignment {
                    assignment,
                    from_cache: true,
                    degradation: None,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable cached assignment {}: {}", key, e),
        }

        let pool = &self.pool;
        let primary = &request.primary_expert;
        let tag = request.task_id.as_str();
        let outcome = self
            .dispatcher
            .run(
                "assign_experts",
                primary,
                move || async move {
                    let lease = pool.acquire(primary, tag).await?;
                    let session_id = lease.id().to_string();
                    pool.release(lease);
                    Ok(session_id)
                },
                |_| format!("fallback-session-{}", Uuid::new_v4()),
            )
            .await;

        let degradation = outcome.degradation();
        let build = |session_id: String| {
            Assignment::new(
                request.task_id.clone(),
                request.primary_expert.clone(),
                request.secondary_experts.clone(),
                request.confidence,
                session_id,
            )
        };

        let assignment = match outcome {
            DispatchOutcome::Complete(session_id) => {
                let assignment = build(session_id);
                if let Err(e) = self.cache.set_json(key, &assignment, self.ttl) {
                    tracing::warn!("Failed to cache assignment {}: {}", assignment.id, e);
                }
                assignment
            }
            DispatchOutcome::Degraded { value, .. } => build(value).into_fallback(),
            DispatchOutcome::Rejected(e) => return Err(e),
        };

        tracing::info!(
            "Assigned task {} to {} ({}, {})",
            assignment.task_id,
            assignment.primary_expert,
            assignment.coordination_pattern.as_str(),
            assignment.allocation_strategy.as_str()
        );

        Ok(PlannedAssignment {
            assignment,
            from_cache: false,
            degradation,
        })
    }
}
