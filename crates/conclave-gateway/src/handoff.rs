//! Cross-session handoff lifecycle
//!
//! A handoff moves a task from a source agent to a target expert across
//! independent request/response sessions. Records live in the result cache
//! under `handoff:{id}:{scope}` with an alias `handoff:{id}` holding the
//! scope, so a caller that only knows the id can find the record.

use chrono::{DateTime, Utc};
use conclave_core::ExpertId;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::pool::ConnectionPool;
use crate::{GatewayError, Result};

/// Handoff status. Advances monotonically; `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandoffStatus {
    Initiated,
    /// Initiated without a session to the target expert
    InitiatedFallback,
    Active,
    Completed,
    Failed,
}

impl HandoffStatus {
    pub fn can_transition_to(&self, next: HandoffStatus) -> bool {
        use HandoffStatus::*;
        matches!(
            (self, next),
            (Initiated, Active)
                | (Initiated, Completed)
                | (Initiated, Failed)
                | (InitiatedFallback, Completed)
                | (InitiatedFallback, Failed)
                | (Active, Completed)
                | (Active, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HandoffStatus::Completed | HandoffStatus::Failed)
    }

    pub fn progress(&self) -> f64 {
        match self {
            HandoffStatus::Initiated | HandoffStatus::InitiatedFallback => 0.1,
            HandoffStatus::Active => 0.5,
            HandoffStatus::Completed => 1.0,
            HandoffStatus::Failed => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::Initiated => "initiated",
            HandoffStatus::InitiatedFallback => "initiated-fallback",
            HandoffStatus::Active => "active",
            HandoffStatus::Completed => "completed",
            HandoffStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffUrgency {
    Low,
    #[default]
    Normal,
    High,
}

impl HandoffUrgency {
    /// Expected time from initiation to completion
    pub fn expected_duration(&self) -> chrono::Duration {
        match self {
            HandoffUrgency::High => chrono::Duration::minutes(5),
            HandoffUrgency::Normal => chrono::Duration::minutes(15),
            HandoffUrgency::Low => chrono::Duration::minutes(60),
        }
    }
}

fn default_scope() -> String {
    "full".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub task_id: String,

    #[serde(default)]
    pub source_agent: String,

    pub target_expert: ExpertId,

    #[serde(default = "default_scope")]
    pub context_scope: String,

    #[serde(default)]
    pub subtask_description: String,

    #[serde(default)]
    pub urgency: HandoffUrgency,

    /// Opaque context transferred to the target expert
    #[serde(default, alias = "context")]
    pub context_payload: serde_json::Value,
}

impl HandoffRequest {
    pub fn new(task_id: impl Into<String>, target_expert: impl Into<ExpertId>) -> Self {
        Self {
            task_id: task_id.into(),
            source_agent: String::new(),
            target_expert: target_expert.into(),
            context_scope: default_scope(),
            subtask_description: String::new(),
            urgency: HandoffUrgency::default(),
            context_payload: serde_json::Value::Null,
        }
    }

    pub fn with_source(mut self, agent: impl Into<String>) -> Self {
        self.source_agent = agent.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.context_scope = scope.into();
        self
    }

    pub fn with_subtask(mut self, description: impl Into<String>) -> Self {
        self.subtask_description = description.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.context_payload = payload;
        self
    }

    pub fn with_urgency(mut self, urgency: HandoffUrgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_id.trim().is_empty() {
            return Err(GatewayError::MissingField("taskId"));
        }
        if self.target_expert.is_blank() {
            return Err(GatewayError::MissingField("targetExpert"));
        }
        if self.context_scope.trim().is_empty() || self.context_scope.contains(':') {
            return Err(GatewayError::Validation(format!(
                "invalid context scope: {:?}",
                self.context_scope
            )));
        }
        Ok(())
    }
}

/// Persisted handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    pub id: String,
    pub task_id: String,
    pub source_agent: String,
    pub target_expert: ExpertId,
    pub context_scope: String,
    pub subtask_description: String,
    pub urgency: HandoffUrgency,
    pub status: HandoffStatus,
    /// Session the handoff was opened on; returned to the pool once persisted
    pub connection_id: String,
    pub context_payload: serde_json::Value,
    pub results: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HandoffRecord {
    pub fn is_degraded(&self) -> bool {
        self.status == HandoffStatus::InitiatedFallback
            || self.connection_id.starts_with("fallback-conn-")
    }

    pub fn view(&self) -> HandoffStatusView {
        HandoffStatusView {
            handoff_id: self.id.clone(),
            status: self.status,
            progress: self.status.progress(),
            estimated_completion: (!self.status.is_terminal())
                .then(|| self.created_at + self.urgency.expected_duration()),
            last_activity: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffStatusView {
    pub handoff_id: String,
    pub status: HandoffStatus,
    pub progress: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
}

/// Acknowledgement of a finalized handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffAck {
    pub handoff_id: String,
    pub status: HandoffStatus,
    pub finalized_at: DateTime<Utc>,
}

fn handoff_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "handoff-{}-{}",
        Utc::now().timestamp_millis(),
        suffix.to_lowercase()
    )
}

fn alias_key(id: &str) -> String {
    format!("handoff:{}", id)
}

fn record_key(id: &str, scope: &str) -> String {
    format!("handoff:{}:{}", id, scope)
}

pub struct HandoffCoordinator {
    dispatcher: Arc<Dispatcher>,
    pool: Arc<ConnectionPool>,
    cache: Arc<ResultCache>,
    ttl: Duration,
    /// Serializes read-check-write of records
    transitions: Mutex<()>,
}

impl HandoffCoordinator {
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
            transitions: Mutex::new(()),
        }
    }

    pub async fn initiate(&self, request: &HandoffRequest) -> Result<HandoffRecord> {
        request.validate()?;

        let pool = &self.pool;
        let target = &request.target_expert;
        let tag = request.task_id.as_str();
        let outcome = self
            .dispatcher
            .run(
                "initiate_handoff",
                target,
                move || async move {
                    let lease = pool.acquire(target, tag).await?;
                    let connection_id = lease.id().to_string();
                    pool.release(lease);
                    Ok(Some(connection_id))
                },
                |_| None,
            )
            .await;

        let session = match outcome {
            DispatchOutcome::Complete(session)
            | DispatchOutcome::Degraded { value: session, .. } => session,
            DispatchOutcome::Rejected(e) => return Err(e),
        };
        let has_session = session.is_some();

        let now = Utc::now();
        let (status, connection_id) = match session {
            Some(connection_id) => (HandoffStatus::Initiated, connection_id),
            None => (
                HandoffStatus::InitiatedFallback,
                format!("fallback-conn-{}", Uuid::new_v4().simple()),
            ),
        };

        let mut record = HandoffRecord {
            id: handoff_id(),
            task_id: request.task_id.clone(),
            source_agent: request.source_agent.clone(),
            target_expert: request.target_expert.clone(),
            context_scope: request.context_scope.clone(),
            subtask_description: request.subtask_description.clone(),
            urgency: request.urgency,
            status,
            connection_id,
            context_payload: request.context_payload.clone(),
            results: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.store(&record)?;

        if has_session {
            // persisted with a live session
            record.status = HandoffStatus::Active;
            self.store(&record)?;
            tracing::info!(
                "Handoff {} active: {} -> {} ({})",
                record.id,
                record.source_agent,
                record.target_expert,
                record.connection_id
            );
        } else {
            tracing::warn!(
                "Handoff {} initiated without a session to {}",
                record.id,
                record.target_expert
            );
        }

        Ok(record)
    }

    fn store(&self, record: &HandoffRecord) -> Result<()> {
        self.cache.set_json(
            record_key(&record.id, &record.context_scope),
            record,
            self.ttl,
        )?;
        self.cache
            .set_json(alias_key(&record.id), &record.context_scope, self.ttl)
    }

    pub fn get(&self, handoff_id: &str) -> Result<HandoffRecord> {
        let not_found = || GatewayError::HandoffNotFound(handoff_id.to_string());
        let scope: String = self
            .cache
            .get_json(&alias_key(handoff_id))?
            .ok_or_else(not_found)?;
        self.cache
            .get_json(&record_key(handoff_id, &scope))?
            .ok_or_else(not_found)
    }

    pub fn status(&self, handoff_id: &str) -> Result<HandoffStatusView> {
        Ok(self.get(handoff_id)?.view())
    }

    pub fn complete(&self, handoff_id: &str, results: serde_json::Value) -> Result<HandoffAck> {
        self.finalize(handoff_id, HandoffStatus::Completed, |record| {
            record.results = Some(results);
        })
    }

    pub fn fail(&self, handoff_id: &str, reason: impl Into<String>) -> Result<HandoffAck> {
        let reason = reason.into();
        self.finalize(handoff_id, HandoffStatus::Failed, |record| {
            record.failure_reason = Some(reason);
        })
    }

    fn finalize(
        &self,
        handoff_id: &str,
        status: HandoffStatus,
        update: impl FnOnce(&mut HandoffRecord),
    ) -> Result<HandoffAck> {
        let record = {
            let _guard = self.transitions.lock();
            let mut record = self.get(handoff_id)?;
            if !record.status.can_transition_to(status) {
                return Err(GatewayError::InvalidTransition {
                    id: handoff_id.to_string(),
                    from: record.status.as_str().to_string(),
                    to: status.as_str().to_string(),
                });
            }

            let now = Utc::now();
            update(&mut record);
            record.status = status;
            record.updated_at = now;
            record.completed_at = Some(now);
            self.store(&record)?;
            record
        };

        tracing::info!("Handoff {} {}", record.id, record.status.as_str());
        Ok(HandoffAck {
            handoff_id: record.id,
            status: record.status,
            finalized_at: record.updated_at,
        })
    }
}
