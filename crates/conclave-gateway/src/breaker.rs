//! Circuit Breaker Pattern for expert endpoints
//!
//! Stops calling an expert that keeps failing. After `failure_threshold`
//! consecutive failures the breaker opens and calls fail fast; once the
//! cooldown elapses exactly one trial call is let through. Its outcome
//! either closes the breaker or restarts the cooldown.

use conclave_core::ExpertId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::BreakerSettings;
use crate::{GatewayError, Result};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failure threshold reached - requests fail fast
    Open,
    /// Cooldown elapsed - a single trial call decides
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before allowing the trial call
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            cooldown: settings.cooldown(),
        }
    }
}

/// How a call was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    /// The single half-open probe
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    total_successes: u64,
    total_failures: u64,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
    times_opened: u64,
}

/// Circuit breaker for a single expert
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
    expert_id: ExpertId,
}

impl CircuitBreaker {
    pub fn new(expert_id: ExpertId, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                total_successes: 0,
                total_failures: 0,
                opened_at: None,
                last_failure: None,
                trial_in_flight: false,
                times_opened: 0,
            }),
            expert_id,
        }
    }

    /// Check if a call may proceed. Fails with `CircuitOpen` without
    /// touching the network.
    pub async fn try_acquire(&self) -> Result<Admission> {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(self.config.cooldown);

                if elapsed >= self.config.cooldown {
                    tracing::info!(
                        "Circuit breaker for {} transitioning to half-open",
                        self.expert_id
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                } else {
                    Err(self.open_error(self.config.cooldown - elapsed))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.open_error(Duration::ZERO))
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    fn open_error(&self, retry_after: Duration) -> GatewayError {
        GatewayError::CircuitOpen {
            expert: self.expert_id.to_string(),
            retry_after,
        }
    }

    /// Record successful execution. While half-open only the trial call
    /// decides the outcome.
    pub async fn record_success(&self, admission: Admission) {
        let mut inner = self.inner.write().await;
        inner.total_successes += 1;
        if inner.state != CircuitState::Closed && admission == Admission::Normal {
            // late success from a call admitted before the circuit opened
            return;
        }
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            tracing::info!(
                "Circuit breaker for {} closed - expert recovered",
                self.expert_id
            );
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.trial_in_flight = false;
        }
    }

    /// Record failed execution. Returns true when this failure opened the
    /// circuit.
    pub async fn record_failure(&self, admission: Admission) -> bool {
        let mut inner = self.inner.write().await;
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());

        let open = match inner.state {
            CircuitState::Closed => {
                let tripped = inner.consecutive_failures >= self.config.failure_threshold;
                if tripped {
                    tracing::warn!(
                        "Circuit breaker for {} opened after {} failures",
                        self.expert_id,
                        inner.consecutive_failures
                    );
                }
                tripped
            }
            CircuitState::HalfOpen if admission == Admission::Trial => {
                tracing::warn!(
                    "Circuit breaker for {} back to OPEN - trial call failed",
                    self.expert_id
                );
                true
            }
            // late failure from a call admitted before the circuit opened
            CircuitState::HalfOpen | CircuitState::Open => false,
        };

        if open {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trial_in_flight = false;
            inner.times_opened += 1;
        }
        open
    }

    /// The trial ended without saying anything about the expert's health
    /// (cancelled or rejected locally); let the next caller probe instead.
    pub async fn release_trial(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    /// Get current state
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub fn expert_id(&self) -> &ExpertId {
        &self.expert_id
    }

    /// Get metrics
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.read().await;
        CircuitBreakerMetrics {
            expert_id: self.expert_id.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            times_opened: inner.times_opened,
            last_failure_age_ms: inner.last_failure.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    pub expert_id: ExpertId,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub times_opened: u64,
    pub last_failure_age_ms: Option<u64>,
}

/// Circuit breaker registry - one breaker per expert per process
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<ExpertId, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get or create circuit breaker for expert
    pub async fn get_or_create(&self, expert_id: &ExpertId) -> Arc<CircuitBreaker> {
        if let Some(cb) = self.breakers.read().await.get(expert_id) {
            return cb.clone();
        }

        self.breakers
            .write()
            .await
            .entry(expert_id.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(expert_id.clone(), self.config.clone()))
            })
            .clone()
    }

    /// Get circuit breaker for expert (if exists)
    pub async fn get(&self, expert_id: &ExpertId) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(expert_id).cloned()
    }

    /// Metrics for every breaker, ordered by expert id
    pub async fn all_metrics(&self) -> Vec<CircuitBreakerMetrics> {
        let breakers: Vec<_> = self.breakers.read().await.values().cloned().collect();
        let mut metrics = Vec::with_capacity(breakers.len());

        for cb in breakers {
            metrics.push(cb.metrics().await);
        }

        metrics.sort_by(|a, b| a.expert_id.cmp(&b.expert_id));
        metrics
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
