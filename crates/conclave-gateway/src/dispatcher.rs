//! Error / fallback dispatcher
//!
//! Every expert call goes through [`Dispatcher::run`]: breaker check, a
//! bounded and cancellable primary call, breaker bookkeeping, then either
//! the value, a tagged degraded value from the fallback, or a rejected
//! validation error.

use chrono::{DateTime, Utc};
use conclave_core::ExpertId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::breaker::{Admission, CircuitBreaker, CircuitBreakerRegistry};
use crate::pool::ConnectionPool;
use crate::{ErrorCategory, GatewayError, Result};

/// Result of a dispatched call
#[derive(Debug)]
pub enum DispatchOutcome<T> {
    Complete(T),
    /// Primary failed recoverably; `value` came from the fallback
    Degraded {
        value: T,
        category: ErrorCategory,
        detail: String,
    },
    /// Validation failure; nothing was retried or substituted
    Rejected(GatewayError),
}

impl<T> DispatchOutcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, DispatchOutcome::Degraded { .. })
    }

    pub fn degradation(&self) -> Option<ErrorCategory> {
        match self {
            DispatchOutcome::Degraded { category, .. } => Some(*category),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DispatchOutcome<U> {
        match self {
            DispatchOutcome::Complete(v) => DispatchOutcome::Complete(f(v)),
            DispatchOutcome::Degraded {
                value,
                category,
                detail,
            } => DispatchOutcome::Degraded {
                value: f(value),
                category,
                detail,
            },
            DispatchOutcome::Rejected(e) => DispatchOutcome::Rejected(e),
        }
    }

    /// Value of a complete or degraded call
    pub fn into_result(self) -> Result<T> {
        match self {
            DispatchOutcome::Complete(v) | DispatchOutcome::Degraded { value: v, .. } => Ok(v),
            DispatchOutcome::Rejected(e) => Err(e),
        }
    }
}

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    pub operation: String,
    pub expert_id: ExpertId,
    pub category: ErrorCategory,
    pub message: String,
}

/// Dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStats {
    pub total_calls: u64,
    pub total_errors: u64,
    pub degraded: u64,
    pub rejected: u64,
    pub error_rate: f64,
    /// Errors nobody classified; each one deserves a look
    pub uncategorized: u64,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub by_expert: BTreeMap<ExpertId, u64>,
    pub recent: VecDeque<ErrorRecord>,
}

pub struct Dispatcher {
    breakers: Arc<CircuitBreakerRegistry>,
    pool: Arc<ConnectionPool>,
    call_timeout: Duration,
    recent_capacity: usize,
    stats: Mutex<DispatcherStats>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        pool: Arc<ConnectionPool>,
        call_timeout: Duration,
        recent_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            breakers,
            pool,
            call_timeout,
            recent_capacity,
            stats: Mutex::new(DispatcherStats::default()),
            shutdown,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run `primary` against `expert_id`, substituting `fallback` on any
    /// recoverable failure. In-flight calls resolve into the fallback when
    /// the gateway shuts down.
    pub async fn run<T, F, Fut, FB>(
        &self,
        operation: &str,
        expert_id: &ExpertId,
        primary: F,
        fallback: FB,
    ) -> DispatchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce(&GatewayError) -> T,
    {
        self.run_with_token(
            operation,
            expert_id,
            self.shutdown.child_token(),
            primary,
            fallback,
        )
        .await
    }

    pub async fn run_with_token<T, F, Fut, FB>(
        &self,
        operation: &str,
        expert_id: &ExpertId,
        cancel: CancellationToken,
        primary: F,
        fallback: FB,
    ) -> DispatchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce(&GatewayError) -> T,
    {
        self.stats.lock().total_calls += 1;

        // unregistered ids never reach the breaker registry or the stats maps
        let result = if !self.pool.knows(expert_id) {
            Err(GatewayError::UnknownExpert(expert_id.to_string()))
        } else {
            self.call(expert_id, cancel, primary).await
        };

        match result {
            Ok(value) => DispatchOutcome::Complete(value),
            Err(e) => {
                let category = e.category();
                self.record_error(operation, expert_id, &e);

                if category.is_recoverable() {
                    tracing::warn!(
                        "{} degraded for {} ({}): {}",
                        operation,
                        expert_id,
                        category,
                        e
                    );
                    self.stats.lock().degraded += 1;
                    DispatchOutcome::Degraded {
                        value: fallback(&e),
                        category,
                        detail: e.to_string(),
                    }
                } else {
                    tracing::debug!("{} rejected: {}", operation, e);
                    self.stats.lock().rejected += 1;
                    DispatchOutcome::Rejected(e)
                }
            }
        }
    }

    async fn call<T, F, Fut>(
        &self,
        expert_id: &ExpertId,
        cancel: CancellationToken,
        primary: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = self.breakers.get_or_create(expert_id).await;
        let admission = breaker.try_acquire().await?;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(GatewayError::Cancelled {
                expert: expert_id.to_string(),
            }),
            res = tokio::time::timeout(self.call_timeout, primary()) => match res {
                Ok(r) => r,
                Err(_) => Err(GatewayError::ExpertTimeout {
                    expert: expert_id.to_string(),
                    timeout: self.call_timeout,
                }),
            },
        };
        self.settle(&breaker, admission, &outcome).await;
        outcome
    }

    async fn settle<T>(
        &self,
        breaker: &CircuitBreaker,
        admission: Admission,
        outcome: &Result<T>,
    ) {
        match outcome {
            Ok(_) => breaker.record_success(admission).await,
            Err(e) if e.counts_against_expert() => {
                if breaker.record_failure(admission).await {
                    self.pool.evict_expert(breaker.expert_id());
                }
            }
            Err(_) if admission == Admission::Trial => breaker.release_trial().await,
            Err(_) => {}
        }
    }

    fn record_error(&self, operation: &str, expert_id: &ExpertId, error: &GatewayError) {
        let category = error.category();
        let mut stats = self.stats.lock();
        stats.total_errors += 1;
        *stats.by_category.entry(category).or_default() += 1;
        if self.pool.knows(expert_id) {
            *stats.by_expert.entry(expert_id.clone()).or_default() += 1;
        }
        if category == ErrorCategory::Uncategorized {
            stats.uncategorized += 1;
            tracing::warn!("Uncategorized error in {} for {}: {}", operation, expert_id, error);
        }

        if self.recent_capacity > 0 {
            if stats.recent.len() >= self.recent_capacity {
                stats.recent.pop_front();
            }
            stats.recent.push_back(ErrorRecord {
                at: Utc::now(),
                operation: operation.to_string(),
                expert_id: expert_id.clone(),
                category,
                message: error.to_string(),
            });
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        let mut stats = self.stats.lock().clone();
        stats.error_rate = if stats.total_calls == 0 {
            0.0
        } else {
            stats.total_errors as f64 / stats.total_calls as f64
        };
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{CircuitBreakerConfig, CircuitState};
    use crate::config::PoolSettings;
    use crate::connector::LoopbackConnector;
    use crate::registry::ExpertRegistry;
    use conclave_core::Expert;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn dispatcher(failure_threshold: u32, call_timeout_ms: u64) -> Dispatcher {
        let experts = ["a", "slow", "flaky", "e0", "e1", "e2", "e3", "e4", "e5"]
            .into_iter()
            .map(|id| Expert::new(id, format!("local://{id}")));
        let pool = ConnectionPool::new(
            Arc::new(ExpertRegistry::new(experts)),
            Arc::new(LoopbackConnector),
            PoolSettings::default(),
            Duration::from_secs(1),
        );
        Dispatcher::new(
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
                failure_threshold,
                cooldown: Duration::from_secs(60),
            })),
            Arc::new(pool),
            Duration::from_millis(call_timeout_ms),
            4,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_complete() {
        let d = dispatcher(3, 1_000);
        let outcome = d
            .run("op", &"a".into(), || async { Ok(7) }, |_| 0)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Complete(7)));
        assert_eq!(d.stats().total_errors, 0);
    }

    #[tokio::test]
    async fn test_validation_is_rejected_without_fallback() {
        let d = dispatcher(3, 1_000);
        let outcome = d
            .run(
                "op",
                &"a".into(),
                || async { Err::<u32, _>(GatewayError::Validation("bad".into())) },
                |_| panic!("fallback must not run"),
            )
            .await;
        assert!(matches!(outcome, DispatchOutcome::Rejected(_)));
        assert_eq!(d.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let d = dispatcher(3, 20);
        let outcome = d
            .run(
                "op",
                &"slow".into(),
                || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(1)
                },
                |_| 99,
            )
            .await;
        assert_eq!(outcome.degradation(), Some(ErrorCategory::ExpertTimeout));
        assert_eq!(outcome.into_result().unwrap(), 99);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_fails_fast() {
        let d = dispatcher(2, 1_000);
        let id: ExpertId = "flaky".into();
        for _ in 0..2 {
            d.run("op", &id, || async { Err::<u32, _>(GatewayError::Expert("boom".into())) }, |_| 0)
                .await;
        }

        let breaker = d.breakers.get(&id).await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::Open);

        let called = AtomicBool::new(false);
        let flag = &called;
        let outcome = d
            .run(
                "op",
                &id,
                move || async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(1u32)
                },
                |_| 5,
            )
            .await;
        assert_eq!(outcome.degradation(), Some(ErrorCategory::CircuitOpen));
        assert!(!called.load(Ordering::SeqCst));

        let stats = d.stats();
        assert_eq!(stats.uncategorized, 2);
        assert_eq!(stats.by_category[&ErrorCategory::CircuitOpen], 1);
        assert!((stats.error_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cancellation_resolves_into_fallback() {
        let d = dispatcher(3, 5_000);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = d
            .run_with_token(
                "op",
                &"a".into(),
                token,
                || std::future::pending::<Result<u32>>(),
                |_| 3,
            )
            .await;
        assert!(outcome.is_degraded());
        // cancellation says nothing about the expert
        let breaker = d.breakers.get(&"a".into()).await.unwrap();
        assert_eq!(breaker.metrics().await.total_failures, 0);
    }

    #[tokio::test]
    async fn test_recent_errors_are_bounded() {
        let d = dispatcher(100, 1_000);
        for i in 0..6 {
            let expert: ExpertId = format!("e{i}").into();
            d.run("op", &expert, || async { Err::<(), _>(GatewayError::Expert("x".into())) }, |_| ())
                .await;
        }
        let stats = d.stats();
        assert_eq!(stats.recent.len(), 4);
        assert_eq!(stats.recent[0].expert_id.as_str(), "e2");
    }

    #[tokio::test]
    async fn test_unregistered_experts_leave_no_state_behind() {
        let d = dispatcher(3, 1_000);
        for i in 0..50 {
            let called = AtomicBool::new(false);
            let flag = &called;
            let outcome = d
                .run(
                    "op",
                    &format!("bogus-{i}").into(),
                    move || async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(1u32)
                    },
                    |_| 0,
                )
                .await;
            assert_eq!(outcome.degradation(), Some(ErrorCategory::Unavailable));
            assert!(!called.load(Ordering::SeqCst));
        }

        assert!(d.breakers.all_metrics().await.is_empty());
        let stats = d.stats();
        assert!(stats.by_expert.is_empty());
        assert_eq!(stats.by_category[&ErrorCategory::Unavailable], 50);
        assert_eq!(stats.recent.len(), 4);
    }
}
