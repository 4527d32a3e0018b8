//! Health and performance monitoring

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::breaker::{CircuitBreakerMetrics, CircuitBreakerRegistry, CircuitState};
use crate::cache::{CacheStats, ResultCache};
use crate::config::MonitorSettings;
use crate::dispatcher::{Dispatcher, DispatcherStats};
use crate::pool::{ConnectionPool, PoolStats};

/// Timing summary for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub count: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

/// Explicit timing wrapper applied at call sites
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    timings: Mutex<HashMap<String, Timing>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn measure<F: Future>(&self, operation: &str, future: F) -> F::Output {
        let start = Instant::now();
        let output = future.await;
        self.record(operation, start.elapsed());
        output
    }

    pub fn record(&self, operation: &str, elapsed: Duration) {
        let mut timings = self.timings.lock();
        match timings.get_mut(operation) {
            Some(t) => {
                t.count += 1;
                t.total += elapsed;
                t.min = t.min.min(elapsed);
                t.max = t.max.max(elapsed);
            }
            None => {
                timings.insert(
                    operation.to_string(),
                    Timing {
                        count: 1,
                        total: elapsed,
                        min: elapsed,
                        max: elapsed,
                    },
                );
            }
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        let ms = |d: Duration| d.as_secs_f64() * 1_000.0;
        self.timings
            .lock()
            .iter()
            .map(|(op, t)| {
                (
                    op.clone(),
                    OperationStats {
                        count: t.count,
                        total_ms: ms(t.total),
                        min_ms: ms(t.min),
                        max_ms: ms(t.max),
                        mean_ms: ms(t.total) / t.count as f64,
                    },
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub uptime_secs: u64,
    pub performance: BTreeMap<String, OperationStats>,
    pub caching: CacheStats,
    pub connection_pool: Vec<PoolStats>,
    pub error_handling: DispatcherStats,
    pub circuit_breakers: Vec<CircuitBreakerMetrics>,
    pub overall_health: OverallHealth,
}

/// Judge overall health from component snapshots
pub fn assess(
    settings: &MonitorSettings,
    caching: &CacheStats,
    pools: &[PoolStats],
    errors: &DispatcherStats,
    breakers: &[CircuitBreakerMetrics],
) -> OverallHealth {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let open: Vec<_> = breakers
        .iter()
        .filter(|b| b.state != CircuitState::Closed)
        .map(|b| b.expert_id.as_str())
        .collect();
    if !open.is_empty() {
        issues.push(format!("Circuit breakers not closed: {}", open.join(", ")));
        recommendations.push("Check health of the affected expert endpoints".to_string());
    }

    if errors.error_rate > settings.max_error_rate {
        issues.push(format!(
            "Error rate {:.1}% exceeds {:.1}%",
            errors.error_rate * 100.0,
            settings.max_error_rate * 100.0
        ));
        recommendations.push("Review recent errors by category and expert".to_string());
    }

    if errors.uncategorized > 0 {
        issues.push(format!("{} uncategorized errors", errors.uncategorized));
        recommendations.push("Classify uncategorized errors so they get explicit handling".to_string());
    }

    let saturated: Vec<_> = pools
        .iter()
        .filter(|p| p.is_saturated())
        .map(|p| p.expert_id.as_str())
        .collect();
    if !saturated.is_empty() {
        issues.push(format!("Connection pools saturated: {}", saturated.join(", ")));
        recommendations.push("Raise pool.max_sessions_per_expert or add expert capacity".to_string());
    }

    if caching.lookups() >= settings.min_cache_lookups && caching.hit_rate < settings.min_cache_hit_rate {
        issues.push(format!("Cache hit rate {:.1}% is low", caching.hit_rate * 100.0));
        recommendations.push("Consider longer cache TTLs".to_string());
    }

    OverallHealth {
        healthy: issues.is_empty(),
        issues,
        recommendations,
    }
}

pub struct HealthMonitor {
    tracker: Arc<PerformanceTracker>,
    cache: Arc<ResultCache>,
    pool: Arc<ConnectionPool>,
    dispatcher: Arc<Dispatcher>,
    breakers: Arc<CircuitBreakerRegistry>,
    settings: MonitorSettings,
    started_at: Instant,
}

impl HealthMonitor {
    pub fn new(
        tracker: Arc<PerformanceTracker>,
        cache: Arc<ResultCache>,
        pool: Arc<ConnectionPool>,
        dispatcher: Arc<Dispatcher>,
        breakers: Arc<CircuitBreakerRegistry>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            tracker,
            cache,
            pool,
            dispatcher,
            breakers,
            settings,
            started_at: Instant::now(),
        }
    }

    pub async fn report(&self) -> PerformanceReport {
        let caching = self.cache.stats();
        let connection_pool = self.pool.stats();
        let error_handling = self.dispatcher.stats();
        let circuit_breakers = self.breakers.all_metrics().await;
        let overall_health = assess(
            &self.settings,
            &caching,
            &connection_pool,
            &error_handling,
            &circuit_breakers,
        );

        PerformanceReport {
            uptime_secs: self.started_at.elapsed().as_secs(),
            performance: self.tracker.snapshot(),
            caching,
            connection_pool,
            error_handling,
            circuit_breakers,
            overall_health,
        }
    }
}
