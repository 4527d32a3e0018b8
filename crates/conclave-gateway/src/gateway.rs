//! Main Gateway implementation
//!
//! Composition root: builds every component from [`GatewayConfig`], exposes
//! the coordination operations and serves them over HTTP.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use conclave_core::{ConflictResolutionEngine, ConflictThreshold};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{
    AssignExpertsRequest, AssignExpertsResponse, CompleteHandoffRequest, FailHandoffRequest,
    InitiateHandoffRequest, InitiateHandoffResponse, ResolveConflictsRequest,
    ResolveConflictsResponse,
};
use crate::breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::cache::ResultCache;
use crate::config::GatewayConfig;
use crate::connector::{EndpointConnector, ExpertConnector};
use crate::dispatcher::Dispatcher;
use crate::handoff::{HandoffAck, HandoffCoordinator, HandoffRecord, HandoffStatusView};
use crate::monitor::{HealthMonitor, PerformanceReport, PerformanceTracker};
use crate::planner::AssignmentPlanner;
use crate::pool::ConnectionPool;
use crate::registry::ExpertRegistry;
use crate::{ErrorCategory, GatewayError, Result};

/// How often expired cache entries are purged
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Main Gateway
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ExpertRegistry>,
    cache: Arc<ResultCache>,
    planner: AssignmentPlanner,
    handoffs: HandoffCoordinator,
    engine: ConflictResolutionEngine,
    tracker: Arc<PerformanceTracker>,
    monitor: HealthMonitor,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a gateway that reaches experts over HTTP (or in-process for
    /// `local://` endpoints)
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let connector = EndpointConnector::new(config.dispatcher.call_timeout())?;
        Self::with_connector(config, Arc::new(connector))
    }

    pub fn with_connector(
        config: GatewayConfig,
        connector: Arc<dyn ExpertConnector>,
    ) -> Result<Self> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let registry = Arc::new(ExpertRegistry::new(config.experts.iter().cloned()));
        let pool = Arc::new(ConnectionPool::new(
            registry.clone(),
            connector,
            config.pool.clone(),
            config.dispatcher.call_timeout(),
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::from(
            &config.breaker,
        )));
        let cache = Arc::new(ResultCache::new(config.cache.max_entries));
        let dispatcher = Arc::new(Dispatcher::new(
            breakers.clone(),
            pool.clone(),
            config.dispatcher.call_timeout(),
            config.dispatcher.recent_errors,
            shutdown.clone(),
        ));
        let tracker = Arc::new(PerformanceTracker::new());

        let planner = AssignmentPlanner::new(
            dispatcher.clone(),
            pool.clone(),
            cache.clone(),
            config.cache.assignment_ttl(),
        );
        let handoffs = HandoffCoordinator::new(
            dispatcher.clone(),
            pool.clone(),
            cache.clone(),
            config.cache.handoff_ttl(),
        );
        let monitor = HealthMonitor::new(
            tracker.clone(),
            cache.clone(),
            pool,
            dispatcher,
            breakers,
            config.monitor.clone(),
        );

        tracing::info!("Gateway configured with {} experts", registry.len());

        Ok(Self {
            config,
            registry,
            cache,
            planner,
            handoffs,
            engine: ConflictResolutionEngine::new(),
            tracker,
            monitor,
            shutdown,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExpertRegistry {
        &self.registry
    }

    pub async fn assign_experts(
        &self,
        request: &AssignExpertsRequest,
    ) -> Result<AssignExpertsResponse> {
        self.tracker
            .measure("assign_experts", self.planner.assign(request))
            .await
            .map(Into::into)
    }

    pub async fn initiate_handoff(
        &self,
        request: &InitiateHandoffRequest,
    ) -> Result<InitiateHandoffResponse> {
        let record = self
            .tracker
            .measure("initiate_handoff", self.handoffs.initiate(request))
            .await?;
        Ok(InitiateHandoffResponse {
            handoff_id: record.id,
            status: record.status,
            connection_id: record.connection_id,
        })
    }

    pub async fn handoff_status(&self, handoff_id: &str) -> Result<HandoffStatusView> {
        self.tracker
            .measure("handoff_status", async { self.handoffs.status(handoff_id) })
            .await
    }

    pub fn handoff_record(&self, handoff_id: &str) -> Result<HandoffRecord> {
        self.handoffs.get(handoff_id)
    }

    pub async fn complete_handoff(
        &self,
        handoff_id: &str,
        results: serde_json::Value,
    ) -> Result<HandoffAck> {
        self.tracker
            .measure("complete_handoff", async {
                self.handoffs.complete(handoff_id, results)
            })
            .await
    }

    pub async fn fail_handoff(&self, handoff_id: &str, reason: &str) -> Result<HandoffAck> {
        self.tracker
            .measure("fail_handoff", async {
                self.handoffs.fail(handoff_id, reason)
            })
            .await
    }

    pub async fn resolve_conflicts(
        &self,
        request: &ResolveConflictsRequest,
    ) -> Result<ResolveConflictsResponse> {
        self.tracker
            .measure("resolve_conflicts", async {
                let threshold: ConflictThreshold = request.conflict_threshold.parse()?;
                let report = self.engine.resolve(&request.agent_results, threshold)?;
                if report.escalation_needed {
                    tracing::info!(
                        "Escalating {} recommendations (consensus {:.0})",
                        request.agent_results.len(),
                        report.consensus.score
                    );
                }
                let response: ResolveConflictsResponse = report.into();
                Ok::<_, GatewayError>(response)
            })
            .await
    }

    pub async fn performance_metrics(&self) -> PerformanceReport {
        self.monitor.report().await
    }

    /// Purge expired cache entries
    pub fn run_maintenance(&self) {
        let purged = self.cache.purge_expired();
        if purged > 0 {
            tracing::debug!("Maintenance purged {} cache entries", purged);
        }
    }

    /// Cancel in-flight dispatches and stop serving
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        tracing::info!("Gateway shutdown initiated");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Build the Axum router
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .route("/v1/assign-experts", post(Self::handle_assign))
            .route("/v1/handoffs", post(Self::handle_initiate_handoff))
            .route("/v1/handoffs/:id", get(Self::handle_handoff_status))
            .route("/v1/handoffs/:id/complete", post(Self::handle_complete_handoff))
            .route("/v1/handoffs/:id/fail", post(Self::handle_fail_handoff))
            .route("/v1/resolve-conflicts", post(Self::handle_resolve))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serve until [`Gateway::shutdown`] is called
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Conclave gateway listening on {}", addr);

        let maintenance = {
            let gateway = self.clone();
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => gateway.run_maintenance(),
                    }
                }
            })
        };

        let token = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        maintenance.abort();
        tracing::info!("Gateway stopped");
        Ok(())
    }

    // HTTP handlers

    async fn handle_health(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
        Json(serde_json::json!({
            "status": "healthy",
            "version": crate::VERSION,
            "experts": gateway.registry.len(),
        }))
    }

    async fn handle_metrics(State(gateway): State<Arc<Gateway>>) -> Json<PerformanceReport> {
        Json(gateway.performance_metrics().await)
    }

    async fn handle_assign(
        State(gateway): State<Arc<Gateway>>,
        Json(request): Json<AssignExpertsRequest>,
    ) -> Result<Json<AssignExpertsResponse>> {
        gateway.assign_experts(&request).await.map(Json)
    }

    async fn handle_initiate_handoff(
        State(gateway): State<Arc<Gateway>>,
        Json(request): Json<InitiateHandoffRequest>,
    ) -> Result<(StatusCode, Json<InitiateHandoffResponse>)> {
        let response = gateway.initiate_handoff(&request).await?;
        Ok((StatusCode::CREATED, Json(response)))
    }

    async fn handle_handoff_status(
        State(gateway): State<Arc<Gateway>>,
        Path(id): Path<String>,
    ) -> Result<Json<HandoffStatusView>> {
        gateway.handoff_status(&id).await.map(Json)
    }

    async fn handle_complete_handoff(
        State(gateway): State<Arc<Gateway>>,
        Path(id): Path<String>,
        Json(request): Json<CompleteHandoffRequest>,
    ) -> Result<Json<HandoffAck>> {
        gateway.complete_handoff(&id, request.results).await.map(Json)
    }

    async fn handle_fail_handoff(
        State(gateway): State<Arc<Gateway>>,
        Path(id): Path<String>,
        Json(request): Json<FailHandoffRequest>,
    ) -> Result<Json<HandoffAck>> {
        gateway.fail_handoff(&id, &request.reason).await.map(Json)
    }

    async fn handle_resolve(
        State(gateway): State<Arc<Gateway>>,
        Json(request): Json<ResolveConflictsRequest>,
    ) -> Result<Json<ResolveConflictsResponse>> {
        gateway.resolve_conflicts(&request).await.map(Json)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match (&self, self.category()) {
            (GatewayError::HandoffNotFound(_), _) => StatusCode::NOT_FOUND,
            (_, ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorCategory::Unavailable) | (_, ErrorCategory::CircuitOpen) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            (_, ErrorCategory::ExpertTimeout) => StatusCode::GATEWAY_TIMEOUT,
            (_, ErrorCategory::Uncategorized) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "category": self.category(),
        }));
        (status, body).into_response()
    }
}
