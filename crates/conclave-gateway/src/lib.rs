//! Conclave Gateway - coordinating remote reasoning experts
//!
//! This crate is the runtime half of Conclave. It delegates sub-tasks to a
//! pool of specialized experts, keeps their sessions healthy and reconciles
//! what they say using the engine from `conclave-core`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Conclave Gateway                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │   HTTP (axum)  /v1/assign-experts  /v1/handoffs  /metrics     │
//! │                            │                                  │
//! │        ┌───────────────────┼────────────────────┐             │
//! │        ▼                   ▼                    ▼             │
//! │ AssignmentPlanner  HandoffCoordinator  ConflictResolutionEngine│
//! │        │                   │                                  │
//! │        └─────────┬─────────┘                                  │
//! │                  ▼                                            │
//! │   Dispatcher ── CircuitBreakerRegistry                        │
//! │        │                                                      │
//! │        ▼                                                      │
//! │   ConnectionPool ── ExpertConnector (http / local://)         │
//! │                                                               │
//! │   ResultCache (TTL)          HealthMonitor                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Bounded sessions**: per-expert cap with a bounded wait, idle recycling
//! - **Circuit breaking**: fail fast on unhealthy experts, single-trial recovery
//! - **Graceful degradation**: recoverable failures yield tagged fallback results
//! - **Handoffs**: cross-session task transfer with a monotonic lifecycle
//! - **Conflict resolution**: consensus, mediation and escalation decisions

pub mod api;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod handoff;
pub mod monitor;
pub mod planner;
pub mod pool;
pub mod registry;

pub use api::{
    AssignExpertsRequest, AssignExpertsResponse, InitiateHandoffRequest, InitiateHandoffResponse,
    ResolveConflictsRequest, ResolveConflictsResponse,
};
pub use breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use cache::ResultCache;
pub use config::GatewayConfig;
pub use connector::{EndpointConnector, ExpertConnector, HttpConnector, LoopbackConnector};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ErrorCategory, GatewayError, Result};
pub use gateway::Gateway;
pub use handoff::{HandoffAck, HandoffCoordinator, HandoffStatus, HandoffStatusView, HandoffUrgency};
pub use monitor::{HealthMonitor, PerformanceReport, PerformanceTracker};
pub use planner::AssignmentPlanner;
pub use pool::{ConnectionPool, Lease};
pub use registry::ExpertRegistry;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 18790;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
