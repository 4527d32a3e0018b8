//! Conclave Core - decision logic for coordinating remote reasoning experts
//!
//! This crate holds everything in Conclave that is pure computation: expert
//! identities, the assignment decision tables and the multi-agent conflict
//! resolution engine. It performs no I/O and owns no shared state, so every
//! function here is safe to call from any number of concurrent requests.
//!
//! # Architecture
//!
//! ```text
//!  AgentRecommendation[] ──► StatementAnalyzer ──► Statement[]
//!                                                     │
//!                         ┌───────────────────────────┼──────────────────┐
//!                         ▼                           ▼                  ▼
//!                  ConsensusResult             ConflictRecord[]    (polarity clusters)
//!                         │                           │                  │
//!                         └──────────┬────────────────┘                  │
//!                                    ▼                                   ▼
//!                           MediationStrategy ──► escalation? ──► SynthesizedRecommendation
//!                                                      │
//!                                                      ▼
//!                                             RecommendedAction
//! ```
//!
//! # Quick Start
//!
//! ```
//! use conclave_core::{AgentRecommendation, ConflictResolutionEngine, ConflictThreshold};
//!
//! let engine = ConflictResolutionEngine::new();
//! let report = engine
//!     .resolve(
//!         &[
//!             AgentRecommendation::new("architecture", "Recommend implementing a cache", 0.9),
//!             AgentRecommendation::new("performance", "Should implement a cache", 0.85),
//!         ],
//!         ConflictThreshold::Standard,
//!     )
//!     .unwrap();
//!
//! assert!(!report.escalation_needed);
//! assert!(report.synthesized_recommendation.is_some());
//! ```

pub mod analysis;
pub mod assignment;
pub mod conflict;
pub mod consensus;
pub mod error;
pub mod expert;
pub mod mediation;
pub mod recommendation;
pub mod resolution;

pub use analysis::{KeywordAnalyzer, Polarity, Statement, StatementAnalyzer};
pub use assignment::{AllocationStrategy, Assignment, CoordinationPattern};
pub use conflict::{ConflictRecord, ConflictSeverity, ConflictThreshold, ConflictType};
pub use consensus::{ConsensusLevel, ConsensusResult, PairAgreement};
pub use error::{CoreError, Result};
pub use expert::{Expert, ExpertId};
pub use mediation::{MediationApproach, MediationStrategy};
pub use recommendation::AgentRecommendation;
pub use resolution::{
    ConflictResolutionEngine, EscalationUrgency, RecommendedAction, ResolutionReport,
    SynthesizedRecommendation,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
