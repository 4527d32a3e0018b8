//! Consensus scoring over a set of analyzed recommendations
//!
//! Every unordered pair contributes up to two agreement points:
//!
//! | Pair relation                                    | Points |
//! |--------------------------------------------------|--------|
//! | Same stance on a matching subject                | 2      |
//! | More than two significant tokens in common       | 1      |
//! | Anything else, and every direct contradiction    | 0      |
//!
//! `score = 100 * points / (2 * pairs)`; a single recommendation scores 100.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::analysis::Statement;

/// Minimum shared significant tokens (exclusive) for partial agreement
pub const PARTIAL_AGREEMENT_TOKENS: usize = 2;

/// Consensus band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusLevel {
    Low,
    Medium,
    High,
}

impl ConsensusLevel {
    /// >70 high, >40 medium, otherwise low
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            ConsensusLevel::High
        } else if score > 40.0 {
            ConsensusLevel::Medium
        } else {
            ConsensusLevel::Low
        }
    }
}

/// How two recommendations relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairAgreement {
    Full,
    Partial,
    Disagreement,
}

impl PairAgreement {
    pub fn classify(a: &Statement, b: &Statement) -> Self {
        if a.agrees_with(b) {
            PairAgreement::Full
        } else if a.contradicts(b) {
            PairAgreement::Disagreement
        } else if a.shared_tokens(b) > PARTIAL_AGREEMENT_TOKENS {
            PairAgreement::Partial
        } else {
            PairAgreement::Disagreement
        }
    }

    pub fn points(self) -> u32 {
        match self {
            PairAgreement::Full => 2,
            PairAgreement::Partial => 1,
            PairAgreement::Disagreement => 0,
        }
    }
}

/// Aggregate agreement measure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub score: f64,
    pub level: ConsensusLevel,
    pub agent_count: usize,
}

impl ConsensusResult {
    pub fn from_score(score: f64, agent_count: usize) -> Self {
        let score = score.clamp(0.0, 100.0);
        Self {
            score,
            level: ConsensusLevel::from_score(score),
            agent_count,
        }
    }

    /// Score the agreement between all statements
    pub fn measure(statements: &[Statement]) -> Self {
        if statements.len() <= 1 {
            return Self::from_score(100.0, statements.len());
        }

        let (points, pairs) = statements
            .iter()
            .tuple_combinations()
            .fold((0u32, 0u32), |(points, pairs), (a, b)| {
                (points + PairAgreement::classify(a, b).points(), pairs + 1)
            });

        let score = 100.0 * f64::from(points) / (2.0 * f64::from(pairs));
        Self::from_score(score, statements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{KeywordAnalyzer, StatementAnalyzer};

    fn statements(texts: &[&str]) -> Vec<Statement> {
        texts.iter().map(|t| KeywordAnalyzer.analyze(t)).collect()
    }

    #[test]
    fn test_single_statement_scores_100() {
        let result = ConsensusResult::measure(&statements(&["Should not do anything"]));
        assert_eq!(result.score, 100.0);
        assert_eq!(result.level, ConsensusLevel::High);
        assert_eq!(result.agent_count, 1);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(ConsensusLevel::from_score(71.0), ConsensusLevel::High);
        assert_eq!(ConsensusLevel::from_score(70.0), ConsensusLevel::Medium);
        assert_eq!(ConsensusLevel::from_score(41.0), ConsensusLevel::Medium);
        assert_eq!(ConsensusLevel::from_score(40.0), ConsensusLevel::Low);
    }

    #[test]
    fn test_partial_agreement() {
        let s = statements(&[
            "Connection pooling database layer looks slow",
            "Database connection pooling layer needs review",
        ]);
        assert_eq!(PairAgreement::classify(&s[0], &s[1]), PairAgreement::Partial);
        assert_eq!(ConsensusResult::measure(&s).score, 50.0);
    }

    #[test]
    fn test_contradiction_scores_zero_despite_overlap() {
        let s = statements(&[
            "Should migrate the billing database schema",
            "Should not migrate the billing database schema",
        ]);
        assert_eq!(PairAgreement::classify(&s[0], &s[1]), PairAgreement::Disagreement);
        assert_eq!(ConsensusResult::measure(&s).score, 0.0);
    }

    #[test]
    fn test_mixed_three_agents() {
        let s = statements(&["Should cache", "Should cache", "Should not cache"]);
        // one agreeing pair out of three
        let result = ConsensusResult::measure(&s);
        assert!((result.score - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.level, ConsensusLevel::Low);
    }

    #[test]
    fn test_clamped() {
        assert_eq!(ConsensusResult::from_score(140.0, 2).score, 100.0);
        assert_eq!(ConsensusResult::from_score(-3.0, 2).score, 0.0);
    }
}
