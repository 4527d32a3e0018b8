//! Statement analysis for expert recommendations
//!
//! Turns free-text recommendations into a [`Statement`]: the stance the expert
//! takes (affirm / negate), the subject of that stance, and the set of
//! significant tokens in the whole text. Consensus scoring and conflict
//! detection only look at statements, so the analyzer can be swapped for a
//! semantic implementation through the [`StatementAnalyzer`] trait.
//!
//! [`KeywordAnalyzer`] is a modal-verb heuristic: "should", "must" and
//! "recommend" affirm; "should not", "must not", "not recommend" (and the
//! contracted forms) negate. Subjects match when they share a stemmed token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stance taken by a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Affirm,
    Negate,
}

/// Analyzed form of one recommendation text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    /// `None` when the text carries no recognizable stance
    pub polarity: Option<Polarity>,
    /// Significant tokens following the stance phrase
    pub subject: BTreeSet<String>,
    /// Significant tokens of the whole text
    pub tokens: BTreeSet<String>,
}

impl Statement {
    /// Two subjects match when both are empty or they share a token
    pub fn same_subject(&self, other: &Statement) -> bool {
        if self.subject.is_empty() && other.subject.is_empty() {
            return true;
        }
        !self.subject.is_disjoint(&other.subject)
    }

    /// Both affirm, or both negate, the same subject
    pub fn agrees_with(&self, other: &Statement) -> bool {
        matches!((self.polarity, other.polarity), (Some(a), Some(b)) if a == b)
            && self.same_subject(other)
    }

    /// One affirms what the other negates
    pub fn contradicts(&self, other: &Statement) -> bool {
        matches!((self.polarity, other.polarity), (Some(a), Some(b)) if a != b)
            && self.same_subject(other)
    }

    pub fn shared_tokens(&self, other: &Statement) -> usize {
        self.tokens.intersection(&other.tokens).count()
    }
}

/// Converts recommendation text into a [`Statement`]
pub trait StatementAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Statement;
}

/// Keyword / negation heuristic analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

const MODAL_VERBS: &[&str] = &["should", "must"];
const RECOMMEND_FORMS: &[&str] = &["recommend", "recommends", "recommended", "recommending"];
const NEGATIONS: &[&str] = &["not", "never"];
const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "at", "be", "been", "by", "did", "do", "does",
    "for", "from", "i", "in", "into", "is", "it", "its", "of", "on", "or", "our", "so", "than",
    "that", "the", "their", "then", "these", "they", "this", "those", "to", "use", "using", "we",
    "with", "you", "your",
];

impl StatementAnalyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Statement {
        let words = tokenize(text);

        let (polarity, subject_start) = match find_stance(&words) {
            Some((polarity, start)) => (Some(polarity), start),
            None => (None, words.len()),
        };

        let subject = words[subject_start.min(words.len())..]
            .iter()
            .filter_map(|w| significant(w))
            .collect();
        let tokens = words.iter().filter_map(|w| significant(w)).collect();

        Statement {
            polarity,
            subject,
            tokens,
        }
    }
}

/// Lowercase, split on punctuation and expand `n't` contractions
fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    let mut words = Vec::new();

    for raw in lowered.split(|c: char| !(c.is_alphanumeric() || c == '\'')) {
        let word = raw.trim_matches('\'');
        if word.is_empty() {
            continue;
        }
        match word.strip_suffix("n't") {
            Some(stem) => {
                let base = match stem {
                    "ca" => "can",
                    "wo" => "will",
                    "sha" => "shall",
                    other => other,
                };
                words.push(base.to_string());
                words.push("not".to_string());
            }
            None => words.push(word.to_string()),
        }
    }

    words
}

/// Locate the first stance phrase; returns its polarity and where the subject begins
fn find_stance(words: &[String]) -> Option<(Polarity, usize)> {
    for (i, word) in words.iter().enumerate() {
        let word = word.as_str();

        if MODAL_VERBS.contains(&word) {
            let negated = words
                .get(i + 1)
                .is_some_and(|next| NEGATIONS.contains(&next.as_str()));
            return Some(if negated {
                (Polarity::Negate, i + 2)
            } else {
                (Polarity::Affirm, i + 1)
            });
        }

        if RECOMMEND_FORMS.contains(&word) {
            let preceded_by_negation = i > 0 && NEGATIONS.contains(&words[i - 1].as_str());
            let against = words.get(i + 1).is_some_and(|next| next == "against");
            let start = if against { i + 2 } else { i + 1 };
            let polarity = if preceded_by_negation || against {
                Polarity::Negate
            } else {
                Polarity::Affirm
            };
            return Some((polarity, start));
        }
    }
    None
}

fn significant(word: &str) -> Option<String> {
    if STOPWORDS.contains(&word)
        || MODAL_VERBS.contains(&word)
        || RECOMMEND_FORMS.contains(&word)
        || NEGATIONS.contains(&word)
        || word == "against"
    {
        return None;
    }
    Some(stem(word))
}

/// Crude suffix stripping so "caching", "caches" and "cache" compare equal
fn stem(word: &str) -> String {
    let mut w = word;
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(base) = w.strip_suffix(suffix) {
            if base.len() >= 3 && !(suffix == "s" && base.ends_with('s')) {
                w = base;
                break;
            }
        }
    }
    if w.len() > 3 {
        w = w.strip_suffix('e').unwrap_or(w);
    }
    w.to_string()
}
