//! Expert identities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique expert identifier (e.g. `"security"`, `"architecture"`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpertId(pub String);

impl ExpertId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids that are empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ExpertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExpertId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExpertId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A registered reasoning expert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expert {
    pub id: ExpertId,

    /// Specialty tags (e.g. `["auth", "crypto"]`)
    #[serde(default)]
    pub specialties: Vec<String>,

    /// Endpoint reference. `local://` endpoints are served in-process.
    pub endpoint: String,
}

impl Expert {
    pub fn new(id: impl Into<ExpertId>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            specialties: Vec::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn with_specialty(mut self, tag: impl Into<String>) -> Self {
        self.specialties.push(tag.into());
        self
    }

    pub fn is_local(&self) -> bool {
        self.endpoint.starts_with("local://")
    }

    pub fn has_specialty(&self, tag: &str) -> bool {
        self.specialties.iter().any(|s| s.eq_ignore_ascii_case(tag))
    }
}
