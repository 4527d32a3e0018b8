//! Expert recommendations submitted for resolution

use serde::{Deserialize, Serialize};

use crate::error::{check_confidence, CoreError, Result};
use crate::expert::ExpertId;

/// One expert's output: a recommendation, a confidence and its rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecommendation {
    #[serde(alias = "expertType")]
    pub expert: ExpertId,
    pub recommendation: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

impl AgentRecommendation {
    pub fn new(expert: impl Into<ExpertId>, recommendation: impl Into<String>, confidence: f64) -> Self {
        Self {
            expert: expert.into(),
            recommendation: recommendation.into(),
            confidence,
            rationale: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.expert.is_blank() {
            return Err(CoreError::MissingField("expert"));
        }
        check_confidence(self.expert.as_str(), self.confidence)
    }
}
