//! Expert registry - the read-only set of experts known to this process

use conclave_core::{Expert, ExpertId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ExpertRegistry {
    experts: HashMap<ExpertId, Expert>,
}

impl ExpertRegistry {
    pub fn new(experts: impl IntoIterator<Item = Expert>) -> Self {
        Self {
            experts: experts.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn get(&self, id: &ExpertId) -> Option<&Expert> {
        self.experts.get(id)
    }

    pub fn contains(&self, id: &ExpertId) -> bool {
        self.experts.contains_key(id)
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<ExpertId> {
        let mut ids: Vec<_> = self.experts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn with_specialty(&self, tag: &str) -> Vec<&Expert> {
        let mut experts: Vec<_> = self
            .experts
            .values()
            .filter(|e| e.has_specialty(tag))
            .collect();
        experts.sort_by(|a, b| a.id.cmp(&b.id));
        experts
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = ExpertRegistry::new([
            Expert::new("security", "local://security").with_specialty("auth"),
            Expert::new("architecture", "local://architecture"),
        ]);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&"security".into()));
        assert!(registry.get(&"performance".into()).is_none());
        assert_eq!(registry.ids()[0].as_str(), "architecture");
        assert_eq!(registry.with_specialty("AUTH").len(), 1);
    }
}
