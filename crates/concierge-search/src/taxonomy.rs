use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The taxonomy family a practice belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FamilyRef {
    pub id: String,
    pub name: String,
}

impl FamilyRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Maps practices to their family. Practices without a family are skipped
/// during dominance aggregation.
pub trait Taxonomy: Send + Sync {
    fn family_of(&self, practice_id: &str) -> Option<FamilyRef>;
}

/// In-memory taxonomy, typically loaded once from a JSON export.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticTaxonomy {
    families: HashMap<String, FamilyRef>,
}

impl StaticTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, practice_id: impl Into<String>, family: FamilyRef) {
        self.families.insert(practice_id.into(), family);
    }

    pub fn with(mut self, practice_id: impl Into<String>, family: FamilyRef) -> Self {
        self.insert(practice_id, family);
        self
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Taxonomy for StaticTaxonomy {
    fn family_of(&self, practice_id: &str) -> Option<FamilyRef> {
        self.families.get(practice_id).cloned()
    }
}
