use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recommended activity or practice pulled out of a tool result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Whatever else the tool reported for the item, kept verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl RecommendationItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            score: None,
            details: Value::Null,
        }
    }
}

/// Recommendations accumulated across the tool calls of one turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecommendations {
    #[serde(default)]
    pub activities: Vec<RecommendationItem>,
    #[serde(default)]
    pub practices: Vec<RecommendationItem>,
}

impl ExtractedRecommendations {
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty() && self.practices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len() + self.practices.len()
    }

    /// Fold `other` in by id. The first item seen for an id is kept; later
    /// duplicates are dropped, never overwritten.
    pub fn merge(&mut self, other: ExtractedRecommendations) {
        merge_by_id(&mut self.activities, other.activities);
        merge_by_id(&mut self.practices, other.practices);
    }
}

fn merge_by_id(target: &mut Vec<RecommendationItem>, incoming: Vec<RecommendationItem>) {
    for item in incoming {
        if !target.iter().any(|existing| existing.id == item.id) {
            target.push(item);
        }
    }
}
