use concierge_core::entity::EntityKind;
use concierge_core::recommendations::{ExtractedRecommendations, RecommendationItem};
use serde_json::Value;

/// Pulls recommended activities and practices out of a tool's raw output.
pub trait RecommendationExtractor: Send + Sync {
    fn extract(&self, tool_name: &str, output: &Value) -> ExtractedRecommendations;
}

/// Reads `activities[]` / `practices[]` arrays, or a `hits[]` array split
/// by each hit's `kind`. Items may be objects with an `id` or bare id
/// strings; anything else is skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRecommendationExtractor;

impl RecommendationExtractor for JsonRecommendationExtractor {
    fn extract(&self, _tool_name: &str, output: &Value) -> ExtractedRecommendations {
        let mut extracted = ExtractedRecommendations::default();
        let Some(object) = output.as_object() else {
            return extracted;
        };

        if let Some(items) = object.get("activities").and_then(Value::as_array) {
            extracted.activities.extend(items.iter().filter_map(item));
        }
        if let Some(items) = object.get("practices").and_then(Value::as_array) {
            extracted.practices.extend(items.iter().filter_map(item));
        }
        if let Some(hits) = object.get("hits").and_then(Value::as_array) {
            for hit in hits {
                let kind = hit
                    .get("kind")
                    .and_then(Value::as_str)
                    .and_then(|k| k.parse::<EntityKind>().ok());
                let target = match kind {
                    Some(EntityKind::Activity) => &mut extracted.activities,
                    Some(EntityKind::Practice) => &mut extracted.practices,
                    _ => continue,
                };
                target.extend(item(hit));
            }
        }

        // Dedupe within a single output, first-seen wins.
        let mut deduped = ExtractedRecommendations::default();
        deduped.merge(extracted);
        deduped
    }
}

fn item(value: &Value) -> Option<RecommendationItem> {
    match value {
        Value::String(id) if !id.is_empty() => Some(RecommendationItem::new(id.clone())),
        Value::Object(map) => {
            let id = map.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())?;
            Some(RecommendationItem {
                id: id.to_string(),
                name: map.get("name").and_then(Value::as_str).map(str::to_string),
                score: map
                    .get("score")
                    .or_else(|| map.get("fusedScore"))
                    .and_then(Value::as_f64),
                details: value.clone(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(output: Value) -> ExtractedRecommendations {
        JsonRecommendationExtractor.extract("t", &output)
    }

    #[test]
    fn reads_explicit_arrays() {
        let out = extract(json!({
            "activities": [{"id": "a1", "name": "Yoga", "score": 0.7}, "a2"],
            "practices": [{"id": "p1"}, {"name": "no id"}]
        }));
        assert_eq!(out.activities.len(), 2);
        assert_eq!(out.activities[0].name.as_deref(), Some("Yoga"));
        assert_eq!(out.activities[0].score, Some(0.7));
        assert_eq!(out.activities[1].id, "a2");
        assert_eq!(out.practices.len(), 1);
    }

    #[test]
    fn splits_hits_by_kind() {
        let out = extract(json!({"hits": [
            {"id": "p1", "kind": "practice", "fusedScore": 0.9},
            {"id": "a1", "kind": "activity", "fusedScore": 0.5},
            {"id": "u1", "kind": "practitioner", "fusedScore": 0.8},
            {"id": "p1", "kind": "practice", "fusedScore": 0.4}
        ]}));
        assert_eq!(out.practices.len(), 1);
        assert_eq!(out.practices[0].score, Some(0.9));
        assert_eq!(out.activities[0].id, "a1");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn non_object_output_yields_nothing() {
        assert!(extract(json!("[error] boom")).is_empty());
        assert!(extract(json!([{"id": "x"}])).is_empty());
    }

    #[test]
    fn two_results_merge_first_seen() {
        let mut acc = extract(json!({"practices": [{"id": "p1", "name": "first"}]}));
        acc.merge(extract(json!({"practices": [{"id": "p1", "name": "second"}, {"id": "p2"}]})));
        assert_eq!(acc.practices.len(), 2);
        assert_eq!(acc.practices[0].name.as_deref(), Some("first"));
    }
}
