use async_trait::async_trait;
use concierge_core::entity::EntityKind;
use concierge_core::tools::{Tool, ToolContext, ToolError, ToolUsage};
use serde_json::{json, Value};

/// The backend's way of committing to a final set of recommendations.
///
/// Ids are resolved against the entities this conversation has already
/// seen, including this turn's search results; ids it has never seen come
/// back under `unresolved` so the framing answer cannot invent entities.
pub struct PresentRecommendationsTool;

impl PresentRecommendationsTool {
    pub const NAME: &'static str = "present_recommendations";
}

fn ids(args: &Value, key: &str) -> Result<Vec<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()),
        Some(_) => Err(ToolError::InvalidArguments(format!("`{key}` must be an array of ids"))),
    }
}

#[async_trait]
impl Tool for PresentRecommendationsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Present the chosen activities and practices to the user. Use only ids returned by earlier searches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "activityIds": {"type": "array", "items": {"type": "string"}},
                "practiceIds": {"type": "array", "items": {"type": "string"}},
                "message": {"type": "string"}
            }
        })
    }

    fn usage(&self) -> ToolUsage {
        ToolUsage::Response
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let activity_ids = ids(&args, "activityIds")?;
        let practice_ids = ids(&args, "practiceIds")?;
        if activity_ids.is_empty() && practice_ids.is_empty() {
            return Err(ToolError::InvalidArguments(
                "at least one of `activityIds` or `practiceIds` is required".into(),
            ));
        }

        let mut unresolved = Vec::new();
        let mut resolve = |kind: EntityKind, ids: Vec<String>| -> Vec<Value> {
            let mut found = Vec::new();
            for id in ids {
                match ctx.lookup(kind, &id) {
                    Some(e) => found.push(json!({
                        "id": e.id(),
                        "name": e.label(),
                        "score": e.fused_score(),
                    })),
                    None => unresolved.push(json!({"kind": kind, "id": id})),
                }
            }
            found
        };
        let activities = resolve(EntityKind::Activity, activity_ids);
        let practices = resolve(EntityKind::Practice, practice_ids);

        Ok(json!({
            "activities": activities,
            "practices": practices,
            "unresolved": unresolved,
            "message": args.get("message").cloned().unwrap_or(Value::Null),
        }))
    }
}
