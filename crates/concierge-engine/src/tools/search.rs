use async_trait::async_trait;
use concierge_core::entity::{EntityKind, RankedEntity};
use concierge_core::tools::{Tool, ToolContext, ToolError};
use concierge_search::{SearchOptions, SearchRouter};
use serde_json::{json, Value};

/// Hybrid search over one entity kind, exposed to the backend as a tool.
pub struct SearchTool {
    kind: EntityKind,
    name: String,
    description: String,
    search: SearchRouter,
    default_limit: usize,
    min_score: f64,
}

impl SearchTool {
    pub fn new(kind: EntityKind, search: SearchRouter, default_limit: usize, min_score: f64) -> Self {
        let plural = match kind {
            EntityKind::Activity => "activities",
            EntityKind::Practice => "practices",
            EntityKind::Practitioner => "practitioners",
            EntityKind::Article => "articles",
        };
        Self {
            kind,
            name: format!("search_{plural}"),
            description: format!(
                "Search {plural} by free text. Pass one `query` or several `queries`; \
                 results matched by more queries rank higher."
            ),
            search,
            default_limit,
            min_score,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn queries(args: &Value) -> Result<Vec<String>, ToolError> {
        let mut queries: Vec<String> = Vec::new();
        if let Some(q) = args.get("query").and_then(Value::as_str) {
            queries.push(q.to_string());
        }
        if let Some(list) = args.get("queries").and_then(Value::as_array) {
            queries.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
        }
        queries.retain(|q| !q.trim().is_empty());
        if queries.is_empty() {
            return Err(ToolError::InvalidArguments(
                "`query` or a non-empty `queries` array is required".into(),
            ));
        }
        Ok(queries)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "queries": {"type": "array", "items": {"type": "string"}},
                "limit": {"type": "integer", "minimum": 1}
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let queries = Self::queries(&args)?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.default_limit);
        let opts = SearchOptions::top(limit).with_min_score(self.min_score);

        let mut hits = if let [query] = queries.as_slice() {
            self.search
                .search(self.kind, query, &opts)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
                .into_iter()
                .map(|hit| RankedEntity::from_hit(hit.with_fragment(query.clone())))
                .collect()
        } else {
            self.search.search_merged(self.kind, &queries, &opts).await
        };
        hits.truncate(limit);
        ctx.sightings.record(hits.iter().cloned());

        serde_json::to_value(&hits)
            .map(|hits| json!({"hits": hits}))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use concierge_core::entity::SearchHit;
    use concierge_core::ids::ConversationId;
    use concierge_core::state::EntityResolutionCache;
    use concierge_search::testing::ScriptedSearchBackend;

    fn ctx() -> ToolContext {
        ToolContext::new(ConversationId::new(), EntityResolutionCache::default())
    }

    fn tool(backend: ScriptedSearchBackend) -> SearchTool {
        let router = SearchRouter::new().with_backend(Arc::new(backend));
        SearchTool::new(EntityKind::Practice, router, 2, 0.3)
    }

    #[test]
    fn named_by_kind() {
        let router = SearchRouter::new();
        assert_eq!(SearchTool::new(EntityKind::Activity, router.clone(), 5, 0.3).name(), "search_activities");
        assert_eq!(SearchTool::new(EntityKind::Article, router, 5, 0.3).name(), "search_articles");
    }

    #[tokio::test]
    async fn single_query_returns_ranked_hits() {
        let tool = tool(ScriptedSearchBackend::new(EntityKind::Practice).with_default(vec![
            SearchHit::new("p1", EntityKind::Practice, 0.9).with_name("Breathwork"),
            SearchHit::new("p2", EntityKind::Practice, 0.8),
            SearchHit::new("p3", EntityKind::Practice, 0.7),
            SearchHit::new("p4", EntityKind::Practice, 0.1),
        ]));
        let out = tool.execute(json!({"query": "stress"}), &ctx()).await.unwrap();
        let hits = out["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["id"], "p1");
        assert_eq!(hits[0]["kind"], "practice");
        assert_eq!(hits[0]["matchCount"], 1);
    }

    #[tokio::test]
    async fn returned_hits_are_recorded_as_sightings() {
        let tool = tool(ScriptedSearchBackend::new(EntityKind::Practice).with_default(vec![
            SearchHit::new("p1", EntityKind::Practice, 0.9),
            SearchHit::new("p2", EntityKind::Practice, 0.8),
            SearchHit::new("p3", EntityKind::Practice, 0.7),
        ]));
        let ctx = ctx();
        tool.execute(json!({"query": "sleep"}), &ctx).await.unwrap();

        assert_eq!(ctx.sightings.len(), 2);
        assert!(ctx.lookup(EntityKind::Practice, "p2").is_some());
        assert!(ctx.lookup(EntityKind::Practice, "p3").is_none());
    }

    #[tokio::test]
    async fn multiple_queries_merge() {
        let tool = tool(
            ScriptedSearchBackend::new(EntityKind::Practice)
                .with_response("tired", vec![SearchHit::new("p2", EntityKind::Practice, 0.95)])
                .with_default(vec![SearchHit::new("p1", EntityKind::Practice, 0.8)]),
        );
        let out = tool
            .execute(json!({"queries": ["sleep", "rest", "tired"], "limit": 5}), &ctx())
            .await
            .unwrap();
        let hits = out["hits"].as_array().unwrap();
        assert_eq!(hits[0]["id"], "p1");
        assert_eq!(hits[0]["matchCount"], 2);
        assert_eq!(hits[1]["id"], "p2");
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let tool = tool(ScriptedSearchBackend::new(EntityKind::Practice));
        let err = tool.execute(json!({"queries": ["  "]}), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn backend_failure_is_tool_error() {
        let tool = tool(ScriptedSearchBackend::new(EntityKind::Practice).with_failure("boom"));
        let err = tool.execute(json!({"query": "boom"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }
}
