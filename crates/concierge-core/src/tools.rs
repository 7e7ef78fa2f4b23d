use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{EntityKind, RankedEntity};
use crate::ids::{ConversationId, ToolCallId};
use crate::state::EntityResolutionCache;

/// How the orchestrator treats a tool's result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolUsage {
    /// The result is extra context for the next model call.
    #[default]
    Context,
    /// The result is the answer; the next model call only frames it.
    Response,
}

/// Entities surfaced by tools during the current turn.
///
/// Shared by every tool call of the turn; the turn folds them into the
/// conversation cache once the answer is validated.
#[derive(Debug, Default)]
pub struct TurnSightings {
    entities: Mutex<BTreeMap<(EntityKind, String), RankedEntity>>,
}

impl TurnSightings {
    /// Later sightings of the same id replace earlier ones.
    pub fn record(&self, entities: impl IntoIterator<Item = RankedEntity>) {
        let mut seen = self.entities.lock();
        for entity in entities {
            seen.insert((entity.kind(), entity.id().to_string()), entity);
        }
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<RankedEntity> {
        self.entities.lock().get(&(kind, id.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    /// Drain everything recorded so far, ordered by kind then id.
    pub fn take(&self) -> Vec<RankedEntity> {
        std::mem::take(&mut *self.entities.lock()).into_values().collect()
    }
}

/// The conversation as seen by tools: a snapshot of the cache from before
/// the turn's tool calls, plus whatever those calls have surfaced since.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
    pub user_id: Option<String>,
    pub cache: Arc<EntityResolutionCache>,
    pub sightings: Arc<TurnSightings>,
}

impl ToolContext {
    pub fn new(conversation_id: ConversationId, cache: EntityResolutionCache) -> Self {
        Self {
            conversation_id,
            user_id: None,
            cache: Arc::new(cache),
            sightings: Arc::new(TurnSightings::default()),
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Cache first, then this turn's sightings.
    pub fn lookup(&self, kind: EntityKind, id: &str) -> Option<RankedEntity> {
        self.cache
            .get(kind, id)
            .cloned()
            .or_else(|| self.sightings.get(kind, id))
    }
}

/// Tool definition sent to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub usage: ToolUsage,
}

/// Trait implemented by each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    fn usage(&self) -> ToolUsage {
        ToolUsage::Context
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
            usage: self.usage(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

/// The outcome of one tool call, consumed once by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationResult {
    pub tool_name: String,
    pub call_id: ToolCallId,
    pub raw_output: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolInvocationResult {
    pub fn ok(tool_name: impl Into<String>, call_id: ToolCallId, raw_output: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id,
            raw_output,
            is_error: false,
        }
    }

    /// A failed call, carried as an error string so sibling calls are unaffected.
    pub fn error(tool_name: impl Into<String>, call_id: ToolCallId, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id,
            raw_output: Value::String(format!("[error] {}", message.into())),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SearchHit;

    #[test]
    fn usage_serde() {
        assert_eq!(serde_json::to_string(&ToolUsage::Response).unwrap(), r#""response""#);
        assert_eq!(ToolUsage::default(), ToolUsage::Context);
    }

    #[test]
    fn error_result_is_prefixed_string() {
        let r = ToolInvocationResult::error("search_practices", ToolCallId::from_raw("t1"), "boom");
        assert!(r.is_error);
        assert_eq!(r.raw_output, Value::String("[error] boom".into()));
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments("missing query".into());
        assert_eq!(err.to_string(), "invalid arguments: missing query");
        assert!(ToolError::Timeout(Duration::from_secs(20)).to_string().contains("20"));
    }

    #[test]
    fn lookup_falls_back_to_sightings() {
        let mut cache = EntityResolutionCache::default();
        cache.record(RankedEntity::from_hit(SearchHit::new("p1", EntityKind::Practice, 0.9)));
        let ctx = ToolContext::new(ConversationId::new(), cache);
        assert!(ctx.lookup(EntityKind::Practice, "p9").is_none());

        let shared = ctx.clone();
        shared.sightings.record([RankedEntity::from_hit(
            SearchHit::new("p9", EntityKind::Practice, 0.7).with_name("Sleep hygiene"),
        )]);
        assert_eq!(ctx.lookup(EntityKind::Practice, "p9").unwrap().label(), "Sleep hygiene");
        assert!(ctx.lookup(EntityKind::Practice, "p1").is_some());
        assert!(ctx.lookup(EntityKind::Activity, "p9").is_none());
    }

    #[test]
    fn sightings_keep_latest_and_drain() {
        let sightings = TurnSightings::default();
        sightings.record([
            RankedEntity::from_hit(SearchHit::new("p2", EntityKind::Practice, 0.4)),
            RankedEntity::from_hit(SearchHit::new("a1", EntityKind::Activity, 0.5)),
        ]);
        sightings.record([RankedEntity::from_hit(SearchHit::new("p2", EntityKind::Practice, 0.8))]);
        assert_eq!(sightings.len(), 2);

        let drained = sightings.take();
        assert_eq!(drained[0].id(), "a1");
        assert_eq!(drained[1].fused_score(), 0.8);
        assert!(sightings.is_empty());
    }
}
