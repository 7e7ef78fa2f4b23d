//! Intent classification.
//!
//! The intent set is closed, so it is an enum and the router matches on it.
//! The default classifier asks the text-generation backend to fill in the
//! intent schema and parses the JSON it returns.

use std::sync::Arc;

use async_trait::async_trait;
use concierge_core::entity::EntityKind;
use concierge_core::generation::{
    GenerationRequest, OutputSchema, PromptContext, SectionLabel, TextGenerator,
};
use concierge_core::state::ConversationState;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::EngineError;

/// What the latest utterance is asking for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Small talk or anything that needs no lookup.
    Conversation,
    /// The user confirms a pending entity. `kind` narrows which one.
    Confirmation {
        #[serde(default)]
        kind: Option<EntityKind>,
    },
    Practitioner {
        designation: String,
        #[serde(default, rename = "idHint")]
        id_hint: Option<String>,
    },
    Activity {
        designation: String,
        #[serde(default, rename = "idHint")]
        id_hint: Option<String>,
    },
    Practice {
        designation: String,
        #[serde(default, rename = "idHint")]
        id_hint: Option<String>,
    },
    /// A knowledge-base question.
    Subject { designation: String },
    /// A request for suggestions, with the query fragments to search.
    Recommendation {
        #[serde(default)]
        fragments: Vec<String>,
    },
    /// Start of, or an answer within, the intake questionnaire.
    Assessment {
        #[serde(default)]
        answer: String,
        #[serde(default)]
        fragments: Vec<String>,
    },
}

impl Intent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Confirmation { .. } => "confirmation",
            Self::Practitioner { .. } => "practitioner",
            Self::Activity { .. } => "activity",
            Self::Practice { .. } => "practice",
            Self::Subject { .. } => "subject",
            Self::Recommendation { .. } => "recommendation",
            Self::Assessment { .. } => "assessment",
        }
    }
}

/// A classified intent plus the backend usage it cost.
#[derive(Clone, Debug, PartialEq)]
pub struct Classified {
    pub intent: Intent,
    pub usage: u64,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        utterance: &str,
        state: &ConversationState,
    ) -> Result<Classified, EngineError>;
}

/// JSON schema the backend fills in to classify a turn.
pub fn intent_schema() -> OutputSchema {
    OutputSchema::new(
        "intent",
        json!({
            "type": "object",
            "required": ["intent"],
            "properties": {
                "intent": {
                    "type": "string",
                    "enum": [
                        "conversation", "confirmation", "practitioner", "activity",
                        "practice", "subject", "recommendation", "assessment"
                    ]
                },
                "kind": {"type": "string", "enum": ["practitioner", "activity", "practice"]},
                "designation": {"type": "string"},
                "idHint": {"type": "string"},
                "answer": {"type": "string"},
                "fragments": {"type": "array", "items": {"type": "string"}}
            }
        }),
    )
}

/// Classifies through the text-generation backend.
pub struct GenerativeIntentClassifier {
    generator: Arc<dyn TextGenerator>,
    transcript_turns: usize,
}

impl GenerativeIntentClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            transcript_turns: 4,
        }
    }

    pub fn with_transcript_turns(mut self, turns: usize) -> Self {
        self.transcript_turns = turns;
        self
    }

    fn context(&self, utterance: &str, state: &ConversationState) -> PromptContext {
        let recent = state
            .transcript
            .iter()
            .rev()
            .take(self.transcript_turns)
            .rev()
            .collect::<Vec<_>>();
        let pending: Vec<_> = state
            .cache
            .pending_kinds()
            .into_iter()
            .filter_map(|kind| state.cache.pending(kind))
            .map(|e| json!({"kind": e.kind(), "id": e.id(), "name": e.label()}))
            .collect();

        let mut context = PromptContext::empty()
            .with_section(SectionLabel::Utterance, json!(utterance))
            .with_section(SectionLabel::Transcript, json!(recent));
        if !pending.is_empty() {
            context.push(SectionLabel::Custom("pending_confirmation".into()), json!(pending));
        }
        if let Some(universe) = &state.assessment {
            context.push(
                SectionLabel::Assessment,
                json!({"active": true, "answered": universe.turn_log.len()}),
            );
        }
        context
    }
}

#[async_trait]
impl IntentClassifier for GenerativeIntentClassifier {
    #[instrument(skip_all, fields(conversation_id = %state.conversation_id))]
    async fn classify(
        &self,
        utterance: &str,
        state: &ConversationState,
    ) -> Result<Classified, EngineError> {
        let request = GenerationRequest {
            context: self.context(utterance, state),
            schema: intent_schema(),
            tools: Vec::new(),
            prior_call_id: None,
        };
        let generation = self.generator.complete(&request).await?;
        if generation.requests_tools() {
            warn!(
                count = generation.tool_calls.len(),
                "classifier returned tool calls, ignoring"
            );
        }
        let intent: Intent = serde_json::from_value(generation.text.clone())
            .map_err(|e| EngineError::Classification(format!("{e}: {}", generation.text)))?;
        debug!(intent = intent.tag(), usage = generation.usage, "intent classified");
        Ok(Classified {
            intent,
            usage: generation.usage,
        })
    }
}
