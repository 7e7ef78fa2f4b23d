//! Turn processing: load → classify → route → orchestrate → save.
//!
//! Entities the tools surfaced during the turn are recorded as seen just
//! before the save.
//!
//! Every `?` in [`TurnProcessor::process_turn`] returns before the save, so
//! a failed turn leaves the state from the last successful turn in place.

use std::sync::Arc;

use concierge_core::generation::TextGenerator;
use concierge_core::ids::ConversationId;
use concierge_core::recommendations::ExtractedRecommendations;
use concierge_core::state::ConversationState;
use concierge_core::tools::ToolContext;
use concierge_llm::DeadlineGenerator;
use concierge_search::{SearchRouter, Taxonomy};
use concierge_settings::ConciergeSettings;
use concierge_store::ConversationStore;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::EngineError;
use crate::intent::{GenerativeIntentClassifier, IntentClassifier};
use crate::orchestrator::{
    OrchestrationRequest, Orchestrator, OrchestratorConfig, RecommendationExtractor, ResponseValidator,
};
use crate::prompt;
use crate::registry::ToolRegistry;
use crate::router::{Directive, IntentRouter};
use crate::tools::builtin_registry;

/// Result of one successfully processed turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub response_text: String,
    pub response: Value,
    pub recommendations: ExtractedRecommendations,
    /// Classifier usage plus every orchestrator model call.
    pub accumulated_cost: u64,
    pub directive: Directive,
    /// The state as saved.
    pub state: ConversationState,
}

pub struct TurnProcessor {
    store: Arc<dyn ConversationStore>,
    classifier: Arc<dyn IntentClassifier>,
    router: IntentRouter,
    orchestrator: Orchestrator,
    settings: ConciergeSettings,
}

impl TurnProcessor {
    /// Wire the engine from its collaborators. The generator is wrapped in
    /// the configured model deadline and the search router gets the
    /// configured search deadline.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn TextGenerator>,
        search: SearchRouter,
        taxonomy: Arc<dyn Taxonomy>,
        settings: ConciergeSettings,
    ) -> Self {
        let generator: Arc<dyn TextGenerator> = Arc::new(DeadlineGenerator::new(
            generator,
            settings.orchestrator.model_timeout(),
        ));
        let search = search.with_timeout(settings.search.timeout());
        let registry = Arc::new(builtin_registry(&search, &settings.search));
        let classifier = GenerativeIntentClassifier::new(Arc::clone(&generator))
            .with_transcript_turns(settings.conversation.transcript_turns.min(4));
        let router = IntentRouter::new(
            search,
            taxonomy,
            settings.search.clone(),
            settings.assessment.clone(),
        );
        let orchestrator = Orchestrator::new(
            generator,
            registry,
            OrchestratorConfig::from(&settings.orchestrator),
        );
        Self {
            store,
            classifier: Arc::new(classifier),
            router,
            orchestrator,
            settings,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
        self.orchestrator = self.orchestrator.with_validator(validator);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn RecommendationExtractor>) -> Self {
        self.orchestrator = self.orchestrator.with_extractor(extractor);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.orchestrator.registry()
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn process_turn(
        &self,
        conversation_id: &ConversationId,
        utterance: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let mut state = match self.store.load(conversation_id).await? {
            Some(state) => state,
            None => {
                debug!("starting new conversation");
                ConversationState::new(conversation_id.clone())
            }
        };

        let classified = self.classifier.classify(utterance, &state).await?;
        let directive = self.router.route(classified.intent, &mut state).await;
        state.cache.check_invariants().map_err(EngineError::InvalidState)?;

        let tool_context = ToolContext::new(conversation_id.clone(), state.cache.clone())
            .with_user(state.user_id.clone());
        let sightings = Arc::clone(&tool_context.sightings);
        let request = OrchestrationRequest {
            context: prompt::build_context(
                utterance,
                &state,
                &directive,
                self.settings.conversation.transcript_turns,
            ),
            schema: prompt::reply_schema(),
            response_schema: prompt::recommendation_schema(),
            recursion_allowed: directive.allows_tools(),
            tool_context,
        };
        let outcome = self.orchestrator.run(request).await?;
        let accumulated_cost = classified.usage + outcome.accumulated_cost;

        let sighted = sightings.take();
        if !sighted.is_empty() {
            debug!(entities = sighted.len(), "recording tool sightings");
        }
        for entity in sighted {
            state.cache.record_sighting(entity);
        }

        state.last_recommendations = outcome.extracted_recommendations.clone();
        state.push_transcript(
            utterance,
            outcome.response_text.clone(),
            self.settings.conversation.transcript_turns,
        );
        state.turn_count += 1;
        self.store.save(conversation_id, &state).await?;

        info!(
            directive = directive.tag(),
            cost = accumulated_cost,
            model_calls = outcome.model_calls + 1,
            recommendations = state.last_recommendations.len(),
            turn = state.turn_count,
            "turn complete"
        );
        Ok(TurnOutcome {
            response_text: outcome.response_text,
            response: outcome.response,
            recommendations: outcome.extracted_recommendations,
            accumulated_cost,
            directive,
            state,
        })
    }
}
