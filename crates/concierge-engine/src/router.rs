//! Intent router: one handler per [`Intent`] variant.
//!
//! Handlers own the conversation state for the duration of the turn (`&mut`)
//! and return a [`Directive`] telling the orchestrator what kind of answer
//! the turn needs.

use std::sync::Arc;

use concierge_core::entity::{EntityKind, RankedEntity};
use concierge_core::state::{AssessmentUniverse, ConversationState, TurnLogEntry};
use concierge_search::{SearchOptions, SearchRouter, Taxonomy};
use concierge_settings::{AssessmentSettings, SearchSettings};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::assessment;
use crate::intent::Intent;
use crate::resolution::{self, Applied};

/// What the orchestrator should do with this turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Answer freely using the focused entities.
    Proceed,
    /// Ask the user to confirm a newly found entity.
    AskConfirmation { kind: EntityKind, entity: RankedEntity },
    /// Nothing matched; ask the user to rephrase.
    AskClarification { kind: EntityKind, designation: String },
    /// Ranked candidates to recommend from.
    Candidates {
        activities: Vec<RankedEntity>,
        practices: Vec<RankedEntity>,
    },
    /// Ask the next intake question.
    AssessmentQuestion {
        index: usize,
        question: String,
        total: usize,
    },
    /// The intake is over; recommend from the universe.
    AssessmentComplete { universe: AssessmentUniverse },
}

impl Directive {
    /// Whether the orchestrator may offer tools for this turn. Questions
    /// back to the user are answered directly.
    pub fn allows_tools(&self) -> bool {
        !matches!(
            self,
            Self::AskConfirmation { .. }
                | Self::AskClarification { .. }
                | Self::AssessmentQuestion { .. }
        )
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::AskConfirmation { .. } => "ask_confirmation",
            Self::AskClarification { .. } => "ask_clarification",
            Self::Candidates { .. } => "candidates",
            Self::AssessmentQuestion { .. } => "assessment_question",
            Self::AssessmentComplete { .. } => "assessment_complete",
        }
    }
}

#[derive(Clone)]
pub struct IntentRouter {
    search: SearchRouter,
    taxonomy: Arc<dyn Taxonomy>,
    search_settings: SearchSettings,
    assessment_settings: AssessmentSettings,
}

impl IntentRouter {
    pub fn new(
        search: SearchRouter,
        taxonomy: Arc<dyn Taxonomy>,
        search_settings: SearchSettings,
        assessment_settings: AssessmentSettings,
    ) -> Self {
        Self {
            search,
            taxonomy,
            search_settings,
            assessment_settings,
        }
    }

    #[instrument(skip_all, fields(intent = intent.tag(), conversation_id = %state.conversation_id))]
    pub async fn route(&self, intent: Intent, state: &mut ConversationState) -> Directive {
        let directive = match intent {
            Intent::Conversation => Directive::Proceed,
            Intent::Confirmation { kind } => self.confirm(kind, state),
            Intent::Practitioner { designation, id_hint } => {
                self.entity(EntityKind::Practitioner, designation, id_hint, state).await
            }
            Intent::Activity { designation, id_hint } => {
                self.entity(EntityKind::Activity, designation, id_hint, state).await
            }
            Intent::Practice { designation, id_hint } => {
                self.entity(EntityKind::Practice, designation, id_hint, state).await
            }
            Intent::Subject { designation } => self.subject(designation, state).await,
            Intent::Recommendation { fragments } => self.recommend(fragments, state).await,
            Intent::Assessment { answer, fragments } => self.assess(answer, fragments, state).await,
        };
        debug!(directive = directive.tag(), "routed");
        directive
    }

    fn confirm(&self, kind: Option<EntityKind>, state: &mut ConversationState) -> Directive {
        let target = match kind {
            Some(kind) => Some(kind),
            None => state.cache.pending_kinds().into_iter().next(),
        };
        match target.and_then(|kind| state.cache.promote(kind)) {
            Some(entity) => {
                debug!(kind = %entity.kind(), id = entity.id(), "pending entity confirmed");
            }
            None => debug!("confirmation with nothing pending"),
        }
        Directive::Proceed
    }

    async fn entity(
        &self,
        kind: EntityKind,
        designation: String,
        id_hint: Option<String>,
        state: &mut ConversationState,
    ) -> Directive {
        let resolution = resolution::resolve(
            &self.search,
            &state.cache,
            kind,
            &designation,
            id_hint.as_deref(),
            self.search_settings.resolution_min_score,
        )
        .await;
        match resolution::apply(&mut state.cache, resolution) {
            Applied::Focused(_) => Directive::Proceed,
            Applied::Pending(entity) => Directive::AskConfirmation { kind, entity },
            Applied::Unresolved => Directive::AskClarification { kind, designation },
        }
    }

    async fn subject(&self, designation: String, state: &mut ConversationState) -> Directive {
        let articles = resolution::lookup_subject(
            &self.search,
            &mut state.cache,
            &designation,
            self.search_settings.subject_top_k,
            self.search_settings.resolution_min_score,
        )
        .await;
        if articles.is_empty() {
            Directive::AskClarification {
                kind: EntityKind::Article,
                designation,
            }
        } else {
            Directive::Proceed
        }
    }

    async fn recommend(&self, fragments: Vec<String>, state: &mut ConversationState) -> Directive {
        let limit = self.search_settings.recommendation_limit;
        let opts = SearchOptions::top(limit).with_min_score(self.search_settings.recommendation_min_score);
        let (mut activities, mut practices) = tokio::join!(
            self.search.search_merged(EntityKind::Activity, &fragments, &opts),
            self.search.search_merged(EntityKind::Practice, &fragments, &opts),
        );
        activities.truncate(limit);
        practices.truncate(limit);

        for candidate in activities.iter().chain(practices.iter()) {
            state.cache.record_sighting(candidate.clone());
        }
        debug!(
            activities = activities.len(),
            practices = practices.len(),
            "recommendation candidates"
        );
        Directive::Candidates {
            activities,
            practices,
        }
    }

    async fn assess(
        &self,
        answer: String,
        fragments: Vec<String>,
        state: &mut ConversationState,
    ) -> Directive {
        let questions = &self.assessment_settings.questions;
        let universe = state.assessment.get_or_insert_with(|| {
            info!("assessment started");
            AssessmentUniverse::default()
        });

        let answer = answer.trim();
        if !answer.is_empty() && universe.next_question < questions.len() {
            let question = questions.get(universe.next_question).cloned();
            universe.turn_log.push(TurnLogEntry {
                question,
                answer: answer.to_string(),
            });
            let fresh = if fragments.is_empty() {
                assessment::split_fragments(answer)
            } else {
                fragments
            };
            // Repeats stay: each mention counts towards the match count.
            universe.fragments.extend(fresh);
            universe.next_question += 1;
            self.recompute(universe).await;
        }

        let index = universe.next_question;
        match questions.get(index) {
            Some(question) => Directive::AssessmentQuestion {
                index,
                question: question.clone(),
                total: questions.len(),
            },
            None => {
                let universe = state.assessment.take().unwrap_or_default();
                info!(
                    answers = universe.turn_log.len(),
                    families = universe.families.len(),
                    "assessment complete"
                );
                Directive::AssessmentComplete { universe }
            }
        }
    }

    async fn recompute(&self, universe: &mut AssessmentUniverse) {
        let computed = assessment::compute(
            &self.search,
            self.taxonomy.as_ref(),
            &universe.fragments,
            self.assessment_settings.min_score,
        )
        .await;
        assessment::absorb(universe, computed);
    }

    /// Recompute the running assessment universe on demand, before the
    /// final question. Returns `None` when no assessment is in progress.
    pub async fn compute_now<'a>(
        &self,
        state: &'a mut ConversationState,
    ) -> Option<&'a AssessmentUniverse> {
        let universe = state.assessment.as_mut()?;
        self.recompute(universe).await;
        Some(universe)
    }
}
