//! Per-conversation state carried between turns.
//!
//! The engine never holds this behind a global: a [`ConversationState`] is
//! loaded from the conversation store at turn start, threaded by `&mut`
//! through the router handlers, and saved back only when the turn succeeds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, RankedEntity};
use crate::ids::ConversationId;
use crate::recommendations::ExtractedRecommendations;

pub const STATE_VERSION: u32 = 1;

/// Fixed order in which pending entities are promoted when a confirmation
/// does not name a kind.
pub const CONFIRMATION_PRECEDENCE: [EntityKind; 3] = [
    EntityKind::Practitioner,
    EntityKind::Activity,
    EntityKind::Practice,
];

/// Cross-turn memory of every entity seen so far, plus the confirmed
/// ("focused") and awaiting-confirmation ("pending") entity per kind.
///
/// Invariants:
/// - a focused entity is always present in the keyed map of its kind;
/// - a pending entity is never present in the keyed map of its kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityResolutionCache {
    /// Keyed by practitioner user id.
    pub practitioners: BTreeMap<String, RankedEntity>,
    pub activities: BTreeMap<String, RankedEntity>,
    pub practices: BTreeMap<String, RankedEntity>,
    pub articles: BTreeMap<String, RankedEntity>,

    pub focused_practitioner: Option<RankedEntity>,
    pub focused_activity: Option<RankedEntity>,
    pub focused_practice: Option<RankedEntity>,
    pub focused_articles: Vec<RankedEntity>,

    pub pending_practitioner: Option<RankedEntity>,
    pub pending_activity: Option<RankedEntity>,
    pub pending_practice: Option<RankedEntity>,
}

impl EntityResolutionCache {
    pub fn keyed(&self, kind: EntityKind) -> &BTreeMap<String, RankedEntity> {
        match kind {
            EntityKind::Practitioner => &self.practitioners,
            EntityKind::Activity => &self.activities,
            EntityKind::Practice => &self.practices,
            EntityKind::Article => &self.articles,
        }
    }

    fn keyed_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<String, RankedEntity> {
        match kind {
            EntityKind::Practitioner => &mut self.practitioners,
            EntityKind::Activity => &mut self.activities,
            EntityKind::Practice => &mut self.practices,
            EntityKind::Article => &mut self.articles,
        }
    }

    fn focused_slot_mut(&mut self, kind: EntityKind) -> Option<&mut Option<RankedEntity>> {
        match kind {
            EntityKind::Practitioner => Some(&mut self.focused_practitioner),
            EntityKind::Activity => Some(&mut self.focused_activity),
            EntityKind::Practice => Some(&mut self.focused_practice),
            EntityKind::Article => None,
        }
    }

    fn pending_slot_mut(&mut self, kind: EntityKind) -> Option<&mut Option<RankedEntity>> {
        match kind {
            EntityKind::Practitioner => Some(&mut self.pending_practitioner),
            EntityKind::Activity => Some(&mut self.pending_activity),
            EntityKind::Practice => Some(&mut self.pending_practice),
            EntityKind::Article => None,
        }
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.keyed(kind).contains_key(id)
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&RankedEntity> {
        self.keyed(kind).get(id)
    }

    /// Record an entity as seen. A later sighting replaces the earlier one.
    /// A pending entity with the same id stops being pending: it is known now.
    pub fn record(&mut self, entity: RankedEntity) {
        let kind = entity.kind();
        let id = entity.id().to_string();
        if let Some(pending) = self.pending_slot_mut(kind) {
            if pending.as_ref().is_some_and(|p| p.id() == id) {
                *pending = None;
            }
        }
        self.keyed_mut(kind).insert(id, entity);
    }

    /// Record a search sighting. Returns false and leaves the cache alone
    /// when the entity is the pending one of its kind: being found again is
    /// not a confirmation.
    pub fn record_sighting(&mut self, entity: RankedEntity) -> bool {
        if self.pending(entity.kind()).is_some_and(|p| p.id() == entity.id()) {
            return false;
        }
        self.record(entity);
        true
    }

    pub fn focused(&self, kind: EntityKind) -> Option<&RankedEntity> {
        match kind {
            EntityKind::Practitioner => self.focused_practitioner.as_ref(),
            EntityKind::Activity => self.focused_activity.as_ref(),
            EntityKind::Practice => self.focused_practice.as_ref(),
            EntityKind::Article => self.focused_articles.first(),
        }
    }

    pub fn pending(&self, kind: EntityKind) -> Option<&RankedEntity> {
        match kind {
            EntityKind::Practitioner => self.pending_practitioner.as_ref(),
            EntityKind::Activity => self.pending_activity.as_ref(),
            EntityKind::Practice => self.pending_practice.as_ref(),
            EntityKind::Article => None,
        }
    }

    /// Make `entity` the current subject for its kind, overwriting any
    /// previous focus. The entity is recorded in the keyed map as well.
    ///
    /// Articles have no single focus slot; focusing one replaces the focused
    /// article list with just that article.
    pub fn focus(&mut self, entity: RankedEntity) {
        let kind = entity.kind();
        self.record(entity.clone());
        match self.focused_slot_mut(kind) {
            Some(slot) => *slot = Some(entity),
            None => self.focused_articles = vec![entity],
        }
    }

    /// Replace the focused article list. Every article is recorded as seen.
    pub fn focus_articles(&mut self, articles: Vec<RankedEntity>) {
        for article in &articles {
            self.record(article.clone());
        }
        self.focused_articles = articles;
    }

    /// Park an entity until the user confirms it. Replaces any previous
    /// pending entity of the same kind. Returns `false` (and changes nothing)
    /// for articles, or when the entity is already known.
    pub fn set_pending(&mut self, entity: RankedEntity) -> bool {
        let kind = entity.kind();
        if self.contains(kind, entity.id()) {
            return false;
        }
        match self.pending_slot_mut(kind) {
            Some(slot) => {
                *slot = Some(entity);
                true
            }
            None => false,
        }
    }

    /// Promote the pending entity of `kind` into the keyed map and the focus
    /// slot. No-op returning `None` when nothing is pending for that kind.
    pub fn promote(&mut self, kind: EntityKind) -> Option<RankedEntity> {
        let entity = self.pending_slot_mut(kind)?.take()?;
        self.focus(entity.clone());
        Some(entity)
    }

    /// Kinds with a pending entity, in confirmation precedence order.
    pub fn pending_kinds(&self) -> Vec<EntityKind> {
        CONFIRMATION_PRECEDENCE
            .into_iter()
            .filter(|k| self.pending(*k).is_some())
            .collect()
    }

    /// Check the focused/pending invariants. Used by tests and debug logging.
    pub fn check_invariants(&self) -> Result<(), String> {
        for kind in CONFIRMATION_PRECEDENCE {
            if let Some(f) = self.focused(kind) {
                if !self.contains(kind, f.id()) {
                    return Err(format!("focused {kind} {} missing from keyed map", f.id()));
                }
            }
            if let Some(p) = self.pending(kind) {
                if self.contains(kind, p.id()) {
                    return Err(format!("pending {kind} {} already in keyed map", p.id()));
                }
            }
        }
        for article in &self.focused_articles {
            if !self.contains(EntityKind::Article, article.id()) {
                return Err(format!("focused article {} missing from keyed map", article.id()));
            }
        }
        Ok(())
    }
}

/// Aggregate relevance of one taxonomy family, derived from matched practices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedFamily {
    pub id: String,
    pub name: String,
    /// Σ fused score × match count over the family's matched practices.
    pub dominance_score: f64,
    /// Σ match count over the family's matched practices.
    pub practice_match_weight: u32,
    /// Distinct matched practices in the family.
    pub total_matches: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub answer: String,
}

/// Statistics accumulated over the fixed-question intake flow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentUniverse {
    pub families: Vec<RankedFamily>,
    pub practices: Vec<RankedEntity>,
    pub activities: Vec<RankedEntity>,
    pub practitioners: Vec<RankedEntity>,
    pub turn_log: Vec<TurnLogEntry>,
    /// Every text fragment extracted from the answers so far.
    pub fragments: Vec<String>,
    /// Index of the next question to ask.
    pub next_question: usize,
}

/// One past exchange kept for prompt context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub user: String,
    pub assistant: String,
    pub at: String,
}

/// Everything the engine persists for a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub version: u32,
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub cache: EntityResolutionCache,
    /// Present only while the intake flow is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AssessmentUniverse>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub last_recommendations: ExtractedRecommendations,
    #[serde(default)]
    pub turn_count: u32,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            version: STATE_VERSION,
            conversation_id,
            user_id: None,
            cache: EntityResolutionCache::default(),
            assessment: None,
            transcript: Vec::new(),
            last_recommendations: ExtractedRecommendations::default(),
            turn_count: 0,
        }
    }

    /// Append an exchange, dropping the oldest beyond `max_turns`.
    pub fn push_transcript(&mut self, user: impl Into<String>, assistant: impl Into<String>, max_turns: usize) {
        self.transcript.push(TranscriptEntry {
            user: user.into(),
            assistant: assistant.into(),
            at: chrono::Utc::now().to_rfc3339(),
        });
        if self.transcript.len() > max_turns {
            let excess = self.transcript.len() - max_turns;
            self.transcript.drain(..excess);
        }
    }
}
