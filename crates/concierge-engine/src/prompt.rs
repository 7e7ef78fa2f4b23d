//! Prompt context assembly and the output schemas the engine asks for.

use concierge_core::entity::{EntityKind, RankedEntity};
use concierge_core::generation::{OutputSchema, PromptContext, SectionLabel};
use concierge_core::state::ConversationState;
use serde_json::{json, Value};

use crate::router::Directive;

/// Schema for an ordinary conversational answer.
pub fn reply_schema() -> OutputSchema {
    OutputSchema::new(
        "reply",
        json!({
            "type": "object",
            "required": ["response"],
            "properties": {
                "response": {"type": "string"},
                "followUp": {"type": "string"}
            }
        }),
    )
}

/// Schema for the answer that frames a `present_recommendations` result.
pub fn recommendation_schema() -> OutputSchema {
    OutputSchema::new(
        "recommendation_reply",
        json!({
            "type": "object",
            "required": ["response", "activityIds", "practiceIds"],
            "properties": {
                "response": {"type": "string"},
                "activityIds": {"type": "array", "items": {"type": "string"}},
                "practiceIds": {"type": "array", "items": {"type": "string"}}
            }
        }),
    )
}

fn focused_entities(state: &ConversationState) -> Value {
    let cache = &state.cache;
    let slot = |kind: EntityKind| {
        cache
            .focused(kind)
            .map(|e| json!({"id": e.id(), "name": e.label(), "score": e.fused_score()}))
    };
    json!({
        "practitioner": slot(EntityKind::Practitioner),
        "activity": slot(EntityKind::Activity),
        "practice": slot(EntityKind::Practice),
        "articles": cache
            .focused_articles
            .iter()
            .map(|a| json!({"id": a.id(), "name": a.label()}))
            .collect::<Vec<_>>(),
    })
}

/// Build the orchestrator's context for one turn, after routing.
pub fn build_context(
    utterance: &str,
    state: &ConversationState,
    directive: &Directive,
    transcript_turns: usize,
) -> PromptContext {
    let skip = state.transcript.len().saturating_sub(transcript_turns);
    let transcript: Vec<_> = state.transcript.iter().skip(skip).collect();

    let mut context = PromptContext::empty()
        .with_section(SectionLabel::Utterance, json!(utterance))
        .with_section(SectionLabel::Transcript, json!(transcript))
        .with_section(SectionLabel::Directive, json!(directive))
        .with_section(SectionLabel::FocusedEntities, focused_entities(state));

    if let Directive::Candidates { activities, practices } = directive {
        let seen = |list: &[RankedEntity]| {
            list.iter()
                .map(|e| json!({"id": e.id(), "name": e.label(), "matchCount": e.match_count}))
                .collect::<Vec<_>>()
        };
        context.push(
            SectionLabel::Candidates,
            json!({"activities": seen(activities), "practices": seen(practices)}),
        );
    }
    if let Some(universe) = &state.assessment {
        context.push(
            SectionLabel::Assessment,
            json!({
                "answered": universe.turn_log.len(),
                "families": universe.families,
            }),
        );
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::entity::SearchHit;
    use concierge_core::ids::ConversationId;

    #[test]
    fn context_carries_directive_and_focus() {
        let mut state = ConversationState::new(ConversationId::new());
        state.cache.focus(RankedEntity::from_hit(
            SearchHit::new("u1", EntityKind::Practitioner, 0.9).with_name("Dr Lee"),
        ));
        state.push_transcript("hi", "hello", 10);
        state.push_transcript("who?", "Dr Lee", 10);

        let context = build_context("book her", &state, &Directive::Proceed, 1);

        assert_eq!(context.section(&SectionLabel::Utterance), Some(&json!("book her")));
        assert_eq!(
            context.section(&SectionLabel::Directive),
            Some(&json!({"directive": "proceed"}))
        );
        let focused = context.section(&SectionLabel::FocusedEntities).unwrap();
        assert_eq!(focused["practitioner"]["name"], "Dr Lee");
        assert!(focused["activity"].is_null());
        let transcript = context.section(&SectionLabel::Transcript).unwrap();
        assert_eq!(transcript.as_array().unwrap().len(), 1);
        assert_eq!(transcript[0]["user"], "who?");
        assert!(context.section(&SectionLabel::Candidates).is_none());
    }

    #[test]
    fn candidates_section_only_for_candidates() {
        let state = ConversationState::new(ConversationId::new());
        let directive = Directive::Candidates {
            activities: vec![],
            practices: vec![RankedEntity::from_hit(SearchHit::new("P1", EntityKind::Practice, 0.8))],
        };
        let context = build_context("help", &state, &directive, 4);
        let candidates = context.section(&SectionLabel::Candidates).unwrap();
        assert_eq!(candidates["practices"][0]["id"], "P1");
        assert_eq!(candidates["practices"][0]["matchCount"], 1);
    }

    #[test]
    fn schemas_require_response() {
        assert_eq!(reply_schema().required_fields(), vec!["response"]);
        assert!(recommendation_schema().required_fields().contains(&"practiceIds"));
    }
}
