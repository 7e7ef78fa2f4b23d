//! Entity resolution: turn a free-text designation (plus an optional id
//! hint) into a concrete entity, using the conversation's cache first and
//! search second.
//!
//! 1. An id hint already in the keyed map resolves without searching.
//! 2. Otherwise the best single search hit resolves the designation; it is
//!    *present* if its id is already keyed, *absent* otherwise.
//! 3. No hit (or a failed search) leaves it unresolved. Nothing is guessed.

use concierge_core::entity::{EntityKind, RankedEntity};
use concierge_core::state::EntityResolutionCache;
use concierge_search::SearchRouter;
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Outcome of resolving one designation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "entity", rename_all = "snake_case")]
pub enum Resolution {
    /// Already known to the conversation; safe to act on.
    Present(RankedEntity),
    /// Found by search but never seen; needs the user's confirmation.
    Absent(RankedEntity),
    Unresolved,
}

impl Resolution {
    pub fn entity(&self) -> Option<&RankedEntity> {
        match self {
            Self::Present(e) | Self::Absent(e) => Some(e),
            Self::Unresolved => None,
        }
    }
}

/// What applying a resolution did to the cache.
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    Focused(RankedEntity),
    Pending(RankedEntity),
    Unresolved,
}

/// Resolve `designation` for `kind` against the cache, then search.
#[instrument(skip_all, fields(kind = %kind, designation))]
pub async fn resolve(
    search: &SearchRouter,
    cache: &EntityResolutionCache,
    kind: EntityKind,
    designation: &str,
    id_hint: Option<&str>,
    min_score: f64,
) -> Resolution {
    if let Some(hint) = id_hint {
        if let Some(known) = cache.get(kind, hint) {
            debug!(id = hint, "resolved from id hint");
            return Resolution::Present(known.clone());
        }
    }

    let designation = designation.trim();
    if designation.is_empty() {
        return Resolution::Unresolved;
    }

    let hit = match search.search_one(kind, designation, Some(min_score)).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(error = %e, "resolution search failed");
            return Resolution::Unresolved;
        }
    };

    match hit {
        Some(hit) => match cache.get(kind, &hit.id) {
            Some(known) => {
                debug!(id = %hit.id, "resolved by search, already known");
                Resolution::Present(known.clone())
            }
            None => {
                debug!(id = %hit.id, "resolved by search, not yet known");
                let mut entity = RankedEntity::from_hit(hit);
                entity.fragments.insert(designation.to_string());
                Resolution::Absent(entity)
            }
        },
        None => Resolution::Unresolved,
    }
}

/// Apply a resolution to the cache.
///
/// Present entities become focused. Absent entities are parked as pending
/// and leave the focus untouched. Unresolved touches nothing.
pub fn apply(cache: &mut EntityResolutionCache, resolution: Resolution) -> Applied {
    match resolution {
        Resolution::Present(entity) => {
            cache.focus(entity.clone());
            Applied::Focused(entity)
        }
        Resolution::Absent(entity) => {
            if cache.set_pending(entity.clone()) {
                Applied::Pending(entity)
            } else {
                // Articles have no pending tier; knowing one is enough to focus it.
                cache.focus(entity.clone());
                Applied::Focused(entity)
            }
        }
        Resolution::Unresolved => Applied::Unresolved,
    }
}

/// Knowledge-base lookup: the top `top_k` articles all become focused.
/// Returns the focused articles; an empty result leaves the cache untouched.
#[instrument(skip_all, fields(designation, top_k))]
pub async fn lookup_subject(
    search: &SearchRouter,
    cache: &mut EntityResolutionCache,
    designation: &str,
    top_k: usize,
    min_score: f64,
) -> Vec<RankedEntity> {
    let opts = concierge_search::SearchOptions {
        limit: Some(top_k),
        min_score: Some(min_score),
    };
    let hits = match search.search(EntityKind::Article, designation.trim(), &opts).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, "subject search failed");
            return Vec::new();
        }
    };
    if hits.is_empty() {
        return Vec::new();
    }

    let articles: Vec<RankedEntity> = hits
        .into_iter()
        .map(|hit| RankedEntity::from_hit(hit.with_fragment(designation.trim())))
        .collect();
    cache.focus_articles(articles.clone());
    debug!(count = articles.len(), "subject articles focused");
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use concierge_core::entity::SearchHit;
    use concierge_search::testing::ScriptedSearchBackend;

    fn practitioner(id: &str, score: f64) -> SearchHit {
        SearchHit::new(id, EntityKind::Practitioner, score).with_name(format!("Dr {id}"))
    }

    fn router_with(backend: Arc<ScriptedSearchBackend>) -> SearchRouter {
        SearchRouter::new().with_backend(backend)
    }

    #[tokio::test]
    async fn id_hint_in_cache_never_searches() {
        let backend = Arc::new(
            ScriptedSearchBackend::new(EntityKind::Practitioner)
                .with_default(vec![practitioner("other", 0.9)]),
        );
        let router = router_with(backend.clone());
        let mut cache = EntityResolutionCache::default();
        cache.record(RankedEntity::from_hit(practitioner("u1", 0.5)));

        let resolution = resolve(&router, &cache, EntityKind::Practitioner, "Dr Lee", Some("u1"), 0.3).await;

        assert_eq!(resolution.entity().map(RankedEntity::id), Some("u1"));
        assert!(matches!(resolution, Resolution::Present(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_hint_falls_through_to_search() {
        let backend = Arc::new(
            ScriptedSearchBackend::new(EntityKind::Practitioner)
                .with_response("Dr Lee", vec![practitioner("u7", 0.8)]),
        );
        let router = router_with(backend.clone());
        let cache = EntityResolutionCache::default();

        let resolution = resolve(&router, &cache, EntityKind::Practitioner, "Dr Lee", Some("nope"), 0.3).await;
        assert!(matches!(&resolution, Resolution::Absent(e) if e.id() == "u7"));
        assert_eq!(backend.call_count(), 1);
        let fragments = &resolution.entity().unwrap().fragments;
        assert!(fragments.contains("Dr Lee"));
    }

    #[tokio::test]
    async fn search_hit_already_known_is_present() {
        let backend = Arc::new(
            ScriptedSearchBackend::new(EntityKind::Activity)
                .with_response("yoga", vec![SearchHit::new("a1", EntityKind::Activity, 0.9)]),
        );
        let router = router_with(backend);
        let mut cache = EntityResolutionCache::default();
        cache.record(RankedEntity::from_hit(
            SearchHit::new("a1", EntityKind::Activity, 0.4).with_name("Morning yoga"),
        ));

        let resolution = resolve(&router, &cache, EntityKind::Activity, "yoga", None, 0.3).await;
        match resolution {
            Resolution::Present(e) => assert_eq!(e.hit.name.as_deref(), Some("Morning yoga")),
            other => panic!("expected present, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn below_floor_or_failing_search_is_unresolved() {
        let backend = Arc::new(
            ScriptedSearchBackend::new(EntityKind::Practice)
                .with_response("vague", vec![SearchHit::new("p1", EntityKind::Practice, 0.1)])
                .with_failure("broken"),
        );
        let router = router_with(backend);
        let cache = EntityResolutionCache::default();

        for text in ["vague", "broken", "   "] {
            let resolution = resolve(&router, &cache, EntityKind::Practice, text, None, 0.35).await;
            assert_eq!(resolution, Resolution::Unresolved, "for {text:?}");
        }
    }

    #[test]
    fn absent_goes_pending_and_leaves_focus() {
        let mut cache = EntityResolutionCache::default();
        cache.focus(RankedEntity::from_hit(SearchHit::new("p0", EntityKind::Practice, 0.6)));
        let fresh = RankedEntity::from_hit(SearchHit::new("p9", EntityKind::Practice, 0.7));

        let applied = apply(&mut cache, Resolution::Absent(fresh));

        assert!(matches!(applied, Applied::Pending(_)));
        assert_eq!(cache.focused(EntityKind::Practice).unwrap().id(), "p0");
        assert_eq!(cache.pending(EntityKind::Practice).unwrap().id(), "p9");
        assert!(!cache.contains(EntityKind::Practice, "p9"));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn unresolved_touches_nothing() {
        let mut cache = EntityResolutionCache::default();
        let before = cache.clone();
        assert_eq!(apply(&mut cache, Resolution::Unresolved), Applied::Unresolved);
        assert_eq!(cache, before);
    }

    #[tokio::test]
    async fn subject_focuses_all_top_k_articles() {
        let backend = Arc::new(ScriptedSearchBackend::new(EntityKind::Article).with_default(vec![
            SearchHit::new("k1", EntityKind::Article, 0.9),
            SearchHit::new("k2", EntityKind::Article, 0.8),
            SearchHit::new("k3", EntityKind::Article, 0.7),
            SearchHit::new("k4", EntityKind::Article, 0.6),
        ]));
        let router = router_with(backend);
        let mut cache = EntityResolutionCache::default();

        let articles = lookup_subject(&router, &mut cache, "sleep hygiene", 3, 0.3).await;

        assert_eq!(articles.len(), 3);
        assert_eq!(cache.focused_articles.len(), 3);
        assert!(cache.contains(EntityKind::Article, "k3"));
        assert!(!cache.contains(EntityKind::Article, "k4"));
        assert!(cache.pending_kinds().is_empty());
        cache.check_invariants().unwrap();
    }
}
