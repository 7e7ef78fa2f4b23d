//! Assessment-universe aggregation.
//!
//! Every fragment accumulated from the intake answers is searched against
//! practices, activities and practitioners (no top-k cut, relevance floor
//! only). Taxonomy family dominance is computed from practices alone:
//!
//! - `practice_match_weight(F)` = Σ match count of F's matched practices
//! - `dominance_score(F)` = Σ fused score × match count of F's matched practices
//!
//! Families sort by dominance (desc), then weight (desc), then id.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use concierge_core::entity::{EntityKind, RankedEntity};
use concierge_core::state::{AssessmentUniverse, RankedFamily};
use concierge_search::{SearchOptions, SearchRouter, Taxonomy};
use regex::Regex;
use tracing::{debug, instrument};

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?;\n]+|\s+(?:and|but)\s+").unwrap());

/// Split a free-text answer into search fragments.
pub fn split_fragments(answer: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(answer)
        .map(str::trim)
        .filter(|s| s.chars().filter(|c| c.is_alphanumeric()).count() >= 3)
        .map(str::to_string)
        .collect()
}

/// Fresh search results for one recomputation.
#[derive(Clone, Debug, Default)]
pub struct ComputedUniverse {
    pub families: Vec<RankedFamily>,
    pub practices: Vec<RankedEntity>,
    pub activities: Vec<RankedEntity>,
    pub practitioners: Vec<RankedEntity>,
}

/// Aggregate family statistics over matched practices.
pub fn rank_families(practices: &[RankedEntity], taxonomy: &dyn Taxonomy) -> Vec<RankedFamily> {
    let mut families: HashMap<String, RankedFamily> = HashMap::new();
    for practice in practices {
        let Some(family) = taxonomy.family_of(practice.id()) else {
            continue;
        };
        let entry = families.entry(family.id.clone()).or_insert_with(|| RankedFamily {
            id: family.id,
            name: family.name,
            dominance_score: 0.0,
            practice_match_weight: 0,
            total_matches: 0,
        });
        entry.dominance_score += practice.fused_score() * f64::from(practice.match_count);
        entry.practice_match_weight += practice.match_count;
        entry.total_matches += 1;
    }
    let mut families: Vec<RankedFamily> = families.into_values().collect();
    sort_families(&mut families);
    families
}

fn sort_families(families: &mut [RankedFamily]) {
    families.sort_by(|a, b| {
        b.dominance_score
            .total_cmp(&a.dominance_score)
            .then_with(|| b.practice_match_weight.cmp(&a.practice_match_weight))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Run the three searches over `fragments` and rank families.
#[instrument(skip_all, fields(fragments = fragments.len()))]
pub async fn compute(
    search: &SearchRouter,
    taxonomy: &dyn Taxonomy,
    fragments: &[String],
    min_score: f64,
) -> ComputedUniverse {
    let opts = SearchOptions::floor(min_score);
    let (practices, activities, practitioners) = tokio::join!(
        search.search_merged(EntityKind::Practice, fragments, &opts),
        search.search_merged(EntityKind::Activity, fragments, &opts),
        search.search_merged(EntityKind::Practitioner, fragments, &opts),
    );
    let families = rank_families(&practices, taxonomy);
    debug!(
        families = families.len(),
        practices = practices.len(),
        activities = activities.len(),
        "assessment universe computed"
    );
    ComputedUniverse {
        families,
        practices,
        activities,
        practitioners,
    }
}

/// Fold a recomputation into the running universe without shrinking it:
/// fresh entries replace same-id entries, and anything the recomputation
/// lost is carried over from before.
pub fn absorb(universe: &mut AssessmentUniverse, computed: ComputedUniverse) {
    universe.practices = retain_missing(computed.practices, &universe.practices, |e| e.id());
    universe.activities = retain_missing(computed.activities, &universe.activities, |e| e.id());
    universe.practitioners =
        retain_missing(computed.practitioners, &universe.practitioners, |e| e.id());
    let mut families = retain_missing(computed.families, &universe.families, |f| f.id.as_str());
    sort_families(&mut families);
    universe.families = families;
}

fn retain_missing<T: Clone>(fresh: Vec<T>, previous: &[T], id: impl Fn(&T) -> &str) -> Vec<T> {
    let seen: HashSet<String> = fresh.iter().map(|t| id(t).to_string()).collect();
    let mut out = fresh;
    out.extend(previous.iter().filter(|t| !seen.contains(id(t))).cloned());
    out
}
