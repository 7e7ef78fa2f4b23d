//! Similarity ranker: a total preorder over hybrid search hits.
//!
//! Higher fused score wins outright. On an exact fused tie the comparison
//! looks at the signal that did *not* produce the fusion:
//!
//! - both sides vector-led (`vector >= lexical`): higher lexical score wins;
//! - both sides lexical-led: higher vector score wins;
//! - mixed: the lexical-led side wins.
//!
//! Missing component scores count as `0.0`.

use std::cmp::Ordering;

use concierge_core::entity::{RankedEntity, SearchHit};

/// Which retrieval signal dominates a hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lead {
    Vector,
    Lexical,
}

impl Lead {
    pub fn of(hit: &SearchHit) -> Self {
        if vector(hit) >= lexical(hit) {
            Lead::Vector
        } else {
            Lead::Lexical
        }
    }
}

fn vector(hit: &SearchHit) -> f64 {
    hit.vector_score.unwrap_or(0.0)
}

fn lexical(hit: &SearchHit) -> f64 {
    hit.lexical_score.unwrap_or(0.0)
}

/// Compare two hits. `Less` means `a` ranks before `b`; `Equal` is a tie.
pub fn compare(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| compare_tied(a, b))
}

fn compare_tied(a: &SearchHit, b: &SearchHit) -> Ordering {
    match (Lead::of(a), Lead::of(b)) {
        (Lead::Vector, Lead::Vector) => lexical(b).total_cmp(&lexical(a)),
        (Lead::Lexical, Lead::Lexical) => vector(b).total_cmp(&vector(a)),
        (Lead::Lexical, Lead::Vector) => Ordering::Less,
        (Lead::Vector, Lead::Lexical) => Ordering::Greater,
    }
}

/// [`compare`] lifted to merged entities.
pub fn compare_entities(a: &RankedEntity, b: &RankedEntity) -> Ordering {
    compare(&a.hit, &b.hit)
}

/// Sort hits best-first. Ties keep their input order.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(compare);
}
