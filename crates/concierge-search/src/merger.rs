//! Deduplicating result merger.
//!
//! Folds the hit lists of one search run against N query fragments into one
//! entry per entity id. Each entry keeps the best-ranked score triple seen for
//! its id and counts every fragment hit that landed on it. Duplicate
//! fragment-to-same-id hits each increment the count: an entity matched by
//! three fragments is more relevant than one matched once, whatever the scores.

use std::collections::HashMap;

use concierge_core::entity::{RankedEntity, SearchHit};
use serde::{Deserialize, Serialize};

use crate::ranker;

/// The hits one fragment produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentHits {
    pub fragment: String,
    pub hits: Vec<SearchHit>,
}

impl FragmentHits {
    pub fn new(fragment: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        Self {
            fragment: fragment.into(),
            hits,
        }
    }
}

/// Accumulates fragment hits; [`Merger::finish`] yields the ranked result.
#[derive(Debug, Default)]
pub struct Merger {
    entries: Vec<RankedEntity>,
    index: HashMap<String, usize>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in every hit one fragment produced.
    pub fn add(&mut self, fragment: &str, hits: impl IntoIterator<Item = SearchHit>) {
        for mut hit in hits {
            if hit.matching_fragment.is_none() && !fragment.is_empty() {
                hit.matching_fragment = Some(fragment.to_string());
            }
            self.add_hit(hit);
        }
    }

    fn add_hit(&mut self, hit: SearchHit) {
        match self.index.get(&hit.id) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.match_count += 1;
                if let Some(fragment) = &hit.matching_fragment {
                    entry.fragments.insert(fragment.clone());
                }
                let name = entry.hit.name.take().or_else(|| hit.name.clone());
                if ranker::compare(&hit, &entry.hit).is_lt() {
                    entry.hit = hit;
                }
                if entry.hit.name.is_none() {
                    entry.hit.name = name;
                }
            }
            None => {
                self.index.insert(hit.id.clone(), self.entries.len());
                self.entries.push(RankedEntity::from_hit(hit));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities ordered by match count (descending), then by the ranker.
    /// Remaining ties keep first-seen order.
    pub fn finish(self) -> Vec<RankedEntity> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| ranker::compare_entities(a, b))
        });
        entries
    }
}

/// Merge a batch of fragment results in one call.
pub fn merge(batches: impl IntoIterator<Item = FragmentHits>) -> Vec<RankedEntity> {
    let mut merger = Merger::new();
    for batch in batches {
        merger.add(&batch.fragment, batch.hits);
    }
    merger.finish()
}
