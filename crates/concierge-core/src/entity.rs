use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four searchable entity kinds.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Activity,
    Practice,
    Practitioner,
    Article,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Activity,
        EntityKind::Practice,
        EntityKind::Practitioner,
        EntityKind::Article,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Practice => "practice",
            Self::Practitioner => "practitioner",
            Self::Article => "article",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity" => Ok(Self::Activity),
            "practice" => Ok(Self::Practice),
            "practitioner" => Ok(Self::Practitioner),
            "article" => Ok(Self::Article),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// One hit from a hybrid search backend. Immutable once produced.
///
/// `fused_score` combines the dense and sparse signals; the two component
/// scores are carried so that ties in the fused score can be broken fairly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fused_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_fragment: Option<String>,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, kind: EntityKind, fused_score: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            fused_score,
            vector_score: None,
            lexical_score: None,
            matching_fragment: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_signals(mut self, vector: f64, lexical: f64) -> Self {
        self.vector_score = Some(vector);
        self.lexical_score = Some(lexical);
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.matching_fragment = Some(fragment.into());
        self
    }
}

/// A search hit after deduplication across query fragments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntity {
    #[serde(flatten)]
    pub hit: SearchHit,
    /// Number of fragment hits that landed on this entity, duplicates included.
    pub match_count: u32,
    /// Distinct fragments that matched.
    #[serde(default)]
    pub fragments: BTreeSet<String>,
}

impl RankedEntity {
    pub fn from_hit(hit: SearchHit) -> Self {
        let fragments = hit.matching_fragment.iter().cloned().collect();
        Self {
            hit,
            match_count: 1,
            fragments,
        }
    }

    pub fn id(&self) -> &str {
        &self.hit.id
    }

    pub fn kind(&self) -> EntityKind {
        self.hit.kind
    }

    pub fn fused_score(&self) -> f64 {
        self.hit.fused_score
    }

    /// Display label: the entity name when known, its id otherwise.
    pub fn label(&self) -> &str {
        self.hit.name.as_deref().unwrap_or(&self.hit.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("therapist".parse::<EntityKind>().is_err());
    }

    #[test]
    fn hit_serializes_camel_case_and_skips_missing_signals() {
        let hit = SearchHit::new("p1", EntityKind::Practice, 0.8);
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["fusedScore"], 0.8);
        assert_eq!(json["kind"], "practice");
        assert!(json.get("vectorScore").is_none());
    }

    #[test]
    fn ranked_entity_flattens_hit() {
        let entity = RankedEntity::from_hit(
            SearchHit::new("a1", EntityKind::Activity, 0.5)
                .with_name("Morning yoga")
                .with_fragment("stiff back"),
        );
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["id"], "a1");
        assert_eq!(json["matchCount"], 1);
        assert_eq!(json["fragments"][0], "stiff back");
        assert_eq!(entity.label(), "Morning yoga");
    }
}
