//! Built-in tools: one search tool per configured entity kind, plus the
//! response-usage `present_recommendations`.

pub mod respond;
pub mod search;

use std::sync::Arc;

use concierge_core::entity::EntityKind;
use concierge_search::SearchRouter;
use concierge_settings::SearchSettings;

use crate::registry::ToolRegistry;

pub use respond::PresentRecommendationsTool;
pub use search::SearchTool;

/// Registry with a search tool for every kind `search` has a backend for.
pub fn builtin_registry(search: &SearchRouter, settings: &SearchSettings) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for kind in EntityKind::ALL {
        if search.supports(kind) {
            registry.register(Arc::new(SearchTool::new(
                kind,
                search.clone(),
                settings.recommendation_limit,
                settings.recommendation_min_score,
            )));
        }
    }
    registry.register(Arc::new(PresentRecommendationsTool));
    registry
}
