//! # concierge-core
//!
//! Shared vocabulary of the concierge engine: ids, search hits, the
//! text-generation and tool traits, extracted recommendations, and the
//! per-conversation state that is persisted between turns.
//!
//! ## Crate Position
//!
//! Leaf crate. Depended on by every other concierge crate.

pub mod entity;
pub mod errors;
pub mod generation;
pub mod ids;
pub mod recommendations;
pub mod state;
pub mod tools;

pub use entity::{EntityKind, RankedEntity, SearchHit};
pub use errors::BackendError;
pub use generation::{
    Generation, GenerationRequest, OutputSchema, PromptContext, SectionLabel, TextGenerator,
    ToolCallRequest,
};
pub use ids::{CallId, ConversationId, ToolCallId};
pub use recommendations::{ExtractedRecommendations, RecommendationItem};
pub use state::{
    AssessmentUniverse, ConversationState, EntityResolutionCache, RankedFamily, TurnLogEntry,
};
pub use tools::{Tool, ToolContext, ToolDefinition, ToolError, ToolInvocationResult, ToolUsage};
