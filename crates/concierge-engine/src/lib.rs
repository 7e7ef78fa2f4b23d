//! # concierge-engine
//!
//! The conversational core. Each turn runs through the same pipeline:
//!
//! 1. [`intent`]: classify the utterance into a closed [`Intent`] enum.
//! 2. [`router`]: one handler per intent mutates the conversation state
//!    ([`resolution`], [`assessment`]) and yields a [`Directive`].
//! 3. [`orchestrator`]: the recursive tool loop produces the validated
//!    answer, the merged recommendations and the accumulated cost.
//! 4. [`turn`]: loads and saves the state around all of the above.
//!
//! ## Crate Position
//!
//! Depends on every other concierge crate (telemetry only for tests). Nothing depends
//! on it.

pub mod assessment;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod resolution;
pub mod router;
pub mod tools;
pub mod turn;

pub use error::EngineError;
pub use intent::{Classified, GenerativeIntentClassifier, Intent, IntentClassifier};
pub use orchestrator::{
    JsonRecommendationExtractor, OrchestrationOutcome, OrchestrationRequest, Orchestrator,
    OrchestratorConfig, RecommendationExtractor, ResponseValidator, StructuralValidator,
};
pub use registry::ToolRegistry;
pub use resolution::{Applied, Resolution};
pub use router::{Directive, IntentRouter};
pub use turn::{TurnOutcome, TurnProcessor};
