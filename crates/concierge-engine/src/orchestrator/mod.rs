//! Recursive tool orchestrator.
//!
//! ```text
//! AWAIT_MODEL ──terminal──────────────▶ validate ──ok──▶ done
//!      │                                   │
//!      └─tool calls─▶ EXECUTING_TOOLS      └─err─▶ one retry (no tools) ─err─▶ ValidationExhausted
//!                          │
//!                          └─▶ AWAIT_MODEL (response tool? switch schema, tools off)
//! ```
//!
//! The recursion is an explicit loop over an accumulator. Tools are offered
//! only while `recursion_allowed` holds, no response tool has run yet, and
//! fewer than `max_depth` tool rounds have happened.

pub mod executor;
pub mod extraction;
pub mod truncate;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use concierge_core::generation::{
    Generation, GenerationRequest, OutputSchema, PromptContext, SectionLabel, TextGenerator,
};
use concierge_core::ids::CallId;
use concierge_core::recommendations::ExtractedRecommendations;
use concierge_core::tools::{ToolContext, ToolUsage};
use concierge_settings::OrchestratorSettings;
use metrics::counter;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::EngineError;
use crate::registry::ToolRegistry;

pub use executor::ToolExecutor;
pub use extraction::{JsonRecommendationExtractor, RecommendationExtractor};
pub use validation::{ResponseValidator, StructuralValidator};

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub max_depth: u32,
    pub tool_timeout: Duration,
    pub max_tool_output_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

impl From<&OrchestratorSettings> for OrchestratorConfig {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            tool_timeout: settings.tool_timeout(),
            max_tool_output_chars: settings.max_tool_output_chars,
        }
    }
}

/// One orchestration run.
#[derive(Clone, Debug)]
pub struct OrchestrationRequest {
    pub context: PromptContext,
    pub schema: OutputSchema,
    /// Schema used once a response-usage tool has produced the answer.
    pub response_schema: OutputSchema,
    pub recursion_allowed: bool,
    pub tool_context: ToolContext,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrchestrationOutcome {
    /// The user-facing text of the terminal answer.
    pub response_text: String,
    /// The full validated terminal JSON.
    pub response: Value,
    pub extracted_recommendations: ExtractedRecommendations,
    /// Sum of every model call's usage, retry included.
    pub accumulated_cost: u64,
    pub model_calls: u32,
}

#[derive(Debug, Default)]
struct Accumulator {
    cost: u64,
    recommendations: ExtractedRecommendations,
    depth: u32,
    model_calls: u32,
}

pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    extractor: Arc<dyn RecommendationExtractor>,
    validator: Arc<dyn ResponseValidator>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = ToolExecutor::new(Arc::clone(&registry), config.tool_timeout);
        Self {
            generator,
            registry,
            executor,
            extractor: Arc::new(JsonRecommendationExtractor),
            validator: Arc::new(StructuralValidator),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn RecommendationExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[instrument(skip_all, fields(
        conversation_id = %request.tool_context.conversation_id,
        schema = %request.schema.name,
        recursion_allowed = request.recursion_allowed,
    ))]
    pub async fn run(&self, request: OrchestrationRequest) -> Result<OrchestrationOutcome, EngineError> {
        let OrchestrationRequest {
            mut context,
            mut schema,
            response_schema,
            recursion_allowed,
            tool_context,
        } = request;

        let mut acc = Accumulator::default();
        let mut tools_honoured = recursion_allowed && !self.registry.is_empty();
        let mut prior_call_id: Option<CallId> = None;

        loop {
            let offer_tools = tools_honoured && acc.depth < self.config.max_depth;
            let generation = self
                .call_model(&context, &schema, offer_tools, prior_call_id.take(), &mut acc)
                .await?;
            prior_call_id = Some(generation.call_id.clone());

            if !generation.requests_tools() {
                return self.finish(generation, context, &schema, prior_call_id, acc).await;
            }
            if !offer_tools {
                warn!(
                    count = generation.tool_calls.len(),
                    "tool calls not honoured, treating answer as terminal"
                );
                return self.finish(generation, context, &schema, prior_call_id, acc).await;
            }

            acc.depth += 1;
            let results = self.executor.execute(&generation.tool_calls, &tool_context).await;

            let mut framing = Vec::new();
            for result in &results {
                acc.recommendations
                    .merge(self.extractor.extract(&result.tool_name, &result.raw_output));
                if !result.is_error && self.registry.usage(&result.tool_name) == Some(ToolUsage::Response) {
                    framing.push(json!({"tool": result.tool_name, "output": result.raw_output}));
                }
            }

            let max_chars = self.config.max_tool_output_chars;
            context.tool_outputs.extend(results.into_iter().map(|mut result| {
                result.raw_output = truncate::truncate_value(&result.raw_output, max_chars);
                result
            }));

            if !framing.is_empty() {
                debug!(depth = acc.depth, "response tool ran, framing final answer");
                context.push(SectionLabel::ResponseFraming, Value::Array(framing));
                schema = response_schema.clone();
                tools_honoured = false;
            } else {
                debug!(depth = acc.depth, "context tools ran, continuing");
            }
        }
    }

    async fn call_model(
        &self,
        context: &PromptContext,
        schema: &OutputSchema,
        offer_tools: bool,
        prior_call_id: Option<CallId>,
        acc: &mut Accumulator,
    ) -> Result<Generation, EngineError> {
        let request = GenerationRequest {
            context: context.clone(),
            schema: schema.clone(),
            tools: if offer_tools {
                self.registry.definitions()
            } else {
                Vec::new()
            },
            prior_call_id,
        };
        let generation = self.generator.complete(&request).await?;
        acc.cost += generation.usage;
        acc.model_calls += 1;
        counter!("orchestrator_model_calls_total").increment(1);
        debug!(
            usage = generation.usage,
            tool_calls = generation.tool_calls.len(),
            tools_offered = offer_tools,
            "model call complete"
        );
        Ok(generation)
    }

    async fn finish(
        &self,
        generation: Generation,
        mut context: PromptContext,
        schema: &OutputSchema,
        prior_call_id: Option<CallId>,
        mut acc: Accumulator,
    ) -> Result<OrchestrationOutcome, EngineError> {
        let errors = match self.validator.validate(&generation.text, schema) {
            Ok(()) => return Ok(outcome(generation.text, acc)),
            Err(errors) => errors,
        };

        warn!(errors = ?errors, "terminal response failed validation, retrying once");
        counter!("orchestrator_validation_retries_total").increment(1);
        context.instructions.push(format!(
            "Your previous answer was rejected: {}. Answer again, matching the `{}` schema exactly.",
            errors.join("; "),
            schema.name
        ));

        let retry = self.call_model(&context, schema, false, prior_call_id, &mut acc).await?;
        if retry.requests_tools() {
            warn!(count = retry.tool_calls.len(), "tool calls on validation retry ignored");
        }
        match self.validator.validate(&retry.text, schema) {
            Ok(()) => Ok(outcome(retry.text, acc)),
            Err(errors) => Err(EngineError::ValidationExhausted {
                reason: errors.join("; "),
            }),
        }
    }
}

fn outcome(response: Value, acc: Accumulator) -> OrchestrationOutcome {
    let response_text = match &response {
        Value::String(s) => s.clone(),
        other => other
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    OrchestrationOutcome {
        response_text,
        response,
        extracted_recommendations: acc.recommendations,
        accumulated_cost: acc.cost,
        model_calls: acc.model_calls,
    }
}
