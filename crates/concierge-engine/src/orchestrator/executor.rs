//! Concurrent tool execution.
//!
//! Every call in a batch runs at once. Each one is isolated: an unknown
//! tool, an error, a timeout or a panic becomes an `[error] ...` result for
//! that call and never cancels its siblings. Results come back in request
//! order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use concierge_core::generation::ToolCallRequest;
use concierge_core::tools::{ToolContext, ToolInvocationResult};
use futures::future::join_all;
use futures::FutureExt;
use metrics::{counter, histogram};
use tracing::{debug, error, instrument, warn};

use crate::registry::ToolRegistry;

#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip_all, fields(calls = calls.len()))]
    pub async fn execute(&self, calls: &[ToolCallRequest], ctx: &ToolContext) -> Vec<ToolInvocationResult> {
        join_all(calls.iter().map(|call| self.execute_one(call, ctx))).await
    }

    async fn execute_one(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ToolInvocationResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "unknown tool requested");
            return ToolInvocationResult::error(
                call.name.clone(),
                call.id.clone(),
                format!("Unknown tool: {}", call.name),
            );
        };

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            AssertUnwindSafe(tool.execute(call.arguments.clone(), ctx)).catch_unwind(),
        )
        .await;
        let elapsed = start.elapsed();

        counter!("tool_executions_total", "tool" => call.name.clone()).increment(1);
        histogram!("tool_execution_duration_seconds", "tool" => call.name.clone())
            .record(elapsed.as_secs_f64());

        match result {
            Ok(Ok(Ok(output))) => {
                debug!(tool = %call.name, duration_ms = elapsed.as_millis() as u64, "tool completed");
                ToolInvocationResult::ok(call.name.clone(), call.id.clone(), output)
            }
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolInvocationResult::error(call.name.clone(), call.id.clone(), e.to_string())
            }
            Ok(Err(panic)) => {
                let msg = panic_message(&panic);
                error!(tool = %call.name, panic = %msg, "tool panicked during execution");
                ToolInvocationResult::error(call.name.clone(), call.id.clone(), "Internal error: tool crashed")
            }
            Err(_) => {
                warn!(
                    tool = %call.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "tool timed out"
                );
                ToolInvocationResult::error(
                    call.name.clone(),
                    call.id.clone(),
                    format!("Tool timed out after {}ms", self.timeout.as_millis()),
                )
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_core::ids::ConversationId;
    use concierge_core::state::EntityResolutionCache;
    use concierge_core::tools::{Tool, ToolError};
    use serde_json::{json, Value};

    enum Behaviour {
        Echo,
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct TestTool {
        name: &'static str,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Tool for TestTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            match &self.behaviour {
                Behaviour::Echo => Ok(args),
                Behaviour::Fail => Err(ToolError::ExecutionFailed("backend down".into())),
                Behaviour::Panic => panic!("tool exploded"),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(Value::Null)
                }
            }
        }
    }

    fn executor(timeout: Duration) -> ToolExecutor {
        let registry = ToolRegistry::new()
            .with(Arc::new(TestTool { name: "echo", behaviour: Behaviour::Echo }))
            .with(Arc::new(TestTool { name: "fail", behaviour: Behaviour::Fail }))
            .with(Arc::new(TestTool { name: "panic", behaviour: Behaviour::Panic }))
            .with(Arc::new(TestTool {
                name: "slow",
                behaviour: Behaviour::Sleep(Duration::from_secs(30)),
            }));
        ToolExecutor::new(Arc::new(registry), timeout)
    }

    fn ctx() -> ToolContext {
        ToolContext::new(ConversationId::new(), EntityResolutionCache::default())
    }

    #[tokio::test]
    async fn partial_failures_do_not_abort_batch() {
        let calls = vec![
            ToolCallRequest::new("echo", json!({"q": 1})),
            ToolCallRequest::new("fail", json!({})),
            ToolCallRequest::new("panic", json!({})),
            ToolCallRequest::new("missing", json!({})),
        ];
        let results = executor(Duration::from_secs(5)).execute(&calls, &ctx()).await;

        assert_eq!(results.len(), 4);
        assert!(!results[0].is_error);
        assert_eq!(results[0].raw_output, json!({"q": 1}));
        assert_eq!(results[0].call_id, calls[0].id);
        assert_eq!(results[1].raw_output, json!("[error] execution failed: backend down"));
        assert_eq!(results[2].raw_output, json!("[error] Internal error: tool crashed"));
        assert_eq!(results[3].raw_output, json!("[error] Unknown tool: missing"));
        assert!(results[1..].iter().all(|r| r.is_error));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out_as_error_result() {
        let calls = vec![
            ToolCallRequest::new("slow", json!({})),
            ToolCallRequest::new("echo", json!("fast")),
        ];
        let results = executor(Duration::from_millis(50)).execute(&calls, &ctx()).await;

        assert!(results[0].is_error);
        assert_eq!(results[0].raw_output, json!("[error] Tool timed out after 50ms"));
        assert_eq!(results[1].raw_output, json!("fast"));
    }

    #[test]
    fn panic_message_variants() {
        let p: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&p), "static");
        let p: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&p), "owned");
        let p: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(&p), "unknown panic");
    }
}
