//! Async entry points.
//!
//! The refinement loop is synchronous and blocks on every generator call,
//! so async callers run it on tokio's blocking pool instead of a worker
//! thread.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::processor::{CoRTProcessor, ProcessRequest};
use crate::tools::{ToolDescriptor, ToolExecutor};
use crate::trace::{ProcessResult, RunId, Termination};

impl CoRTProcessor {
    /// [`CoRTProcessor::process`] on the blocking pool.
    ///
    /// If the blocking task is lost the result is unrefined, with
    /// [`Termination::Interrupted`].
    pub async fn process_async(
        self: Arc<Self>,
        request: impl Into<ProcessRequest>,
    ) -> ProcessResult {
        let request = request.into();
        let fallback = Interrupted::for_request(&request);
        let handle = tokio::task::spawn_blocking(move || self.process(request));
        match handle.await {
            Ok(result) => result,
            Err(e) => fallback.into_result(e),
        }
    }

    /// [`CoRTProcessor::process_with_tools`] on the blocking pool.
    pub async fn process_with_tools_async(
        self: Arc<Self>,
        request: impl Into<ProcessRequest>,
        tools: Vec<ToolDescriptor>,
        executor: Arc<dyn ToolExecutor>,
    ) -> ProcessResult {
        let request = request.into();
        let fallback = Interrupted::for_request(&request);
        let handle = tokio::task::spawn_blocking(move || {
            self.process_with_tools(request, &tools, executor.as_ref())
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let mut result = fallback.into_result(e);
                result.tool_usage = Some(Vec::new());
                result
            }
        }
    }
}

/// What is needed to report a run whose blocking task never returned.
struct Interrupted {
    query: String,
    initial_response: Option<String>,
    started_at: chrono::DateTime<Utc>,
}

impl Interrupted {
    fn for_request(request: &ProcessRequest) -> Self {
        Self {
            query: request.query.clone(),
            initial_response: request.initial_response.clone(),
            started_at: Utc::now(),
        }
    }

    fn into_result(self, error: tokio::task::JoinError) -> ProcessResult {
        warn!("Refinement task failed to complete: {}", error);
        ProcessResult::unrefined(
            RunId::new(),
            self.query,
            self.initial_response,
            Termination::Interrupted,
            self.started_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::ScriptedGenerator;
    use crate::processor::get_recursive_thought_processor;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_process_async() {
        let generator = ScriptedGenerator::replies([r#"["Better"]"#, r#"{"best_index": 1}"#]);
        let processor = Arc::new(get_recursive_thought_processor(generator, 1, 1, false, false));

        let result = processor
            .process_async(ProcessRequest::new("q").with_initial_response("start"))
            .await;

        assert_eq!(result.final_response, "Better");
        assert_eq!(result.termination, Termination::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_processor() {
        let generator = |prompt: &str| -> Result<String, String> {
            if prompt.starts_with("Original query") && prompt.contains("JSON array") {
                Ok(r#"["Improved"]"#.to_string())
            } else {
                Ok(r#"{"best_index": 1}"#.to_string())
            }
        };
        let processor = Arc::new(get_recursive_thought_processor(generator, 1, 1, false, false));

        let runs: Vec<_> = (0..4)
            .map(|i| {
                let processor = Arc::clone(&processor);
                let request = ProcessRequest::new(format!("q{i}")).with_initial_response("start");
                tokio::spawn(async move { processor.process_async(request).await })
            })
            .collect();

        for (i, run) in runs.into_iter().enumerate() {
            let result = run.await.unwrap();
            assert_eq!(result.query, format!("q{i}"));
            assert_eq!(result.final_response, "Improved");
            assert_eq!(result.thinking_trace.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_process_with_tools_async() {
        let generator = ScriptedGenerator::replies([
            r#"["lookup: rust"]"#,
            r#"{"best_index": 1}"#,
        ]);
        let processor = Arc::new(get_recursive_thought_processor(generator, 1, 1, false, false));
        let executor = |_tool: &ToolDescriptor, input: &Value| -> Result<Value, String> {
            Ok(json!(format!("found {}", input.as_str().unwrap_or_default())))
        };

        let result = processor
            .process_with_tools_async(
                ProcessRequest::new("q").with_initial_response("start"),
                vec![ToolDescriptor::new("lookup")],
                Arc::new(executor),
            )
            .await;

        assert_eq!(result.final_response, "lookup result: found rust");
        assert_eq!(result.tool_usage.map(|u| u.len()), Some(1));
    }

    #[test]
    fn test_interrupted_result_keeps_initial_response() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let error = runtime.block_on(async {
            tokio::spawn(async { panic!("lost") }).await.unwrap_err()
        });

        let fallback =
            Interrupted::for_request(&ProcessRequest::new("q").with_initial_response("start"));
        let result = fallback.into_result(error);

        assert_eq!(result.termination, Termination::Interrupted);
        assert_eq!(result.final_response, "start");
        assert_eq!(result.rounds_completed, 0);
    }
}
