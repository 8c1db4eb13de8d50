//! Tool-augmented refinement.
//!
//! In tool mode the alternatives prompt advertises the available tools and
//! asks for calls written as `tool_name: input` on their own line. After a
//! round's alternatives are produced (and after a generated initial
//! response), each such line naming a registered tool is executed and replaced with `tool_name result: output` (or
//! `tool_name error: message`) before the candidates are judged. Every call
//! is recorded, in order, in [`ProcessResult::tool_usage`].

use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::error::{Error, GeneratorError};
use crate::generator::panic_message;
use crate::processor::{CoRTProcessor, ProcessRequest};
use crate::trace::{ProcessResult, ToolInvocationRecord};

static TOOL_CALL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][\w-]*)\s*:\s*(\S.*?)\s*$").expect("invalid regex")
});

/// A tool the generator may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name used in `name: input` calls (matched case-insensitively).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema or example of the expected input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

impl From<&str> for ToolDescriptor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Runs tool calls on behalf of the engine.
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, tool: &ToolDescriptor, input: &Value) -> Result<Value, GeneratorError>;
}

impl<F, E> ToolExecutor for F
where
    F: Fn(&ToolDescriptor, &Value) -> Result<Value, E> + Send + Sync,
    E: Into<GeneratorError>,
{
    fn execute(&self, tool: &ToolDescriptor, input: &Value) -> Result<Value, GeneratorError> {
        self(tool, input).map_err(Into::into)
    }
}

/// A tool call requested in generator output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Index of the registered tool.
    pub tool_index: usize,
    /// Line number (0-based) of the call within the text.
    pub line: usize,
    /// Raw input text after the colon.
    pub raw_input: String,
}

impl ToolCall {
    /// Input handed to the executor: parsed JSON for objects and arrays,
    /// otherwise the raw string.
    pub fn input(&self) -> Value {
        match serde_json::from_str::<Value>(&self.raw_input) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
            _ => Value::String(self.raw_input.clone()),
        }
    }
}

/// Find `tool_name: input` lines that name a registered tool.
pub fn parse_tool_calls(text: &str, tools: &[ToolDescriptor]) -> Vec<ToolCall> {
    text.lines()
        .enumerate()
        .filter_map(|(line, content)| {
            let caps = TOOL_CALL_LINE.captures(content)?;
            let tool_index = tools
                .iter()
                .position(|t| t.name.eq_ignore_ascii_case(&caps[1]))?;
            Some(ToolCall {
                tool_index,
                line,
                raw_input: caps[2].to_string(),
            })
        })
        .collect()
}

/// Prompt section advertising tools and the call syntax.
pub(crate) fn render_tool_section(tools: &[ToolDescriptor]) -> String {
    let mut section = String::from("Available tools:\n");
    for tool in tools {
        match &tool.description {
            Some(description) => section.push_str(&format!("- {}: {}\n", tool.name, description)),
            None => section.push_str(&format!("- {}\n", tool.name)),
        }
        if let Some(parameters) = &tool.parameters {
            section.push_str(&format!("  input: {}\n", parameters));
        }
    }
    section.push_str(
        "To use a tool, write `tool_name: input` on its own line; the line will be replaced with the tool's result.\n",
    );
    section
}

/// Per-run tool state: the registry, the executor and the usage log.
pub(crate) struct ToolSession<'a> {
    tools: &'a [ToolDescriptor],
    executor: &'a dyn ToolExecutor,
    usage: Vec<ToolInvocationRecord>,
    detailed_logging: bool,
}

impl<'a> ToolSession<'a> {
    pub(crate) fn new(
        tools: &'a [ToolDescriptor],
        executor: &'a dyn ToolExecutor,
        detailed_logging: bool,
    ) -> Self {
        Self {
            tools,
            executor,
            usage: Vec::new(),
            detailed_logging,
        }
    }

    pub(crate) fn tools(&self) -> &'a [ToolDescriptor] {
        self.tools
    }

    /// Resolve tool calls in every alternative, in order.
    pub(crate) fn resolve_all(&mut self, alternatives: &mut [String]) {
        for alternative in alternatives.iter_mut() {
            if let Some(resolved) = self.resolve(alternative) {
                *alternative = resolved;
            }
        }
    }

    /// Execute the calls in `text`, returning the rewritten text if any ran.
    ///
    /// Only the call lines change; every other byte, line endings included,
    /// is kept.
    pub(crate) fn resolve(&mut self, text: &str) -> Option<String> {
        let calls = parse_tool_calls(text, self.tools);
        if calls.is_empty() {
            return None;
        }

        let mut replacements: Vec<(usize, String)> = Vec::with_capacity(calls.len());
        for call in calls {
            let tool = &self.tools[call.tool_index];
            let input = call.input();
            if self.detailed_logging {
                info!("Executing tool {} with input: {}", tool.name, call.raw_input);
            }

            let (replacement, output) = match self.execute(tool, &input) {
                Ok(output) => (
                    format!("{} result: {}", tool.name, display_value(&output)),
                    output,
                ),
                Err(e) => {
                    warn!("Error executing tool {}: {}", tool.name, e);
                    let message = match &e {
                        Error::Tool { message, .. } => message.clone(),
                        other => other.to_string(),
                    };
                    (
                        format!("{} error: {}", tool.name, message),
                        json!({ "error": message }),
                    )
                }
            };

            replacements.push((call.line, replacement));
            self.usage.push(ToolInvocationRecord {
                tool: tool.name.clone(),
                input,
                output,
            });
        }

        let mut out = String::with_capacity(text.len());
        for (index, line) in text.split_inclusive('\n').enumerate() {
            match replacements.iter().find(|(line_index, _)| *line_index == index) {
                Some((_, replacement)) => {
                    let content_len = line.trim_end_matches(['\n', '\r']).len();
                    out.push_str(replacement);
                    out.push_str(&line[content_len..]);
                }
                None => out.push_str(line),
            }
        }
        Some(out)
    }

    fn execute(&self, tool: &ToolDescriptor, input: &Value) -> crate::error::Result<Value> {
        match catch_unwind(AssertUnwindSafe(|| self.executor.execute(tool, input))) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(Error::tool(&tool.name, e.to_string())),
            Err(payload) => Err(Error::tool(
                &tool.name,
                format!("tool panicked: {}", panic_message(&*payload)),
            )),
        }
    }

    pub(crate) fn into_usage(self) -> Vec<ToolInvocationRecord> {
        self.usage
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl CoRTProcessor {
    /// Run [`CoRTProcessor::process`] with tool calls resolved in each
    /// round's alternatives.
    ///
    /// When the request carries no initial response, the generated one is
    /// also offered the tools and has its calls resolved before round 0 is
    /// recorded.
    ///
    /// `tool_usage` is always present on the result. Without any tool calls
    /// the run is otherwise identical to a plain `process`.
    pub fn process_with_tools(
        &self,
        request: impl Into<ProcessRequest>,
        tools: &[ToolDescriptor],
        executor: &dyn ToolExecutor,
    ) -> ProcessResult {
        if self.config().detailed_logging {
            let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            info!("Processing with tools: {}", names.join(", "));
        }

        let mut session = ToolSession::new(tools, executor, self.config().detailed_logging);
        let mut result = self.run(request.into(), Some(&mut session));
        result.tool_usage = Some(session.into_usage());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::ScriptedGenerator;
    use crate::processor::get_recursive_thought_processor;
    use pretty_assertions::assert_eq;

    fn tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("calculator").with_description("Evaluates arithmetic"),
            ToolDescriptor::new("weather"),
        ]
    }

    fn calculator(tool: &ToolDescriptor, input: &Value) -> Result<Value, String> {
        match (tool.name.as_str(), input.as_str()) {
            ("calculator", Some("2+2")) => Ok(json!("4")),
            ("weather", _) => Ok(json!({"forecast": "sunny"})),
            _ => Err(format!("cannot handle {input}")),
        }
    }

    #[test]
    fn test_parse_tool_calls() {
        let text = "Let me check.\nCalculator: 2+2\nunknown: ignored\nweather: {\"city\": \"Oslo\"}";
        let calls = parse_tool_calls(text, &tools());

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_index, 0);
        assert_eq!(calls[0].line, 1);
        assert_eq!(calls[0].input(), json!("2+2"));
        assert_eq!(calls[1].tool_index, 1);
        assert_eq!(calls[1].input(), json!({"city": "Oslo"}));
    }

    #[test]
    fn test_result_lines_are_not_calls() {
        let text = "calculator result: 4\ncalculator error: boom";
        assert!(parse_tool_calls(text, &tools()).is_empty());
    }

    #[test]
    fn test_session_resolves_and_records_in_order() {
        let tools = tools();
        let mut session = ToolSession::new(&tools, &calculator, false);
        let mut alternatives = vec![
            "The answer:\ncalculator: 2+2".to_string(),
            "No tools here".to_string(),
            "weather: today\ncalculator: 1/0".to_string(),
        ];

        session.resolve_all(&mut alternatives);

        assert_eq!(alternatives[0], "The answer:\ncalculator result: 4");
        assert_eq!(alternatives[1], "No tools here");
        assert_eq!(
            alternatives[2],
            "weather result: {\"forecast\":\"sunny\"}\ncalculator error: cannot handle \"1/0\""
        );

        let usage = session.into_usage();
        assert_eq!(usage.len(), 3);
        assert_eq!(usage[0].tool, "calculator");
        assert_eq!(usage[1].tool, "weather");
        assert_eq!(usage[2].output, json!({"error": "cannot handle \"1/0\""}));
        assert!(usage[2].is_error());
    }

    #[test]
    fn test_resolve_keeps_line_endings() {
        let tools = tools();
        let mut session = ToolSession::new(&tools, &calculator, false);

        let resolved = session
            .resolve("Intro\r\ncalculator: 2+2\r\nOutro\n")
            .unwrap();
        assert_eq!(resolved, "Intro\r\ncalculator result: 4\r\nOutro\n");

        let resolved = session.resolve("calculator: 2+2\n\n").unwrap();
        assert_eq!(resolved, "calculator result: 4\n\n");
        assert_eq!(session.resolve("no calls\r\n"), None);
    }

    #[test]
    fn test_panicking_executor_is_recorded_as_error() {
        let tools = tools();
        let executor = |_tool: &ToolDescriptor, _input: &Value| -> Result<Value, String> {
            panic!("executor crashed")
        };
        let mut session = ToolSession::new(&tools, &executor, false);
        let mut alternatives = vec!["calculator: 2+2".to_string()];
        session.resolve_all(&mut alternatives);

        assert!(alternatives[0].starts_with("calculator error: tool panicked"));
        assert!(session.into_usage()[0].is_error());
    }

    #[test]
    fn test_process_with_tools() {
        let generator = ScriptedGenerator::replies([
            r#"["Plain answer", "Computed:\ncalculator: 2+2"]"#,
            r#"{"best_index": 2}"#,
        ]);
        let processor = get_recursive_thought_processor(generator.clone(), 1, 2, false, false);

        let result = processor.process_with_tools(
            ProcessRequest::new("What is 2+2?").with_initial_response("About four"),
            &tools(),
            &calculator,
        );

        assert_eq!(result.final_response, "Computed:\ncalculator result: 4");
        assert_eq!(result.rounds_completed, 1);
        let usage = result.tool_usage.as_ref().unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].input, json!("2+2"));
        assert_eq!(usage[0].output, json!("4"));

        let prompts = generator.prompts();
        assert!(prompts[0].contains("Available tools:"));
        assert!(prompts[0].contains("- calculator: Evaluates arithmetic"));
        assert!(prompts[1].contains("calculator result: 4"));
    }

    #[test]
    fn test_generated_initial_response_uses_tools() {
        let generator = ScriptedGenerator::replies([
            "Let me compute.\ncalculator: 2+2",
            r#"["Four"]"#,
            r#"{"best_index": 0}"#,
        ]);
        let processor = get_recursive_thought_processor(generator.clone(), 1, 1, false, false);

        let result = processor.process_with_tools("What is 2+2?", &tools(), &calculator);

        assert_eq!(result.initial_response, "Let me compute.\ncalculator result: 4");
        assert_eq!(
            result.thinking_trace[0].response.as_deref(),
            Some("Let me compute.\ncalculator result: 4")
        );
        assert_eq!(result.final_response, result.initial_response);
        let usage = result.tool_usage.as_ref().unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].output, json!("4"));

        let prompts = generator.prompts();
        assert!(prompts[0].starts_with("Please respond to this query"));
        assert!(prompts[0].contains("- calculator: Evaluates arithmetic"));
    }

    #[test]
    fn test_supplied_initial_response_is_left_alone() {
        let generator = ScriptedGenerator::replies([r#"["Alt"]"#, r#"{"best_index": 0}"#]);
        let processor = get_recursive_thought_processor(generator, 1, 1, false, false);

        let result = processor.process_with_tools(
            ProcessRequest::new("q").with_initial_response("calculator: 2+2"),
            &tools(),
            &calculator,
        );

        assert_eq!(result.initial_response, "calculator: 2+2");
        assert_eq!(result.tool_usage, Some(vec![]));
    }

    #[test]
    fn test_process_with_tools_without_calls_matches_process() {
        let script = [r#"["Alt 1", "Alt 2"]"#, r#"{"best_index": 1}"#];
        let request = ProcessRequest::new("q").with_initial_response("start");

        let plain = get_recursive_thought_processor(
            ScriptedGenerator::replies(script),
            1,
            2,
            false,
            false,
        )
        .process(request.clone());
        let with_tools = get_recursive_thought_processor(
            ScriptedGenerator::replies(script),
            1,
            2,
            false,
            false,
        )
        .process_with_tools(request, &tools(), &calculator);

        assert_eq!(with_tools.final_response, plain.final_response);
        assert_eq!(with_tools.rounds_completed, plain.rounds_completed);
        assert_eq!(with_tools.tool_usage, Some(vec![]));
        assert_eq!(plain.tool_usage, None);
    }
}
