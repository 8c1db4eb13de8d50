//! Thinking trace and run results.
//!
//! A run produces a [`ProcessResult`] whose `thinking_trace` records every
//! round in order, starting with the initial response at round 0. Field names
//! serialize in snake_case so agent adapters can hand the result straight to
//! JSON consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::alternatives::{AlternativeSet, AlternativeSource};
use crate::error::Result;
use crate::evaluator::{Evaluation, SelectionMethod};

/// Unique identifier for a refinement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One round of the thinking trace.
///
/// Round 0 carries only the initial `response`. Later rounds carry the new
/// `alternatives`, the `best_index` chosen among `[current_best] +
/// alternatives` (0 means the current best was kept), the evaluator's
/// payload, and the `response` carried into the next round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingTraceEntry {
    /// Round number, starting at 0.
    pub round: usize,
    /// Best response after this round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Alternatives proposed in this round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<String>>,
    /// Selected candidate, 0 = current best kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_index: Option<usize>,
    /// Evaluator payload (structured judgement or raw text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Value>,
    /// Which extraction tier produced the alternatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives_source: Option<AlternativeSource>,
    /// Which evaluation tier produced `best_index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionMethod>,
    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
}

impl ThinkingTraceEntry {
    /// Round 0: the response refinement starts from.
    pub fn initial(response: impl Into<String>) -> Self {
        Self {
            round: 0,
            response: Some(response.into()),
            alternatives: None,
            best_index: None,
            evaluation: None,
            alternatives_source: None,
            selection: None,
            recorded_at: Utc::now(),
        }
    }

    /// A completed round.
    pub fn completed(
        round: usize,
        alternatives: AlternativeSet,
        evaluation: Evaluation,
        response: impl Into<String>,
    ) -> Self {
        Self {
            round,
            response: Some(response.into()),
            alternatives: Some(alternatives.alternatives),
            best_index: Some(evaluation.best_index),
            evaluation: Some(evaluation.evaluation),
            alternatives_source: Some(alternatives.source),
            selection: Some(evaluation.method),
            recorded_at: Utc::now(),
        }
    }

    /// A round that produced no alternatives and stopped the run.
    pub fn without_alternatives(
        round: usize,
        source: AlternativeSource,
        response: impl Into<String>,
    ) -> Self {
        Self {
            round,
            response: Some(response.into()),
            alternatives: Some(Vec::new()),
            best_index: None,
            evaluation: None,
            alternatives_source: Some(source),
            selection: None,
            recorded_at: Utc::now(),
        }
    }

    /// Whether this round adopted one of its alternatives.
    pub fn adopted_alternative(&self) -> bool {
        matches!(self.best_index, Some(i) if i > 0)
    }

    /// The alternative selected in this round, if one was adopted.
    pub fn selected_alternative(&self) -> Option<&str> {
        let index = self.best_index?.checked_sub(1)?;
        self.alternatives.as_ref()?.get(index).map(String::as_str)
    }
}

/// A single tool call made while resolving a round's alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    /// Registered tool name.
    pub tool: String,
    /// Input passed to the executor.
    pub input: Value,
    /// Executor output, or `{"error": message}` on failure.
    pub output: Value,
}

impl ToolInvocationRecord {
    /// Whether the executor failed for this call.
    pub fn is_error(&self) -> bool {
        self.output
            .as_object()
            .is_some_and(|obj| obj.len() == 1 && obj.contains_key("error"))
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// All planned rounds ran.
    Completed,
    /// A round produced no alternatives.
    NoAlternatives,
    /// No initial response was supplied and generating one failed.
    InitialResponseFailed,
    /// The run was lost before it could finish (async bridge only).
    Interrupted,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::NoAlternatives => write!(f, "no_alternatives"),
            Self::InitialResponseFailed => write!(f, "initial_response_failed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Result of a refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Run identifier, also recorded on the tracing span.
    pub id: RunId,
    /// The query that was refined.
    pub query: String,
    /// Response refinement started from.
    pub initial_response: String,
    /// Best response at the end of the run.
    pub final_response: String,
    /// Ordered per-round record, starting at round 0.
    pub thinking_trace: Vec<ThinkingTraceEntry>,
    /// Rounds that produced alternatives and were evaluated.
    pub rounds_completed: usize,
    /// Rounds the estimator asked for.
    pub rounds_planned: usize,
    /// Why the run stopped.
    pub termination: Termination,
    /// Tool calls, present only for tool-augmented runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_usage: Option<Vec<ToolInvocationRecord>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ProcessResult {
    /// A result that performed no refinement.
    ///
    /// `final_response` equals `initial_response` (empty if none was given).
    pub fn unrefined(
        id: RunId,
        query: impl Into<String>,
        initial_response: Option<String>,
        termination: Termination,
        started_at: DateTime<Utc>,
    ) -> Self {
        let initial_response = initial_response.unwrap_or_default();
        Self {
            id,
            query: query.into(),
            final_response: initial_response.clone(),
            thinking_trace: vec![ThinkingTraceEntry::initial(initial_response.clone())],
            initial_response,
            rounds_completed: 0,
            rounds_planned: 0,
            termination,
            tool_usage: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Whether the final response differs from the initial one.
    pub fn improved(&self) -> bool {
        self.final_response != self.initial_response
    }

    /// Wall-clock duration of the run in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }

    /// The most recent trace entry.
    pub fn last_entry(&self) -> Option<&ThinkingTraceEntry> {
        self.thinking_trace.last()
    }

    /// The `cort_thinking` artifact agent adapters attach to task responses.
    pub fn to_artifact(&self) -> Result<Value> {
        Ok(json!({
            "type": "cort_thinking",
            "content": {
                "rounds_completed": self.rounds_completed,
                "thinking_trace": serde_json::to_value(&self.thinking_trace)?,
                "tool_usage": serde_json::to_value(self.tool_usage.as_deref().unwrap_or_default())?,
            }
        }))
    }

    /// Render the run as Markdown for human review.
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# CoRT Thinking Trace\n\n");
        out.push_str(&format!("**Query:** {}\n\n", self.query));
        out.push_str(&format!(
            "**Rounds:** {} of {} ({})\n\n",
            self.rounds_completed, self.rounds_planned, self.termination
        ));

        for entry in &self.thinking_trace {
            if entry.round == 0 {
                out.push_str("## Round 0: Initial Response\n\n");
                out.push_str(entry.response.as_deref().unwrap_or(""));
                out.push_str("\n\n");
                continue;
            }

            out.push_str(&format!("## Round {}\n\n", entry.round));
            let alternatives = entry.alternatives.as_deref().unwrap_or_default();
            if alternatives.is_empty() {
                out.push_str("_No alternatives were produced._\n\n");
                continue;
            }
            if let Some(source) = entry.alternatives_source {
                out.push_str(&format!("Alternatives ({source}):\n\n"));
            }
            for (i, alt) in alternatives.iter().enumerate() {
                let marker = if entry.best_index == Some(i + 1) {
                    " **(selected)**"
                } else {
                    ""
                };
                out.push_str(&format!("{}. {}{}\n", i + 1, alt, marker));
            }
            out.push('\n');
            if entry.best_index == Some(0) {
                out.push_str("Kept the current best response.\n\n");
            }
        }

        if let Some(usage) = self.tool_usage.as_deref().filter(|u| !u.is_empty()) {
            out.push_str("## Tool Usage\n\n");
            for record in usage {
                out.push_str(&format!(
                    "- `{}` {} -> {}\n",
                    record.tool, record.input, record.output
                ));
            }
            out.push('\n');
        }

        out.push_str("## Final Response\n\n");
        out.push_str(&self.final_response);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_entry(best_index: usize) -> ThinkingTraceEntry {
        ThinkingTraceEntry::completed(
            1,
            AlternativeSet::new(
                vec!["Alt A".to_string(), "Alt B".to_string()],
                AlternativeSource::Structured,
            ),
            Evaluation::new(best_index, json!({"best_index": best_index}), SelectionMethod::Structured),
            "Alt B",
        )
    }

    #[test]
    fn test_initial_entry_serialization_omits_empty_fields() {
        let entry = ThinkingTraceEntry::initial("Initial response");
        let value = serde_json::to_value(&entry).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("round"), Some(&json!(0)));
        assert_eq!(obj.get("response"), Some(&json!("Initial response")));
        assert!(!obj.contains_key("alternatives"));
        assert!(!obj.contains_key("best_index"));
    }

    #[test]
    fn test_selected_alternative() {
        let entry = round_entry(2);
        assert!(entry.adopted_alternative());
        assert_eq!(entry.selected_alternative(), Some("Alt B"));

        let kept = round_entry(0);
        assert!(!kept.adopted_alternative());
        assert_eq!(kept.selected_alternative(), None);
    }

    #[test]
    fn test_round_entry_serializes_sources() {
        let value = serde_json::to_value(round_entry(1)).unwrap();
        assert_eq!(value["alternatives_source"], json!("structured"));
        assert_eq!(value["selection"], json!("structured"));
        assert_eq!(value["alternatives"], json!(["Alt A", "Alt B"]));
    }

    #[test]
    fn test_unrefined_result() {
        let result = ProcessResult::unrefined(
            RunId::new(),
            "q",
            Some("start".to_string()),
            Termination::Interrupted,
            Utc::now(),
        );
        assert_eq!(result.final_response, "start");
        assert_eq!(result.thinking_trace.len(), result.rounds_completed + 1);
        assert!(!result.improved());
    }

    #[test]
    fn test_artifact_shape() {
        let mut result =
            ProcessResult::unrefined(RunId::new(), "q", None, Termination::Completed, Utc::now());
        result.thinking_trace.push(round_entry(1));
        result.rounds_completed = 1;

        let artifact = result.to_artifact().unwrap();
        assert_eq!(artifact["type"], json!("cort_thinking"));
        assert_eq!(artifact["content"]["rounds_completed"], json!(1));
        assert_eq!(artifact["content"]["tool_usage"], json!([]));
        assert_eq!(
            artifact["content"]["thinking_trace"]
                .as_array()
                .map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn test_render_markdown_marks_selection() {
        let mut result = ProcessResult::unrefined(
            RunId::new(),
            "What is Rust?",
            Some("A language".to_string()),
            Termination::Completed,
            Utc::now(),
        );
        result.thinking_trace.push(round_entry(2));
        result.rounds_completed = 1;
        result.final_response = "Alt B".to_string();

        let md = result.render_markdown();
        assert!(md.contains("**Query:** What is Rust?"));
        assert!(md.contains("2. Alt B **(selected)**"));
        assert!(md.contains("1. Alt A\n"));
        assert!(md.ends_with("Alt B\n"));
    }

    #[test]
    fn test_tool_record_error_detection() {
        let ok = ToolInvocationRecord {
            tool: "calculator".to_string(),
            input: json!("2+2"),
            output: json!("4"),
        };
        let failed = ToolInvocationRecord {
            tool: "calculator".to_string(),
            input: json!("2/0"),
            output: json!({"error": "division by zero"}),
        };
        assert!(!ok.is_error());
        assert!(failed.is_error());
    }
}
