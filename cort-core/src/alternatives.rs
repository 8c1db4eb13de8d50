//! Alternative generation for a refinement round.
//!
//! Strategy chain, in order:
//! 1. one structured call asking for a JSON array of alternatives;
//! 2. if the reply is prose, numbered/quoted/paragraph extraction;
//! 3. if neither parses (or the structured call fails), one call per
//!    requested alternative, keeping the raw replies;
//! 4. otherwise an empty set, which ends the run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CoRTConfig;
use crate::error::Stage;
use crate::extract::{extract_alternatives_from_text, parse_string_list, TextPattern};
use crate::generator::{invoke, Generator};
use crate::tools::{render_tool_section, ToolDescriptor};

/// Which tier of the strategy chain produced a set of alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeSource {
    /// Parsed from a JSON array.
    Structured,
    /// Extracted from a numbered list.
    NumberedList,
    /// Extracted from quoted substrings.
    Quoted,
    /// Extracted from blank-line separated paragraphs.
    Paragraphs,
    /// Collected from one generator call per alternative.
    PerAlternativeCalls,
    /// Every tier failed.
    Exhausted,
}

impl From<TextPattern> for AlternativeSource {
    fn from(pattern: TextPattern) -> Self {
        match pattern {
            TextPattern::NumberedList => Self::NumberedList,
            TextPattern::Quoted => Self::Quoted,
            TextPattern::Paragraphs => Self::Paragraphs,
        }
    }
}

impl std::fmt::Display for AlternativeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::NumberedList => write!(f, "numbered_list"),
            Self::Quoted => write!(f, "quoted"),
            Self::Paragraphs => write!(f, "paragraphs"),
            Self::PerAlternativeCalls => write!(f, "per_alternative_calls"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Alternatives proposed in one round, tagged with their source tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeSet {
    pub alternatives: Vec<String>,
    pub source: AlternativeSource,
}

impl AlternativeSet {
    pub fn new(alternatives: Vec<String>, source: AlternativeSource) -> Self {
        Self {
            alternatives,
            source,
        }
    }

    /// An empty set: nothing could be produced.
    pub fn exhausted() -> Self {
        Self::new(Vec::new(), AlternativeSource::Exhausted)
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }
}

/// Produces candidate responses that compete with the current best.
pub struct AlternativeGenerator<'a> {
    generator: &'a dyn Generator,
    config: &'a CoRTConfig,
    task_context: Option<&'a Value>,
    tools: &'a [ToolDescriptor],
}

impl<'a> AlternativeGenerator<'a> {
    pub fn new(generator: &'a dyn Generator, config: &'a CoRTConfig) -> Self {
        Self {
            generator,
            config,
            task_context: None,
            tools: &[],
        }
    }

    /// Include task context in every prompt.
    pub fn with_task_context(mut self, context: Option<&'a Value>) -> Self {
        self.task_context = context;
        self
    }

    /// Advertise tools (and the call syntax) in every prompt.
    pub fn with_tools(mut self, tools: &'a [ToolDescriptor]) -> Self {
        self.tools = tools;
        self
    }

    /// Produce up to `count` alternatives to `current_best`.
    ///
    /// Never fails; an empty set means every tier came up empty.
    pub fn generate_alternatives(
        &self,
        query: &str,
        current_best: &str,
        count: usize,
        prompt_instructions: Option<&str>,
    ) -> AlternativeSet {
        if count == 0 {
            return AlternativeSet::exhausted();
        }

        let prompt = self.structured_prompt(query, current_best, count, prompt_instructions);
        match invoke(self.generator, Stage::Alternatives, &prompt) {
            Ok(raw) => {
                if let Some(items) = parse_string_list(&raw) {
                    if items.is_empty() {
                        return AlternativeSet::new(items, AlternativeSource::Structured);
                    }
                    let items = fresh_alternatives(items, current_best, count);
                    if !items.is_empty() {
                        if self.config.detailed_logging {
                            info!("Generated {} structured alternatives", items.len());
                        }
                        return AlternativeSet::new(items, AlternativeSource::Structured);
                    }
                    debug!("Structured alternatives only repeated the current best");
                }

                if let Some((pattern, items)) = extract_alternatives_from_text(&raw) {
                    let items = fresh_alternatives(items, current_best, count);
                    if !items.is_empty() {
                        if self.config.detailed_logging {
                            info!(
                                "Extracted {} alternatives from {} text",
                                items.len(),
                                pattern
                            );
                        }
                        return AlternativeSet::new(items, pattern.into());
                    }
                }

                debug!("Alternatives reply was not parseable, generating one at a time");
            }
            Err(e) => {
                warn!("Error generating alternatives: {}", e);
            }
        }

        self.per_alternative_calls(query, current_best, count, prompt_instructions)
    }

    /// Fallback tier: one generator call per requested alternative.
    fn per_alternative_calls(
        &self,
        query: &str,
        current_best: &str,
        count: usize,
        prompt_instructions: Option<&str>,
    ) -> AlternativeSet {
        let mut alternatives = Vec::with_capacity(count);

        for number in 1..=count {
            let prompt = self.single_prompt(query, current_best, number, prompt_instructions);
            match invoke(self.generator, Stage::AlternativeFallback, &prompt) {
                Ok(text) if is_fresh(&text, current_best, &alternatives) => alternatives.push(text),
                Ok(_) => debug!("Alternative #{} was empty or a repeat", number),
                Err(e) => warn!("Error generating alternative #{}: {}", number, e),
            }
        }

        if alternatives.is_empty() {
            warn!("All {} fallback alternative calls failed", count);
            return AlternativeSet::exhausted();
        }

        if self.config.detailed_logging {
            info!(
                "Generated {} alternatives with per-alternative calls",
                alternatives.len()
            );
        }
        AlternativeSet::new(alternatives, AlternativeSource::PerAlternativeCalls)
    }

    fn structured_prompt(
        &self,
        query: &str,
        current_best: &str,
        count: usize,
        prompt_instructions: Option<&str>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("Original query: \"{}\"\n\n", query));
        prompt.push_str(&format!("Current best response:\n\"{}\"\n\n", current_best));
        prompt.push_str(&format!(
            "Generate {} alternative responses that might be better than the current best response.\n",
            count
        ));
        prompt.push_str("Try to approach the problem from different angles or perspectives.\n\n");
        self.push_shared_sections(&mut prompt, prompt_instructions);
        prompt.push_str(
            "Format your response as a JSON array of strings, with each string being an alternative response.\n",
        );
        prompt
    }

    fn single_prompt(
        &self,
        query: &str,
        current_best: &str,
        number: usize,
        prompt_instructions: Option<&str>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("Original query: \"{}\"\n\n", query));
        prompt.push_str(&format!("Current response:\n\"{}\"\n\n", current_best));
        self.push_shared_sections(&mut prompt, prompt_instructions);
        prompt.push_str(&format!(
            "Generate a better alternative response (alternative #{}):\n",
            number
        ));
        prompt
    }

    fn push_shared_sections(&self, prompt: &mut String, prompt_instructions: Option<&str>) {
        if let Some(context) = self.task_context {
            prompt.push_str("Task context:\n```json\n");
            prompt.push_str(&serde_json::to_string_pretty(context).unwrap_or_default());
            prompt.push_str("\n```\n\n");
        }
        if let Some(instructions) = prompt_instructions {
            prompt.push_str(&format!("Special instructions: {}\n\n", instructions));
        }
        if !self.tools.is_empty() {
            prompt.push_str(&render_tool_section(self.tools));
            prompt.push('\n');
        }
    }
}

/// Drop blanks, repeats and echoes of `current_best`, keeping at most `count`.
fn fresh_alternatives(items: Vec<String>, current_best: &str, count: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(count);
    for item in items {
        if out.len() == count {
            break;
        }
        if is_fresh(&item, current_best, &out) {
            out.push(item);
        }
    }
    out
}

/// Non-blank and different (after trimming) from the current best and from
/// everything already kept.
fn is_fresh(text: &str, current_best: &str, kept: &[String]) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text != current_best.trim()
        && !kept.iter().any(|existing| existing.trim() == text)
}
