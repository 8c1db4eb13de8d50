//! Candidate evaluation.
//!
//! Candidates are `[current_best] + alternatives`, so `best_index == 0`
//! means nothing beat the current best. A structured JSON judgement is
//! preferred; free text falls back to [`extract_best_index_from_text`]; a
//! failed call keeps the current best.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::CoRTConfig;
use crate::error::Stage;
use crate::extract::{extract_best_index_from_text, find_json_object, value_as_index};
use crate::generator::{invoke, Generator};

/// How `best_index` was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Read from a JSON object's `best_index`.
    Structured,
    /// Extracted from free-form text.
    FreeText,
    /// Only one candidate; nothing to judge.
    Unopposed,
    /// The evaluation call failed; the current best is kept.
    Failed,
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::FreeText => write!(f, "free_text"),
            Self::Unopposed => write!(f, "unopposed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of judging one round's candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Index into the candidate list; always in range.
    pub best_index: usize,
    /// Structured judgement, `{"raw": text}` for free text, `{}` on failure.
    pub evaluation: Value,
    pub method: SelectionMethod,
}

impl Evaluation {
    pub fn new(best_index: usize, evaluation: Value, method: SelectionMethod) -> Self {
        Self {
            best_index,
            evaluation,
            method,
        }
    }

    /// Keep the current best with an empty payload.
    pub fn keep_current(method: SelectionMethod) -> Self {
        Self::new(0, Value::Object(Map::new()), method)
    }
}

/// Judges candidates and picks the best one.
pub struct Evaluator<'a> {
    generator: &'a dyn Generator,
    config: &'a CoRTConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(generator: &'a dyn Generator, config: &'a CoRTConfig) -> Self {
        Self { generator, config }
    }

    /// Pick the best of `candidates` (index 0 is the current best).
    ///
    /// Never fails and always returns an index within `candidates`.
    pub fn evaluate(
        &self,
        query: &str,
        candidates: &[String],
        prompt_instructions: Option<&str>,
    ) -> Evaluation {
        if candidates.len() <= 1 {
            return Evaluation::keep_current(SelectionMethod::Unopposed);
        }

        let prompt = evaluation_prompt(query, candidates, prompt_instructions);
        let raw = match invoke(self.generator, Stage::Evaluation, &prompt) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error in evaluation: {}", e);
                return Evaluation::keep_current(SelectionMethod::Failed);
            }
        };

        if let Some(obj) = find_json_object(&raw) {
            let structured_index = obj
                .get("best_index")
                .and_then(value_as_index)
                .filter(|i| *i < candidates.len());
            if let Some(best_index) = structured_index {
                if self.config.detailed_logging {
                    info!("Evaluation successful, selected alternative {}", best_index);
                }
                return Evaluation::new(best_index, Value::Object(obj), SelectionMethod::Structured);
            }
        }

        let best_index = extract_best_index_from_text(&raw, candidates.len());
        if self.config.detailed_logging {
            info!("Structured evaluation unavailable, extracted best index {}", best_index);
        }
        Evaluation::new(best_index, json!({ "raw": raw }), SelectionMethod::FreeText)
    }
}

fn evaluation_prompt(query: &str, candidates: &[String], prompt_instructions: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Original query: \"{}\"\n\n", query));
    prompt.push_str("Please evaluate these alternative responses and select the best one.\n\n");
    prompt.push_str("Responses to evaluate:\n\n");
    for (i, candidate) in candidates.iter().enumerate() {
        if i == 0 {
            prompt.push_str("Response 1 (current best):\n");
        } else {
            prompt.push_str(&format!("Response {}:\n", i + 1));
        }
        prompt.push_str(candidate);
        prompt.push_str("\n\n");
    }
    prompt.push_str("For each response, provide a score from 1-10 and brief explanation.\n");
    prompt.push_str("Then identify which response is the best and explain why.\n\n");
    if let Some(instructions) = prompt_instructions {
        prompt.push_str(&format!("Special instructions: {}\n\n", instructions));
    }
    prompt.push_str("Format your evaluation as a JSON object with:\n");
    prompt.push_str(
        "1. \"evaluations\": An array of objects with \"response\", \"score\", and \"explanation\"\n",
    );
    prompt.push_str(
        "2. \"best_index\": The 0-based index of the best response (Response 1 is index 0)\n",
    );
    prompt.push_str("3. \"best_explanation\": Why the chosen response is best\n");
    prompt
}
