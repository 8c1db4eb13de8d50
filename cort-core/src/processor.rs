//! The refinement loop.
//!
//! [`CoRTProcessor`] ties the pieces together: it obtains an initial
//! response, asks the [`RoundEstimator`] how many rounds to run, and then
//! repeatedly pits the current best against fresh alternatives until the
//! rounds run out or a round produces nothing to compare.
//!
//! A processor holds only the generator and an immutable config. All
//! per-run state lives on the stack of [`CoRTProcessor::process`], so one
//! instance can serve concurrent callers.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn};

use crate::alternatives::{AlternativeGenerator, AlternativeSet};
use crate::config::CoRTConfig;
use crate::error::{Result, Stage};
use crate::evaluator::{Evaluation, Evaluator};
use crate::generator::{invoke, Generator};
use crate::rounds::RoundEstimator;
use crate::tools::{render_tool_section, ToolDescriptor, ToolSession};
use crate::trace::{ProcessResult, RunId, Termination, ThinkingTraceEntry};

/// Input to a refinement run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub query: String,
    /// Starting point; generated when absent or blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_response: Option<String>,
    /// Free-form guidance forwarded verbatim to every prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_instructions: Option<String>,
    /// Structured context rendered as JSON into the prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_context: Option<Value>,
}

impl ProcessRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_initial_response(mut self, response: impl Into<String>) -> Self {
        self.initial_response = Some(response.into());
        self
    }

    pub fn with_prompt_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.prompt_instructions = Some(instructions.into());
        self
    }

    pub fn with_task_context(mut self, context: Value) -> Self {
        self.task_context = Some(context);
        self
    }

    /// The supplied initial response, ignoring blank text.
    fn supplied_initial_response(&self) -> Option<&str> {
        self.initial_response
            .as_deref()
            .filter(|r| !r.trim().is_empty())
    }
}

impl From<&str> for ProcessRequest {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for ProcessRequest {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}

/// Recursive self-refinement engine.
#[derive(Clone)]
pub struct CoRTProcessor {
    generator: Arc<dyn Generator>,
    config: CoRTConfig,
}

impl std::fmt::Debug for CoRTProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoRTProcessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoRTProcessor {
    /// Create a processor, rejecting invalid configs.
    pub fn new(generator: impl Generator + 'static, config: CoRTConfig) -> Result<Self> {
        Self::from_shared(Arc::new(generator), config)
    }

    /// Create a processor around a generator that is shared elsewhere.
    pub fn from_shared(generator: Arc<dyn Generator>, config: CoRTConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { generator, config })
    }

    pub fn builder(generator: impl Generator + 'static) -> CoRTProcessorBuilder {
        CoRTProcessorBuilder::new(generator)
    }

    pub fn config(&self) -> &CoRTConfig {
        &self.config
    }

    /// Number of rounds a query would get.
    pub fn determine_rounds(&self, query: &str) -> usize {
        RoundEstimator::new(self.generator.as_ref(), &self.config).determine_rounds(query)
    }

    /// One round's worth of alternatives to `current_best`.
    pub fn generate_alternatives(
        &self,
        query: &str,
        current_best: &str,
        prompt_instructions: Option<&str>,
    ) -> AlternativeSet {
        AlternativeGenerator::new(self.generator.as_ref(), &self.config).generate_alternatives(
            query,
            current_best,
            self.config.alternatives_per_round,
            prompt_instructions,
        )
    }

    /// Judge `candidates`, where index 0 is the current best.
    pub fn evaluate(
        &self,
        query: &str,
        candidates: &[String],
        prompt_instructions: Option<&str>,
    ) -> Evaluation {
        Evaluator::new(self.generator.as_ref(), &self.config).evaluate(
            query,
            candidates,
            prompt_instructions,
        )
    }

    /// Refine a response to `request.query`.
    ///
    /// Never fails: backend errors degrade to keeping the current best, and
    /// the result's [`Termination`] says how far the run got.
    pub fn process(&self, request: impl Into<ProcessRequest>) -> ProcessResult {
        self.run(request.into(), None)
    }

    pub(crate) fn run(
        &self,
        request: ProcessRequest,
        mut tools: Option<&mut ToolSession<'_>>,
    ) -> ProcessResult {
        let id = RunId::new();
        let started_at = Utc::now();
        let span = info_span!("cort.process", run_id = %id, rounds = tracing::field::Empty);
        let _guard = span.enter();

        let config = &self.config;
        if config.detailed_logging {
            info!("Processing query: {}", config.preview(&request.query));
        }

        let instructions = request.prompt_instructions.as_deref();
        let context = request.task_context.as_ref();

        let tool_list = tools.as_deref().map(ToolSession::tools).unwrap_or_default();

        let supplied = request.supplied_initial_response().map(str::to_string);
        let initial_response = match supplied {
            Some(response) => response,
            None => match self.initial_response(&request, tool_list) {
                Ok(response) => match tools.as_deref_mut() {
                    Some(session) => session.resolve(&response).unwrap_or(response),
                    None => response,
                },
                Err(e) => {
                    warn!("Error generating initial response: {}", e);
                    return ProcessResult::unrefined(
                        id,
                        request.query,
                        None,
                        Termination::InitialResponseFailed,
                        started_at,
                    );
                }
            },
        };
        if config.detailed_logging {
            info!("Initial response: {}", config.preview(&initial_response));
        }

        let rounds_planned = self.determine_rounds(&request.query);
        span.record("rounds", rounds_planned);

        let mut current_best = initial_response.clone();
        let mut thinking_trace = vec![ThinkingTraceEntry::initial(initial_response.clone())];
        let mut rounds_completed = 0;
        let mut termination = Termination::Completed;

        let alternative_generator = AlternativeGenerator::new(self.generator.as_ref(), config)
            .with_task_context(context)
            .with_tools(tool_list);

        for round in 1..=rounds_planned {
            if config.detailed_logging {
                info!("=== Round {}/{} ===", round, rounds_planned);
            }

            let mut set = alternative_generator.generate_alternatives(
                &request.query,
                &current_best,
                config.alternatives_per_round,
                instructions,
            );
            if set.is_empty() {
                warn!("No alternatives generated in round {}, stopping early", round);
                thinking_trace.push(ThinkingTraceEntry::without_alternatives(
                    round,
                    set.source,
                    current_best.clone(),
                ));
                termination = Termination::NoAlternatives;
                break;
            }

            if let Some(session) = tools.as_deref_mut() {
                session.resolve_all(&mut set.alternatives);
            }

            let mut candidates = Vec::with_capacity(set.len() + 1);
            candidates.push(current_best.clone());
            candidates.extend(set.alternatives.iter().cloned());
            let evaluation = self.evaluate(&request.query, &candidates, instructions);

            if let Some(adopted) = evaluation
                .best_index
                .checked_sub(1)
                .and_then(|i| set.alternatives.get(i))
            {
                current_best = adopted.clone();
                if config.detailed_logging {
                    info!(
                        "Round {}: adopted alternative {}: {}",
                        round,
                        evaluation.best_index,
                        config.preview(&current_best)
                    );
                }
            } else if config.detailed_logging {
                info!("Round {}: kept the current best response", round);
            }

            thinking_trace.push(ThinkingTraceEntry::completed(
                round,
                set,
                evaluation,
                current_best.clone(),
            ));
            rounds_completed = round;
        }

        if config.detailed_logging {
            info!(
                "Finished after {} of {} rounds ({})",
                rounds_completed, rounds_planned, termination
            );
        }

        ProcessResult {
            id,
            query: request.query,
            initial_response,
            final_response: current_best,
            thinking_trace,
            rounds_completed,
            rounds_planned,
            termination,
            tool_usage: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    fn initial_response(
        &self,
        request: &ProcessRequest,
        tools: &[ToolDescriptor],
    ) -> Result<String> {
        let mut prompt = format!("Please respond to this query: \"{}\"\n\n", request.query);
        if let Some(context) = &request.task_context {
            prompt.push_str("Task context:\n```json\n");
            prompt.push_str(&serde_json::to_string_pretty(context)?);
            prompt.push_str("\n```\n\n");
        }
        if let Some(instructions) = &request.prompt_instructions {
            prompt.push_str(&format!("Special instructions: {}\n\n", instructions));
        }
        if !tools.is_empty() {
            prompt.push_str(&render_tool_section(tools));
        }
        invoke(self.generator.as_ref(), Stage::InitialResponse, &prompt)
    }
}

/// Builder for processors with a strictly validated config.
pub struct CoRTProcessorBuilder {
    generator: Arc<dyn Generator>,
    config: CoRTConfig,
}

impl CoRTProcessorBuilder {
    pub fn new(generator: impl Generator + 'static) -> Self {
        Self {
            generator: Arc::new(generator),
            config: CoRTConfig::default(),
        }
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.config.max_rounds = rounds;
        self
    }

    pub fn alternatives_per_round(mut self, count: usize) -> Self {
        self.config.alternatives_per_round = count;
        self
    }

    pub fn dynamic_rounds(mut self, enabled: bool) -> Self {
        self.config.dynamic_rounds = enabled;
        self
    }

    pub fn detailed_logging(mut self, enabled: bool) -> Self {
        self.config.detailed_logging = enabled;
        self
    }

    /// Replace the whole config.
    pub fn config(mut self, config: CoRTConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CoRTProcessor> {
        CoRTProcessor::from_shared(self.generator, self.config)
    }
}

/// Factory mirroring the keyword-argument constructor agents use.
///
/// Zero counts are clamped to 1 rather than rejected; use
/// [`CoRTProcessor::builder`] for strict validation.
pub fn get_recursive_thought_processor(
    generator: impl Generator + 'static,
    max_rounds: usize,
    alternatives_per_round: usize,
    dynamic_rounds: bool,
    detailed_logging: bool,
) -> CoRTProcessor {
    let config = CoRTConfig::new()
        .with_max_rounds(max_rounds)
        .with_alternatives_per_round(alternatives_per_round)
        .with_dynamic_rounds(dynamic_rounds)
        .with_detailed_logging(detailed_logging)
        .clamped();
    CoRTProcessor {
        generator: Arc::new(generator),
        config,
    }
}
