//! # cort-core
//!
//! Chain of Recursive Thoughts (CoRT): iteratively refine a language-model
//! response by generating alternatives, judging them against the current
//! best, and keeping the winner for a bounded number of rounds.
//!
//! ## Core Components
//!
//! - **Generator**: the injected `prompt -> text` backend (usually a closure)
//! - **RoundEstimator**: how many rounds a query gets
//! - **AlternativeGenerator**: candidate responses, via an ordered parsing chain
//! - **Evaluator**: picks the best of `[current_best] + alternatives`
//! - **CoRTProcessor**: the refinement loop and its thinking trace
//! - **Tools**: tool calls resolved inside alternatives and generated initial responses
//!
//! ## Example
//!
//! ```rust,ignore
//! use cort_core::{get_recursive_thought_processor, ProcessRequest};
//!
//! let generator = |prompt: &str| my_backend.complete(prompt);
//! let processor = get_recursive_thought_processor(generator, 3, 3, false, false);
//!
//! let result = processor.process(
//!     ProcessRequest::new("Explain ownership in Rust")
//!         .with_prompt_instructions("Keep it under 100 words"),
//! );
//! println!("{}", result.final_response);
//! ```

pub mod alternatives;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod extract;
pub mod generator;
pub mod processor;
mod proptest;
pub mod rounds;
#[cfg(feature = "tokio-runtime")]
mod runtime;
pub mod tools;
pub mod trace;

// Re-exports for convenience
pub use alternatives::{AlternativeGenerator, AlternativeSet, AlternativeSource};
pub use config::CoRTConfig;
pub use error::{Error, GeneratorError, Result, Stage};
pub use evaluator::{Evaluation, Evaluator, SelectionMethod};
pub use extract::{extract_alternatives_from_text, extract_best_index_from_text, TextPattern};
pub use generator::Generator;
pub use processor::{
    get_recursive_thought_processor, CoRTProcessor, CoRTProcessorBuilder, ProcessRequest,
};
pub use rounds::RoundEstimator;
pub use tools::{parse_tool_calls, ToolCall, ToolDescriptor, ToolExecutor};
pub use trace::{ProcessResult, RunId, Termination, ThinkingTraceEntry, ToolInvocationRecord};
