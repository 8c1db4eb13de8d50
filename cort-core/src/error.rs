//! Error types for cort-core.
//!
//! Internal steps return [`Result`]; the public refinement operations fold
//! every error into a safe default at the smallest enclosing scope, so these
//! values surface to callers only through [`crate::CoRTProcessor::builder`]
//! and the lower-level helpers.

use thiserror::Error;

/// Result type alias using cort-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by injected backends (generators and tool executors).
pub type GeneratorError = Box<dyn std::error::Error + Send + Sync>;

/// The step of a refinement run that issued a generator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Producing the initial response when the caller supplied none.
    InitialResponse,
    /// Asking the backend how many rounds to run.
    RoundEstimation,
    /// The structured "give me N alternatives" call.
    Alternatives,
    /// One of the per-alternative fallback calls.
    AlternativeFallback,
    /// Judging the candidates of a round.
    Evaluation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitialResponse => write!(f, "initial_response"),
            Self::RoundEstimation => write!(f, "round_estimation"),
            Self::Alternatives => write!(f, "alternatives"),
            Self::AlternativeFallback => write!(f, "alternative_fallback"),
            Self::Evaluation => write!(f, "evaluation"),
        }
    }
}

/// Errors that can occur during CoRT operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The generator returned an error or panicked.
    #[error("Generator error during {stage}: {message}")]
    Generator {
        stage: Stage,
        message: String,
        #[source]
        source: Option<GeneratorError>,
    },

    /// A tool executor failed.
    #[error("Tool error: {tool} - {message}")]
    Tool { tool: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a generator error wrapping the backend's own error.
    pub fn generator(stage: Stage, source: GeneratorError) -> Self {
        Self::Generator {
            stage,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a generator error from a panic payload message.
    pub fn generator_panicked(stage: Stage, message: impl Into<String>) -> Self {
        Self::Generator {
            stage,
            message: format!("generator panicked: {}", message.into()),
            source: None,
        }
    }

    /// Create a tool error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The stage this error occurred in, if it came from the generator.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Generator { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
