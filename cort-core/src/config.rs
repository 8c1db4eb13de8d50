//! Configuration for the CoRT processor.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum number of refinement rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 3;

/// Default number of alternatives requested per round.
pub const DEFAULT_ALTERNATIVES_PER_ROUND: usize = 3;

/// Default number of query characters quoted in detailed logs.
pub const DEFAULT_LOG_PREVIEW_CHARS: usize = 100;

/// Configuration held by a [`crate::CoRTProcessor`].
///
/// Immutable once the processor is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoRTConfig {
    /// Maximum number of refinement rounds (and the static round count).
    pub max_rounds: usize,
    /// Number of alternatives requested in each round.
    pub alternatives_per_round: usize,
    /// Ask the generator how many rounds a query deserves.
    pub dynamic_rounds: bool,
    /// Log per-round detail at info level.
    pub detailed_logging: bool,
    /// How much of a query is quoted in detailed log lines.
    pub log_preview_chars: usize,
}

impl Default for CoRTConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            alternatives_per_round: DEFAULT_ALTERNATIVES_PER_ROUND,
            dynamic_rounds: false,
            detailed_logging: false,
            log_preview_chars: DEFAULT_LOG_PREVIEW_CHARS,
        }
    }
}

impl CoRTConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `CORT_MAX_ROUNDS`, `CORT_ALTERNATIVES_PER_ROUND`,
    /// `CORT_DYNAMIC_ROUNDS`, `CORT_DETAILED_LOGGING` and
    /// `CORT_LOG_PREVIEW_CHARS`; unset or unparsable values keep their
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: usize| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| lookup(key).map(|s| parse_flag(&s)).unwrap_or(default);

        Self {
            max_rounds: number("CORT_MAX_ROUNDS", defaults.max_rounds),
            alternatives_per_round: number(
                "CORT_ALTERNATIVES_PER_ROUND",
                defaults.alternatives_per_round,
            ),
            dynamic_rounds: flag("CORT_DYNAMIC_ROUNDS", defaults.dynamic_rounds),
            detailed_logging: flag("CORT_DETAILED_LOGGING", defaults.detailed_logging),
            log_preview_chars: number("CORT_LOG_PREVIEW_CHARS", defaults.log_preview_chars),
        }
    }

    /// Set the maximum number of rounds.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Set the number of alternatives per round.
    pub fn with_alternatives_per_round(mut self, count: usize) -> Self {
        self.alternatives_per_round = count;
        self
    }

    /// Enable or disable dynamic round estimation.
    pub fn with_dynamic_rounds(mut self, enabled: bool) -> Self {
        self.dynamic_rounds = enabled;
        self
    }

    /// Enable or disable detailed logging.
    pub fn with_detailed_logging(mut self, enabled: bool) -> Self {
        self.detailed_logging = enabled;
        self
    }

    /// Set how much of a query is quoted in detailed logs.
    pub fn with_log_preview_chars(mut self, chars: usize) -> Self {
        self.log_preview_chars = chars;
        self
    }

    /// Check that the configuration can drive a refinement run.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(Error::config("max_rounds must be at least 1"));
        }
        if self.alternatives_per_round == 0 {
            return Err(Error::config("alternatives_per_round must be at least 1"));
        }
        Ok(())
    }

    /// Clamp zero counts up to 1 instead of rejecting them.
    pub(crate) fn clamped(mut self) -> Self {
        self.max_rounds = self.max_rounds.max(1);
        self.alternatives_per_round = self.alternatives_per_round.max(1);
        self
    }

    /// Truncate `text` to the configured preview length for log lines.
    pub(crate) fn preview<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.log_preview_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value != "0" && !value.eq_ignore_ascii_case("false") && !value.is_empty()
}
