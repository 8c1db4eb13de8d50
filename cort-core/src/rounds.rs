//! Round-count estimation.

use tracing::{info, warn};

use crate::config::CoRTConfig;
use crate::error::Stage;
use crate::extract::extract_round_count;
use crate::generator::{invoke, Generator};

/// Decides how many refinement rounds a query gets.
///
/// Static mode always answers `max_rounds`. Dynamic mode asks the generator
/// and degrades to `max_rounds` whenever the answer is missing, out of range
/// or the call fails.
pub struct RoundEstimator<'a> {
    generator: &'a dyn Generator,
    config: &'a CoRTConfig,
}

impl<'a> RoundEstimator<'a> {
    pub fn new(generator: &'a dyn Generator, config: &'a CoRTConfig) -> Self {
        Self { generator, config }
    }

    pub fn determine_rounds(&self, query: &str) -> usize {
        let max_rounds = self.config.max_rounds;
        if !self.config.dynamic_rounds {
            return max_rounds;
        }

        let prompt = format!(
            "Given this query: \"{query}\"\n\n\
             How many rounds of recursive thinking would be most appropriate to produce the best response?\n\
             Consider the complexity, ambiguity, and potential for multiple perspectives.\n\
             Return only a number between 1 and {max_rounds}.\n"
        );

        match invoke(self.generator, Stage::RoundEstimation, &prompt) {
            Ok(reply) => {
                let rounds = extract_round_count(&reply, max_rounds);
                if self.config.detailed_logging {
                    info!("Dynamically determined {} thinking rounds", rounds);
                }
                rounds
            }
            Err(e) => {
                warn!("Error determining dynamic rounds: {}", e);
                max_rounds
            }
        }
    }
}
