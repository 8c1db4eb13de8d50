//! The injected text-generation backend.
//!
//! The engine knows nothing about models or providers. Callers hand it a
//! [`Generator`], usually a closure, and every call the engine makes goes
//! through [`invoke`], which turns backend errors and panics into
//! [`Error::Generator`] values tagged with the [`Stage`] that issued them.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{Error, GeneratorError, Result, Stage};

/// Synchronous prompt-to-text backend.
///
/// Implementations must be reentrant if one processor is shared between
/// threads; the engine itself performs no locking around calls.
pub trait Generator: Send + Sync {
    /// Produce text for a prompt.
    fn generate(&self, prompt: &str) -> std::result::Result<String, GeneratorError>;
}

impl<F, E> Generator for F
where
    F: Fn(&str) -> std::result::Result<String, E> + Send + Sync,
    E: Into<GeneratorError>,
{
    fn generate(&self, prompt: &str) -> std::result::Result<String, GeneratorError> {
        self(prompt).map_err(Into::into)
    }
}

/// Call the generator, converting errors and panics into [`Error::Generator`].
pub(crate) fn invoke(generator: &dyn Generator, stage: Stage, prompt: &str) -> Result<String> {
    match catch_unwind(AssertUnwindSafe(|| generator.generate(prompt))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(Error::generator(stage, e)),
        Err(payload) => Err(Error::generator_panicked(stage, panic_message(&*payload))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
