//! Tagged model responses

use serde::{Deserialize, Serialize};

/// A language-model response that was either understood or not.
///
/// Model output is untrusted text; every consumer has to branch on this
/// instead of assuming the shape it asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutput<T> {
    /// Output matched the requested shape
    Parsed(T),
    /// Output could not be interpreted; the raw text is kept for logging
    Malformed(String),
}

impl<T> ModelOutput<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ModelOutput::Parsed(_))
    }

    /// Convert into an `Option`, discarding malformed output
    pub fn parsed(self) -> Option<T> {
        match self {
            ModelOutput::Parsed(value) => Some(value),
            ModelOutput::Malformed(_) => None,
        }
    }

    /// Transform the parsed value, keeping malformed output as-is
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ModelOutput<U> {
        match self {
            ModelOutput::Parsed(value) => ModelOutput::Parsed(f(value)),
            ModelOutput::Malformed(raw) => ModelOutput::Malformed(raw),
        }
    }
}
