//! Per-step variable processing
//!
//! A [`Preprocessor`] resolves path expressions before the request is
//! templated. [`Postprocessor`]s run against the response and either extract
//! variables for later steps or assert on the response content.

pub mod postprocess;
pub mod preprocessor;

pub use postprocess::{
    AssertResponse, HeaderSpec, Postprocessor, PostprocessError, VarHeader, VarJsonPath, VarXPath,
};
pub use preprocessor::Preprocessor;

use std::fmt;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Destination for extracted variables
pub trait VariableSink {
    fn set(&mut self, key: &str, value: JsonValue);
}

impl VariableSink for Map<String, JsonValue> {
    fn set(&mut self, key: &str, value: JsonValue) {
        self.insert(key.to_string(), value);
    }
}

/// One failed extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionError {
    pub key: String,
    pub message: String,
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to extract `{}`: {}", self.key, self.message)
    }
}

/// Every extraction failure of a postprocessor run, in mapping order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionErrors {
    errors: Vec<ExtractionError>,
}

impl ExtractionErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ExtractionError {
            key: key.into(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: ExtractionErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> Result<(), ExtractionErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ExtractionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExtractionErrors {}

/// A response assertion that did not hold
#[derive(Debug, Clone, PartialEq, Error)]
#[error("assert failed: {target} {expected}")]
pub struct AssertionFailure {
    /// What was inspected, e.g. `body` or `header Content-Type`
    pub target: String,
    /// Human readable expectation, e.g. `does not contain "ok"`
    pub expected: String,
}
