//! Response postprocessors
//!
//! Configured per step with a `type` tag: `var/jsonpath`, `var/xpath`,
//! `var/header` extract variables; `assert/response` checks the response.

mod assert;
mod header;
mod jsonpath;
mod xpath;

pub use assert::AssertResponse;
pub use header::{HeaderSpec, VarHeader};
pub use jsonpath::VarJsonPath;
pub use xpath::VarXPath;

use serde::Deserialize;
use thiserror::Error;

use super::{AssertionFailure, ExtractionErrors, VariableSink};
use crate::client::ResponseHead;
use crate::errors::ShootError;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Postprocessor {
    #[serde(rename = "var/jsonpath")]
    JsonPath(VarJsonPath),
    #[serde(rename = "var/xpath")]
    XPath(VarXPath),
    #[serde(rename = "var/header")]
    Header(VarHeader),
    #[serde(rename = "assert/response")]
    Assert(AssertResponse),
}

#[derive(Debug, Clone, Error)]
pub enum PostprocessError {
    #[error(transparent)]
    Extraction(#[from] ExtractionErrors),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
}

impl From<PostprocessError> for ShootError {
    fn from(e: PostprocessError) -> Self {
        match e {
            PostprocessError::Extraction(e) => ShootError::Extraction(e),
            PostprocessError::Assertion(e) => ShootError::Assertion(e),
        }
    }
}

impl Postprocessor {
    /// Run against a response, writing extracted values into `sink`.
    ///
    /// Extractors attempt every mapping entry and report all failures
    /// together; successful entries are still written.
    pub fn process(
        &self,
        sink: &mut dyn VariableSink,
        head: &ResponseHead,
        body: &[u8],
    ) -> Result<(), PostprocessError> {
        match self {
            Postprocessor::JsonPath(p) => Ok(p.process(sink, body)?),
            Postprocessor::XPath(p) => Ok(p.process(sink, body)?),
            Postprocessor::Header(p) => Ok(p.process(sink, head)?),
            Postprocessor::Assert(p) => Ok(p.process(head, body)?),
        }
    }

    /// Whether the response body must be buffered for this postprocessor
    pub fn needs_body(&self) -> bool {
        match self {
            Postprocessor::Header(_) => false,
            Postprocessor::Assert(a) => a.needs_body(),
            _ => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Postprocessor::JsonPath(_) => "var/jsonpath",
            Postprocessor::XPath(_) => "var/xpath",
            Postprocessor::Header(_) => "var/header",
            Postprocessor::Assert(_) => "assert/response",
        }
    }
}
