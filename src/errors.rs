//! Error types for QuicShot

use thiserror::Error;

use crate::client::ClientError;
use crate::process::{AssertionFailure, ExtractionErrors};

/// Main error type for QuicShot
#[derive(Error, Debug)]
pub enum ShootError {
    /// A named key was absent while walking a path.
    ///
    /// `depth` is the zero-based index of the missing segment, so callers can
    /// tell a miss on the root selector (`depth == 0`) from a deeper miss.
    #[error("segment `{segment}` not found in path `{path}`")]
    SegmentNotFound {
        path: String,
        segment: String,
        depth: usize,
    },

    #[error("invalid index `{index}` in path `{path}`: {reason}")]
    InvalidIndex {
        path: String,
        index: String,
        reason: String,
    },

    #[error("not last segment `{segment}` in path `{path}`")]
    NotLastSegment { path: String, segment: String },

    #[error("failed to get value for `{key}`: {source}")]
    Preprocess {
        key: String,
        #[source]
        source: Box<ShootError>,
    },

    #[error("template `{name}` parse error: {message}")]
    TemplateParse { name: String, message: String },

    #[error("template `{name}` execution error: {message}")]
    TemplateExec { name: String, message: String },

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Transport error: {0}")]
    Transport(#[source] ClientError),

    #[error("Response body error: {0}")]
    Body(#[source] ClientError),

    #[error(transparent)]
    Extraction(#[from] ExtractionErrors),

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error("Shot cancelled")]
    Cancelled,

    /// Wraps a step failure with the operation that raised it.
    #[error("{op}: {source}")]
    Step {
        op: &'static str,
        #[source]
        source: Box<ShootError>,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Variable source `{name}`: {message}")]
    Source { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShootError {
    /// Wrap `self` with the operation tag that failed.
    pub fn with_op(self, op: &'static str) -> Self {
        ShootError::Step {
            op,
            source: Box::new(self),
        }
    }

    pub fn is_segment_not_found(&self) -> bool {
        matches!(self, ShootError::SegmentNotFound { .. })
    }

    /// True when the root selector (first segment) itself was missing
    pub fn is_root_miss(&self) -> bool {
        matches!(self, ShootError::SegmentNotFound { depth: 0, .. })
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            ShootError::Cancelled => true,
            ShootError::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Innermost error with `Step` wrappers stripped
    pub fn root_cause(&self) -> &ShootError {
        match self {
            ShootError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShootError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_tag_in_message() {
        let err = ShootError::Request("bad url".to_string()).with_op("scenario_gun.shoot");
        assert_eq!(err.to_string(), "scenario_gun.shoot: Invalid request: bad url");
        assert!(matches!(err.root_cause(), ShootError::Request(_)));
    }

    #[test]
    fn test_root_miss() {
        let root = ShootError::SegmentNotFound {
            path: "a.b".to_string(),
            segment: "a".to_string(),
            depth: 0,
        };
        let deep = ShootError::SegmentNotFound {
            path: "a.b".to_string(),
            segment: "b".to_string(),
            depth: 1,
        };
        assert!(root.is_root_miss());
        assert!(deep.is_segment_not_found());
        assert!(!deep.is_root_miss());
    }

    #[test]
    fn test_cancelled_through_wrapper() {
        let err = ShootError::Cancelled.with_op("sleep");
        assert!(err.is_cancelled());
    }
}
