//! Per-step measurement reported to the aggregator

use std::time::{Duration, Instant};

use crate::errors::ShootError;

/// Extra tag marking synthetic samples of steps that failed before a
/// response status was known
pub const EMPTY_TAG: &str = "__EMPTY__";

/// Outcome of exactly one step execution
#[derive(Debug, Clone)]
pub struct Sample {
    pub tag: String,
    pub tags: Vec<String>,
    /// Protocol status code; 0 when no response was received
    pub proto_code: u16,
    /// Zero when the client does not expose connection setup separately
    pub connect_time: Duration,
    /// From dispatch until the response head arrived
    pub send_time: Duration,
    /// Time spent reading or draining the body
    pub receive_time: Duration,
    /// Total step latency
    pub latency: Duration,
    pub request_bytes: u64,
    pub response_bytes: u64,
    pub error: Option<String>,
    started: Instant,
}

impl Sample {
    /// Start timing a step
    pub fn start(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            tags: Vec::new(),
            proto_code: 0,
            connect_time: Duration::ZERO,
            send_time: Duration::ZERO,
            receive_time: Duration::ZERO,
            latency: Duration::ZERO,
            request_bytes: 0,
            response_bytes: 0,
            error: None,
            started: Instant::now(),
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    pub fn set_proto_code(&mut self, code: u16) {
        self.proto_code = code;
    }

    pub fn set_error(&mut self, err: &ShootError) {
        self.error = Some(err.to_string());
    }

    /// Mark as a failure without a response: empty tag, status 0
    pub fn fail(&mut self, err: &ShootError) {
        self.add_tag(EMPTY_TAG);
        self.set_proto_code(0);
        self.set_error(err);
    }

    /// Stamp the total latency; call right before reporting
    pub fn finish(&mut self) {
        self.latency = self.started.elapsed();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_marks_empty_tag() {
        let mut sample = Sample::start("auth");
        sample.set_proto_code(200);
        sample.fail(&ShootError::Request("bad url".to_string()));
        assert_eq!(sample.proto_code, 0);
        assert!(sample.has_tag(EMPTY_TAG));
        assert_eq!(sample.error.as_deref(), Some("Invalid request: bad url"));
        assert_eq!(sample.tag, "auth");
    }

    #[test]
    fn test_finish_stamps_latency() {
        let mut sample = Sample::start("t");
        std::thread::sleep(Duration::from_millis(5));
        sample.finish();
        assert!(sample.latency >= Duration::from_millis(5));
    }
}
