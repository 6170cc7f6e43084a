//! `assert/response`: fail the step unless the response matches

use indexmap::IndexMap;
use serde::Deserialize;

use crate::client::ResponseHead;
use crate::process::AssertionFailure;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssertResponse {
    /// Substrings the body must contain
    #[serde(default)]
    pub body: Vec<String>,
    /// Header name -> substring its value must contain
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl AssertResponse {
    /// Stops at the first failing check
    pub fn process(&self, head: &ResponseHead, body: &[u8]) -> Result<(), AssertionFailure> {
        if let Some(expected) = self.status_code {
            if head.status.as_u16() != expected {
                return Err(AssertionFailure {
                    target: "status code".to_string(),
                    expected: format!("{} is not {}", head.status.as_u16(), expected),
                });
            }
        }

        if !self.body.is_empty() {
            let text = String::from_utf8_lossy(body);
            for pattern in &self.body {
                if !text.contains(pattern.as_str()) {
                    return Err(AssertionFailure {
                        target: "body".to_string(),
                        expected: format!("does not contain {}", pattern),
                    });
                }
            }
        }

        for (name, pattern) in &self.headers {
            let actual = head.header_str(name).unwrap_or("");
            if !actual.contains(pattern.as_str()) {
                return Err(AssertionFailure {
                    target: format!("header {}", name),
                    expected: format!("does not contain {}", pattern),
                });
            }
        }

        Ok(())
    }

    pub fn needs_body(&self) -> bool {
        !self.body.is_empty()
    }
}
