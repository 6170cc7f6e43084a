//! `var/jsonpath`: extract values from a JSON body

use indexmap::IndexMap;
use jsonpath_rust::JsonPath;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::process::{ExtractionErrors, VariableSink};

#[derive(Debug, Clone, Deserialize)]
pub struct VarJsonPath {
    pub mapping: IndexMap<String, String>,
}

impl VarJsonPath {
    /// A definite path (`$.a.b[0]`) yields its single value; a path with
    /// wildcards, filters, slices or unions always yields a list.
    pub fn process(&self, sink: &mut dyn VariableSink, body: &[u8]) -> Result<(), ExtractionErrors> {
        let mut errors = ExtractionErrors::new();

        let data: JsonValue = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                errors.push("*", format!("failed to unmarshal json: {}", e));
                return Err(errors);
            }
        };

        for (key, path) in &self.mapping {
            match data.query(path) {
                Ok(results) if results.is_empty() => {
                    errors.push(key, format!("no value at jsonpath {}", path));
                }
                Ok(mut results) => {
                    let value = if results.len() == 1 && is_definite(path) {
                        results.remove(0).clone()
                    } else {
                        JsonValue::Array(results.into_iter().cloned().collect())
                    };
                    sink.set(key, value);
                }
                Err(e) => {
                    errors.push(key, format!("failed to get value by jsonpath {}: {}", path, e));
                }
            }
        }

        errors.into_result()
    }
}

fn is_definite(path: &str) -> bool {
    !(path.contains('*')
        || path.contains("..")
        || path.contains('?')
        || path.contains(',')
        || path.contains(':'))
}
