//! `var/header`: extract response headers, optionally transformed
//!
//! Mapping values look like `Content-Type|lower|substr(0,16)`. The pseudo
//! headers `:status` and `:status_line` expose the response status.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::client::ResponseHead;
use crate::process::{ExtractionErrors, VariableSink};

#[derive(Debug, Clone, Deserialize)]
pub struct VarHeader {
    pub mapping: IndexMap<String, String>,
}

impl VarHeader {
    pub fn process(&self, sink: &mut dyn VariableSink, head: &ResponseHead) -> Result<(), ExtractionErrors> {
        let mut errors = ExtractionErrors::new();

        for (key, raw) in &self.mapping {
            match HeaderSpec::parse(raw).and_then(|spec| spec.extract(head)) {
                Ok(value) => sink.set(key, value),
                Err(message) => errors.push(key, message),
            }
        }

        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Modifier {
    Lower,
    Upper,
    Substr(i64, Option<i64>),
    Replace(String, String),
}

/// A parsed `Name|modifier...` expression
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderSpec {
    name: String,
    modifiers: Vec<Modifier>,
}

impl HeaderSpec {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut parts = split_pipes(raw).into_iter();
        let name = parts.next().unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(format!("empty header name in `{}`", raw));
        }
        let modifiers = parts
            .map(|m| parse_modifier(m.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name, modifiers })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extract(&self, head: &ResponseHead) -> Result<JsonValue, String> {
        let value = match self.name.as_str() {
            ":status" if self.modifiers.is_empty() => {
                return Ok(JsonValue::from(head.status.as_u16()));
            }
            ":status" => head.status.as_u16().to_string(),
            ":status_line" => head.status_line(),
            name => head
                .header_str(name)
                .ok_or_else(|| format!("header {} not found", name))?
                .to_string(),
        };

        let value = self.modifiers.iter().fold(value, |acc, m| apply(m, acc));
        Ok(JsonValue::String(value))
    }
}

/// Split on `|` outside parentheses
fn split_pipes(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

fn parse_modifier(raw: &str) -> Result<Modifier, String> {
    let (name, args) = match raw.find('(') {
        Some(open) if raw.ends_with(')') => (&raw[..open], Some(&raw[open + 1..raw.len() - 1])),
        Some(_) => return Err(format!("unterminated modifier `{}`", raw)),
        None => (raw, None),
    };

    match (name.trim(), args) {
        ("lower", None) => Ok(Modifier::Lower),
        ("upper", None) => Ok(Modifier::Upper),
        ("substr", Some(args)) => {
            let nums = args
                .split(',')
                .map(|a| a.trim().parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| format!("substr expects integer arguments, got `{}`", args))?;
            match nums.as_slice() {
                [from] => Ok(Modifier::Substr(*from, None)),
                [from, to] => Ok(Modifier::Substr(*from, Some(*to))),
                _ => Err(format!("substr expects 1 or 2 arguments, got `{}`", args)),
            }
        }
        ("replace", Some(args)) => match args.split_once(',') {
            Some((old, new)) => Ok(Modifier::Replace(old.to_string(), new.to_string())),
            None => Err(format!("replace expects 2 arguments, got `{}`", args)),
        },
        _ => Err(format!("unknown modifier `{}`", raw)),
    }
}

fn apply(modifier: &Modifier, value: String) -> String {
    match modifier {
        Modifier::Lower => value.to_lowercase(),
        Modifier::Upper => value.to_uppercase(),
        Modifier::Replace(old, new) => value.replace(old.as_str(), new),
        Modifier::Substr(from, to) => {
            let chars: Vec<char> = value.chars().collect();
            let len = chars.len() as i64;
            let clamp = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
            let start = clamp(*from);
            let end = to.map(clamp).unwrap_or(len);
            if start >= end {
                String::new()
            } else {
                chars[start as usize..end as usize].iter().collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};
    use serde_json::{json, Map};

    fn head() -> ResponseHead {
        let mut head = ResponseHead::new(StatusCode::CREATED);
        head.headers
            .insert("content-type", HeaderValue::from_static("Application/JSON; charset=utf-8"));
        head.headers.insert("x-request-id", HeaderValue::from_static("req-12345"));
        head
    }

    fn extract(raw: &str) -> Result<JsonValue, String> {
        HeaderSpec::parse(raw)?.extract(&head())
    }

    #[test]
    fn test_plain_header_case_insensitive() {
        assert_eq!(extract("X-Request-Id").unwrap(), json!("req-12345"));
    }

    #[test]
    fn test_modifiers() {
        assert_eq!(extract("Content-Type|lower").unwrap(), json!("application/json; charset=utf-8"));
        assert_eq!(extract("x-request-id|upper").unwrap(), json!("REQ-12345"));
        assert_eq!(extract("x-request-id|substr(4)").unwrap(), json!("12345"));
        assert_eq!(extract("x-request-id|substr(0,3)").unwrap(), json!("req"));
        assert_eq!(extract("x-request-id|substr(-3)").unwrap(), json!("345"));
        assert_eq!(extract("x-request-id|replace(req-,id:)").unwrap(), json!("id:12345"));
        assert_eq!(
            extract("Content-Type|lower|substr(0,16)").unwrap(),
            json!("application/json")
        );
    }

    #[test]
    fn test_pseudo_headers() {
        assert_eq!(extract(":status").unwrap(), json!(201));
        assert_eq!(extract(":status_line").unwrap(), json!("HTTP/1.1 201 Created"));
    }

    #[test]
    fn test_errors_accumulate() {
        let pp = VarHeader {
            mapping: [
                ("id".to_string(), "x-request-id".to_string()),
                ("gone".to_string(), "x-missing".to_string()),
                ("bad".to_string(), "x-request-id|reverse".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        let mut out = Map::new();
        let err = pp.process(&mut out, &head()).unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(out["id"], json!("req-12345"));
    }
}
