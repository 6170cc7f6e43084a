//! Path expressions over nested value trees
//!
//! A path is a dot-separated list of segments, each optionally carrying an
//! index suffix: `source.users[next].name`, `request.auth.items[-1]`.
//! Supported indices are integer literals (wrapped Python-style into the list
//! length) and the case-insensitive keywords `next`, `rand` and `last`.

pub mod iterator;

pub use iterator::{IteratorState, PathIterator};

use serde_json::{Map, Value as JsonValue};

use crate::errors::{Result, ShootError};

/// A root that can hand out top-level values by name
///
/// Implemented for plain JSON maps and for composite scopes that expose
/// several independent trees under one namespace without copying them.
pub trait Lookup {
    fn lookup(&self, key: &str) -> Option<&JsonValue>;
}

impl Lookup for Map<String, JsonValue> {
    fn lookup(&self, key: &str) -> Option<&JsonValue> {
        self.get(key)
    }
}

impl Lookup for JsonValue {
    fn lookup(&self, key: &str) -> Option<&JsonValue> {
        self.get(key)
    }
}

/// Resolve `path` against `root`.
///
/// Maps are descended by key; an index suffix selects a list element.
/// Reaching a scalar (or a list without an index) before the last segment
/// fails with `NotLastSegment`. A missing key fails with `SegmentNotFound`,
/// carrying the depth of the missing segment.
pub fn resolve<'a, L>(root: &'a L, path: &str, iter: &dyn PathIterator) -> Result<&'a JsonValue>
where
    L: Lookup + ?Sized,
{
    let segments: Vec<&str> = path.split('.').collect();
    let last = segments.len() - 1;
    let mut cursor_key = String::with_capacity(path.len());
    let mut current: Option<&'a JsonValue> = None;

    for (depth, raw) in segments.iter().enumerate() {
        let segment = raw.trim();
        if depth > 0 {
            cursor_key.push('.');
        }
        cursor_key.push_str(segment);

        let (name, index) = split_index(segment);

        let found = match current {
            None => root.lookup(name),
            Some(value) => value.get(name),
        };
        let mut value = found.ok_or_else(|| ShootError::SegmentNotFound {
            path: path.to_string(),
            segment: name.to_string(),
            depth,
        })?;

        if let Some(index) = index {
            value = index_into(value, &index, &cursor_key, path, iter)?;
        }

        match value {
            JsonValue::Object(_) => current = Some(value),
            _ if depth == last => return Ok(value),
            _ => {
                return Err(ShootError::NotLastSegment {
                    path: path.to_string(),
                    segment: name.to_string(),
                })
            }
        }
    }

    current.ok_or_else(|| ShootError::SegmentNotFound {
        path: path.to_string(),
        segment: String::new(),
        depth: 0,
    })
}

/// Split `name[idx]` into the name and the lowercased index token
fn split_index(segment: &str) -> (&str, Option<String>) {
    match segment.find('[') {
        Some(open) if segment.ends_with(']') => {
            let index = segment[open + 1..segment.len() - 1].trim().to_ascii_lowercase();
            (&segment[..open], Some(index))
        }
        _ => (segment, None),
    }
}

fn index_into<'a>(
    value: &'a JsonValue,
    index: &str,
    cursor_key: &str,
    path: &str,
    iter: &dyn PathIterator,
) -> Result<&'a JsonValue> {
    let items = match value {
        JsonValue::Array(items) => items,
        other => {
            return Err(ShootError::InvalidIndex {
                path: path.to_string(),
                index: index.to_string(),
                reason: format!("value of type {} is not indexable", type_name(other)),
            })
        }
    };

    if items.is_empty() {
        return Err(ShootError::InvalidIndex {
            path: path.to_string(),
            index: index.to_string(),
            reason: "list is empty".to_string(),
        });
    }

    let idx = calc_index(index, cursor_key, items.len(), iter).ok_or_else(|| ShootError::InvalidIndex {
        path: path.to_string(),
        index: index.to_string(),
        reason: "index should be an integer or one of [next, rand, last]".to_string(),
    })?;

    Ok(&items[idx])
}

/// Map an index token onto `[0, len)`; `None` for an unknown token.
/// `len` must be non-zero.
pub fn calc_index(index: &str, cursor_key: &str, len: usize, iter: &dyn PathIterator) -> Option<usize> {
    match index {
        "last" => Some(len - 1),
        "rand" => Some(iter.rand(len) % len),
        "next" => Some(iter.next(cursor_key) % len),
        literal => {
            let n: i64 = literal.parse().ok()?;
            if n >= 0 && (n as usize) < len {
                return Some(n as usize);
            }
            Some(n.rem_euclid(len as i64) as usize)
        }
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "map",
    }
}
