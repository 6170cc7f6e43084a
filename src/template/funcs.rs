//! Generated values: `randInt`, `randString` and `uuid`
//!
//! In templates they are tera functions with named arguments:
//! `{{ randInt(from=10, to=20) }}`, `{{ randString(len=8, chars="abc") }}`,
//! `{{ uuid() }}`. In preprocessor mappings and inline variable sources a
//! value written as a call, `randInt(10, 20)`, is replaced by its result.

use std::collections::HashMap;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value as JsonValue;
use tera::Tera;
use uuid::Uuid;

/// Upper bound of `randInt` when no usable bound is given
const DEFAULT_INT_MAX: i64 = 30;
const DEFAULT_STRING_LEN: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFn {
    RandInt,
    RandString,
    Uuid,
}

impl TemplateFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "randInt" => Some(TemplateFn::RandInt),
            "randString" => Some(TemplateFn::RandString),
            "uuid" => Some(TemplateFn::Uuid),
            _ => None,
        }
    }

    pub fn call(self, args: &[String]) -> String {
        match self {
            TemplateFn::RandInt => rand_int(args),
            TemplateFn::RandString => rand_string(args),
            TemplateFn::Uuid => Uuid::new_v4().to_string(),
        }
    }
}

/// Split `name(a, b)` into a known function and its arguments.
///
/// Arguments are trimmed and lose surrounding quotes. Anything that is not a
/// call to a known function yields `None`.
pub fn parse_call(input: &str) -> Option<(TemplateFn, Vec<String>)> {
    let input = input.trim();
    let open = input.find('(')?;
    let inner = input[open + 1..].strip_suffix(')')?;
    let func = TemplateFn::from_name(input[..open].trim())?;

    let inner = inner.trim();
    let args = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(|arg| unquote(arg.trim()).to_string()).collect()
    };
    Some((func, args))
}

fn unquote(arg: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| arg.strip_prefix(*q).and_then(|a| a.strip_suffix(*q)))
        .unwrap_or(arg)
}

/// Random integer in `[from, to]`.
///
/// `()` draws from `[0, 30]`, `(max)` from `[0, max]`. A second bound that is
/// not a number is dropped; more than two arguments fall back to the default.
pub fn rand_int(args: &[String]) -> String {
    let parse = |s: &String| s.parse::<i64>().ok();
    let (from, to) = match args {
        [max] => (0, parse(max).unwrap_or(DEFAULT_INT_MAX)),
        [from, to] => match (parse(from), parse(to)) {
            (Some(from), Some(to)) => (from, to),
            (Some(max), None) => (0, max),
            _ => (0, DEFAULT_INT_MAX),
        },
        _ => (0, DEFAULT_INT_MAX),
    };
    let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
    rand::rng().random_range(lo..=hi).to_string()
}

/// Random string of `len` characters drawn from `chars` (alphanumeric by
/// default). An unusable length or more than two arguments give one character.
pub fn rand_string(args: &[String]) -> String {
    let (len, chars) = match args {
        [len] => (len.parse().unwrap_or(DEFAULT_STRING_LEN), None),
        [len, chars] => match len.parse() {
            Ok(len) => (len, Some(chars.as_str())),
            Err(_) => (DEFAULT_STRING_LEN, None),
        },
        _ => (DEFAULT_STRING_LEN, None),
    };

    let mut rng = rand::rng();
    match chars.filter(|c| !c.is_empty()) {
        Some(chars) => {
            let chars: Vec<char> = chars.chars().collect();
            (0..len).map(|_| chars[rng.random_range(0..chars.len())]).collect()
        }
        None => (&mut rng).sample_iter(&Alphanumeric).take(len).map(char::from).collect(),
    }
}

/// Register the generators as tera functions
pub fn register(tera: &mut Tera) {
    tera.register_function("randInt", tera_rand_int);
    tera.register_function("randString", tera_rand_string);
    tera.register_function("uuid", tera_uuid);
}

fn tera_rand_int(args: &HashMap<String, JsonValue>) -> tera::Result<JsonValue> {
    Ok(JsonValue::String(rand_int(&named(args, &["from", "to"]))))
}

fn tera_rand_string(args: &HashMap<String, JsonValue>) -> tera::Result<JsonValue> {
    Ok(JsonValue::String(rand_string(&named(args, &["len", "chars"]))))
}

fn tera_uuid(_: &HashMap<String, JsonValue>) -> tera::Result<JsonValue> {
    Ok(JsonValue::String(Uuid::new_v4().to_string()))
}

/// Named arguments in positional order, stopping at the first one absent
fn named(args: &HashMap<String, JsonValue>, names: &[&str]) -> Vec<String> {
    names
        .iter()
        .map_while(|name| args.get(*name))
        .map(arg_string)
        .collect()
}

pub fn arg_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every string below `value` that is a function call by its result
pub fn compute_calls(value: &mut JsonValue) {
    match value {
        JsonValue::String(s) => {
            if let Some((func, args)) = parse_call(s) {
                *s = func.call(&args);
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(compute_calls),
        JsonValue::Object(map) => map.values_mut().for_each(compute_calls),
        _ => {}
    }
}
