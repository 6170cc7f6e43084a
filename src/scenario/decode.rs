//! Build scenarios from the ammo file
//!
//! Shoot lists use a small grammar: `name` or `name(count)` appends the named
//! request `count` times; `sleep(ms)` adds a pause to the preceding step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::Method;

use super::{Scenario, Step};
use crate::config::{AmmoConfig, RequestConfig, ScenarioConfig};
use crate::errors::{Result, ShootError};
use crate::path::PathIterator;
use crate::process::Preprocessor;

const SLEEP: &str = "sleep";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShootEntry {
    Request { name: String, count: usize },
    Sleep(Duration),
}

pub fn parse_shoot_entry(entry: &str) -> Result<ShootEntry> {
    let entry = entry.trim();
    let (name, arg) = match entry.find('(') {
        Some(open) => {
            let arg = entry[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| ShootError::Config(format!("unterminated shoot entry '{}'", entry)))?;
            (entry[..open].trim(), Some(arg.trim()))
        }
        None => (entry, None),
    };

    if name.is_empty() {
        return Err(ShootError::Config(format!("empty shoot entry '{}'", entry)));
    }

    let count = match arg {
        None | Some("") => 1,
        Some(n) => n
            .parse::<u64>()
            .map_err(|_| ShootError::Config(format!("failed to parse count in '{}'", entry)))?,
    };

    if name == SLEEP {
        return Ok(ShootEntry::Sleep(Duration::from_millis(count)));
    }
    Ok(ShootEntry::Request {
        name: name.to_string(),
        count: count as usize,
    })
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Instances of each scenario per spread cycle: `weight / gcd(weights)`.
/// A lone scenario always gets 1.
pub fn spread_counts(weights: &[u64]) -> Vec<usize> {
    match weights {
        [] => Vec::new(),
        [_] => vec![1],
        _ => {
            let div = weights.iter().copied().fold(0, gcd);
            if div == 0 {
                return vec![0; weights.len()];
            }
            weights.iter().map(|w| (w / div) as usize).collect()
        }
    }
}

/// Build every scenario with its spread count
pub fn build_scenarios(
    config: &AmmoConfig,
    iterator: Arc<dyn PathIterator>,
) -> Result<Vec<(Arc<Scenario>, usize)>> {
    let requests: HashMap<&str, &RequestConfig> =
        config.requests.iter().map(|r| (r.name.as_str(), r)).collect();

    let weights: Vec<u64> = config.scenarios.iter().map(|s| s.weight).collect();
    let counts = spread_counts(&weights);

    config
        .scenarios
        .iter()
        .zip(counts)
        .map(|(sc, count)| {
            let scenario = build_scenario(sc, &requests, &iterator)?;
            Ok((Arc::new(scenario), count))
        })
        .collect()
}

fn build_scenario(
    config: &ScenarioConfig,
    requests: &HashMap<&str, &RequestConfig>,
    iterator: &Arc<dyn PathIterator>,
) -> Result<Scenario> {
    let mut scenario = Scenario::new(&config.name)
        .with_min_waiting_time(Duration::from_millis(config.min_waiting_time))
        .with_weight(config.weight);

    for entry in &config.shoot {
        let parsed = parse_shoot_entry(entry).map_err(|e| {
            ShootError::Config(format!("scenario '{}': failed to parse shoot {}: {}", config.name, entry, e))
        })?;

        match parsed {
            ShootEntry::Sleep(pause) => {
                let last = scenario.steps.last_mut().ok_or_else(|| {
                    ShootError::Config(format!("scenario '{}': sleep before any request", config.name))
                })?;
                last.sleep += pause;
            }
            ShootEntry::Request { name, count } => {
                let req = requests.get(name.as_str()).ok_or_else(|| {
                    ShootError::Config(format!("scenario '{}': request {} not found", config.name, name))
                })?;
                let step = build_step(req, iterator)?;
                for _ in 0..count {
                    scenario.steps.push(step.clone());
                }
            }
        }
    }

    if scenario.steps.is_empty() {
        return Err(ShootError::Config(format!("scenario '{}' has no steps", config.name)));
    }

    Ok(scenario)
}

fn build_step(req: &RequestConfig, iterator: &Arc<dyn PathIterator>) -> Result<Step> {
    let method = Method::from_bytes(req.method.to_uppercase().as_bytes())
        .map_err(|_| ShootError::Config(format!("request '{}': invalid method {}", req.name, req.method)))?;

    let mut step = Step::new(&req.name, method, &req.uri).with_templater(req.templater);
    step.headers = req.headers.clone();
    step.body = req.body.clone();
    if let Some(tag) = req.tag.as_ref().filter(|t| !t.is_empty()) {
        step.tag = tag.clone();
    }
    if let Some(pre) = &req.preprocessor {
        step.preprocessor = Some(Preprocessor::new(pre.mapping.clone(), iterator.clone()));
    }
    step.postprocessors = req.postprocessors.clone();

    Ok(step)
}
