//! Scenario data model
//!
//! A [`Scenario`] is an ordered list of [`Step`]s built once from the ammo
//! file; an [`Ammo`] is one numbered instance of a scenario handed to a
//! shooting worker.

pub mod decode;
pub mod provider;

pub use decode::{build_scenarios, parse_shoot_entry, spread_counts, ShootEntry};
pub use provider::AmmoProvider;

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use indexmap::IndexMap;

use crate::process::{Postprocessor, Preprocessor};
use crate::store::VariableStore;
use crate::template::{RequestParts, TemplaterKind};

/// One request template with its processing configuration
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub method: Method,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
    pub tag: String,
    pub templater: TemplaterKind,
    pub preprocessor: Option<Preprocessor>,
    pub postprocessors: Vec<Postprocessor>,
    /// Pause after the step has been reported
    pub sleep: Duration,
}

impl Step {
    pub fn new(name: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tag: name.clone(),
            name,
            method,
            url: url.into(),
            headers: IndexMap::new(),
            body: None,
            templater: TemplaterKind::Text,
            preprocessor: None,
            postprocessors: Vec::new(),
            sleep: Duration::ZERO,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_templater(mut self, kind: TemplaterKind) -> Self {
        self.templater = kind;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_postprocessor(mut self, postprocessor: Postprocessor) -> Self {
        self.postprocessors.push(postprocessor);
        self
    }

    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// Unrendered URL, headers and body
    pub fn request_parts(&self) -> RequestParts {
        RequestParts {
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Whether any postprocessor needs the buffered response body
    pub fn postprocessors_need_body(&self) -> bool {
        self.postprocessors.iter().any(Postprocessor::needs_body)
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
    /// Floor on the duration of a successful shot
    pub min_waiting_time: Duration,
    pub weight: u64,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            min_waiting_time: Duration::ZERO,
            weight: 1,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_min_waiting_time(mut self, min: Duration) -> Self {
        self.min_waiting_time = min;
        self
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }
}

/// One runnable scenario instance
#[derive(Debug, Clone)]
pub struct Ammo {
    id: u64,
    scenario: Arc<Scenario>,
    store: Arc<VariableStore>,
}

impl Ammo {
    pub fn new(id: u64, scenario: Arc<Scenario>, store: Arc<VariableStore>) -> Self {
        Self { id, scenario, store }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn name(&self) -> &str {
        &self.scenario.name
    }

    pub fn store(&self) -> &Arc<VariableStore> {
        &self.store
    }
}
