//! Per-shot variable scope
//!
//! A [`TemplateContext`] is created for every shot. It overlays the shot's
//! own state (the `request` tree and the current step's preprocessor outputs)
//! on top of the shared, read-only [`VariableStore`]; the store is never
//! copied.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::path::Lookup;
use crate::store::VariableStore;
use crate::template::TemplateRefs;

pub const SOURCE_KEY: &str = "source";
pub const REQUEST_KEY: &str = "request";
pub const PREPROCESSOR_KEY: &str = "preprocessor";
pub const POSTPROCESSOR_KEY: &str = "postprocessor";

#[derive(Debug, Clone)]
pub struct TemplateContext {
    store: Arc<VariableStore>,
    request: JsonValue,
    locals: Map<String, JsonValue>,
}

impl TemplateContext {
    pub fn new(store: Arc<VariableStore>) -> Self {
        Self {
            store,
            request: JsonValue::Object(Map::new()),
            locals: Map::new(),
        }
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    /// Per-step outputs of the shot so far, keyed by step name
    pub fn request(&self) -> &JsonValue {
        &self.request
    }

    /// Outputs visible at the template root for the current step
    pub fn locals(&self) -> &Map<String, JsonValue> {
        &self.locals
    }

    /// Reset the entry for `step` and clear the previous step's locals.
    /// A repeated step name overwrites the earlier run's outputs.
    pub fn begin_step(&mut self, step: &str) {
        self.locals.clear();
        self.request_map().insert(step.to_string(), JsonValue::Object(Map::new()));
    }

    /// Record preprocessor outputs under `request.<step>.preprocessor` and
    /// expose them at the template root
    pub fn set_preprocessed(&mut self, step: &str, vars: Map<String, JsonValue>) {
        self.step_map(step)
            .insert(PREPROCESSOR_KEY.to_string(), JsonValue::Object(vars.clone()));
        self.locals = vars;
    }

    /// Record postprocessor outputs under `request.<step>.postprocessor`.
    ///
    /// Each output is also reachable as `request.<step>.<key>` unless the key
    /// collides with one of the two reserved sub-maps.
    pub fn set_postprocessed(&mut self, step: &str, vars: Map<String, JsonValue>) {
        let entry = self.step_map(step);
        for (key, value) in &vars {
            if key != PREPROCESSOR_KEY && key != POSTPROCESSOR_KEY {
                entry.insert(key.clone(), value.clone());
            }
        }
        entry.insert(POSTPROCESSOR_KEY.to_string(), JsonValue::Object(vars));
    }

    /// Roots tried, in order, when a preprocessor path misses at the root:
    /// the `request` tree, then the `source` tree
    pub fn fallback_roots(&self) -> [&JsonValue; 2] {
        [&self.request, self.store.sources()]
    }

    /// Build the tera rendering context holding only what `refs` names.
    ///
    /// Sources are copied per named source; the whole `source` tree only
    /// when the template reads it as a whole.
    pub fn to_tera(&self, refs: &TemplateRefs) -> tera::Context {
        let mut ctx = tera::Context::new();
        for name in refs.names() {
            if let Some(value) = self.lookup(name) {
                ctx.insert(name, value);
            }
        }

        if refs.all_sources() {
            ctx.insert(SOURCE_KEY, self.store.sources());
        } else {
            let sources: Map<String, JsonValue> = refs
                .sources()
                .filter_map(|name| Some((name.to_string(), self.store.source(name)?.clone())))
                .collect();
            if !sources.is_empty() {
                ctx.insert(SOURCE_KEY, &sources);
            }
        }
        ctx
    }

    fn request_map(&mut self) -> &mut Map<String, JsonValue> {
        if !self.request.is_object() {
            self.request = JsonValue::Object(Map::new());
        }
        match &mut self.request {
            JsonValue::Object(map) => map,
            _ => unreachable!("request tree is always an object"),
        }
    }

    fn step_map(&mut self, step: &str) -> &mut Map<String, JsonValue> {
        let entry = self
            .request_map()
            .entry(step.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !entry.is_object() {
            *entry = JsonValue::Object(Map::new());
        }
        match entry {
            JsonValue::Object(map) => map,
            _ => unreachable!("step entry is always an object"),
        }
    }
}

impl Lookup for TemplateContext {
    fn lookup(&self, key: &str) -> Option<&JsonValue> {
        match key {
            SOURCE_KEY => Some(self.store.sources()),
            REQUEST_KEY => Some(&self.request),
            other => self
                .locals
                .get(other)
                .or_else(|| self.store.globals().get(other)),
        }
    }
}
