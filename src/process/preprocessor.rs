//! Step preprocessor: resolve path expressions into step variables

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

use crate::context::TemplateContext;
use crate::errors::{Result, ShootError};
use crate::path::{resolve, PathIterator};
use crate::template::funcs::arg_string;
use crate::template::parse_call;

/// Ordered `output name -> path expression` mapping
#[derive(Clone)]
pub struct Preprocessor {
    mapping: IndexMap<String, String>,
    iterator: Arc<dyn PathIterator>,
}

impl Preprocessor {
    pub fn new(mapping: IndexMap<String, String>, iterator: Arc<dyn PathIterator>) -> Self {
        Self { mapping, iterator }
    }

    pub fn mapping(&self) -> &IndexMap<String, String> {
        &self.mapping
    }

    /// Resolve every mapping entry against the shot's scope.
    ///
    /// A path whose first segment is missing from the scope root is retried
    /// against the `request` tree and then the `source` tree. Any other
    /// failure aborts with the key that failed.
    ///
    /// An entry written as a generator call (`randInt(1, source.max)`) yields
    /// the generated string; each argument that resolves as a path is
    /// replaced by its value, anything else is passed literally.
    pub fn process(&self, ctx: &TemplateContext) -> Result<Map<String, JsonValue>> {
        let mut out = Map::with_capacity(self.mapping.len());

        for (key, path) in &self.mapping {
            if let Some((func, args)) = parse_call(path) {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| match self.lookup(ctx, arg) {
                        Ok(value) => arg_string(value),
                        Err(_) => arg.clone(),
                    })
                    .collect();
                out.insert(key.clone(), JsonValue::String(func.call(&args)));
                continue;
            }

            let value = self.lookup(ctx, path).map_err(|e| ShootError::Preprocess {
                key: key.clone(),
                source: Box::new(e),
            })?;
            out.insert(key.clone(), value.clone());
        }

        Ok(out)
    }

    fn lookup<'a>(&self, ctx: &'a TemplateContext, path: &str) -> Result<&'a JsonValue> {
        let iter = self.iterator.as_ref();
        let err = match resolve(ctx, path, iter) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_root_miss() => e,
            Err(e) => return Err(e),
        };

        for root in ctx.fallback_roots() {
            match resolve(root, path, iter) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_root_miss() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(err)
    }
}

impl fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preprocessor")
            .field("mapping", &self.mapping)
            .finish()
    }
}
