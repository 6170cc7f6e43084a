//! Request templating with tera
//!
//! URL, header values and body of a step are tera templates rendered against
//! the shot's [`TemplateContext`]. Compiled templates are cached per
//! `(scenario, step, field)`; fields without template markers are left
//! untouched and never compiled.

pub mod funcs;
pub mod refs;

pub use funcs::{compute_calls, parse_call, TemplateFn};
pub use refs::TemplateRefs;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::Deserialize;
use tera::Tera;

use crate::context::TemplateContext;
use crate::errors::{Result, ShootError};

/// Escaping applied to rendered values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplaterKind {
    /// Values are inserted verbatim
    #[default]
    Text,
    /// Values are HTML-escaped
    Html,
}

/// The templated parts of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParts {
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
}

/// `(kind, scenario, step, field)`
type CacheKey = (TemplaterKind, String, String, String);

#[derive(Clone)]
struct Compiled {
    /// Registered tera name, unique per cache key
    name: String,
    refs: Arc<TemplateRefs>,
}

struct Cache {
    tera: Tera,
    compiled: HashMap<CacheKey, Compiled>,
}

impl Cache {
    fn new() -> Self {
        let mut tera = Tera::default();
        funcs::register(&mut tera);
        Self {
            tera,
            compiled: HashMap::new(),
        }
    }
}

/// Shared by every shot; compiled templates live for the whole run
pub struct Templater {
    cache: RwLock<Cache>,
}

impl Templater {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(Cache::new()),
        }
    }

    /// Render every templated field of `parts` in place.
    ///
    /// On error `parts` may be partially rendered and must not be sent.
    pub fn apply(
        &self,
        parts: &mut RequestParts,
        ctx: &TemplateContext,
        kind: TemplaterKind,
        scenario: &str,
        step: &str,
    ) -> Result<()> {
        let field = |field: &str| (kind, scenario.to_string(), step.to_string(), field.to_string());

        if has_markers(&parts.url) {
            parts.url = self.render(field("url"), &parts.url, ctx)?;
        }

        for (header, value) in parts.headers.iter_mut() {
            if has_markers(value) {
                *value = self.render(field(&format!("header:{}", header)), value, ctx)?;
            }
        }

        if let Some(body) = parts.body.as_mut() {
            if has_markers(body) {
                *body = self.render(field("body"), body, ctx)?;
            }
        }

        Ok(())
    }

    /// Number of compiled templates held
    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.compiled.len()).unwrap_or(0)
    }

    fn render(&self, key: CacheKey, source: &str, ctx: &TemplateContext) -> Result<String> {
        let label = label(&key);
        let compiled = self.compile(key, source, &label)?;
        let tera_ctx = ctx.to_tera(&compiled.refs);

        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .tera
            .render(&compiled.name, &tera_ctx)
            .map_err(|e| ShootError::TemplateExec {
                name: label,
                message: error_chain(&e),
            })
    }

    fn compile(&self, key: CacheKey, source: &str, label: &str) -> Result<Compiled> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(compiled) = cache.compiled.get(&key) {
                return Ok(compiled.clone());
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(compiled) = cache.compiled.get(&key) {
            return Ok(compiled.clone());
        }

        let name = tera_name(key.0, cache.compiled.len());
        cache
            .tera
            .add_raw_template(&name, source)
            .map_err(|e| ShootError::TemplateParse {
                name: label.to_string(),
                message: error_chain(&e),
            })?;
        let compiled = Compiled {
            name,
            refs: Arc::new(TemplateRefs::scan(source)),
        };
        cache.compiled.insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl Default for Templater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Templater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templater").field("cached", &self.cached()).finish()
    }
}

fn has_markers(s: &str) -> bool {
    s.contains("{{") || s.contains("{%") || s.contains("{#")
}

/// tera autoescapes templates whose name ends in `.html`
fn tera_name(kind: TemplaterKind, seq: usize) -> String {
    match kind {
        TemplaterKind::Text => format!("t{}", seq),
        TemplaterKind::Html => format!("t{}.html", seq),
    }
}

fn label((_, scenario, step, field): &CacheKey) -> String {
    format!("{}/{}/{}", scenario, step, field)
}

/// tera keeps the useful detail in the source chain
fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VariableStore;
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn ctx() -> TemplateContext {
        let mut store = VariableStore::new();
        store.insert_global("hostname", json!("localhost"));
        store.insert_source("users", json!([{"name": "alice"}]));
        let mut ctx = TemplateContext::new(Arc::new(store));
        ctx.begin_step("b");
        let mut vars = Map::new();
        vars.insert("auth".to_string(), json!("abc123"));
        vars.insert("html".to_string(), json!("<b>&</b>"));
        ctx.set_preprocessed("b", vars);
        ctx
    }

    fn parts(url: &str, headers: &[(&str, &str)], body: Option<&str>) -> RequestParts {
        RequestParts {
            url: url.to_string(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: body.map(str::to_string),
        }
    }

    #[test]
    fn test_no_markers_is_identity() {
        let templater = Templater::new();
        let original = parts(
            "http://example.com/a?b=c",
            &[("Accept", "application/json")],
            Some(r#"{"a": {"b": 1}}"#),
        );
        let mut rendered = original.clone();
        templater.apply(&mut rendered, &ctx(), TemplaterKind::Text, "s", "b").unwrap();
        assert_eq!(rendered, original);
        assert_eq!(templater.cached(), 0);
    }

    #[test]
    fn test_renders_all_fields() {
        let templater = Templater::new();
        let mut p = parts(
            "http://{{ hostname }}/users/{{ source.users.0.name }}",
            &[("Authorization", "Bearer {{ auth }}"), ("Accept", "*/*")],
            Some(r#"{"user": "{{ source.users.0.name }}"}"#),
        );
        templater.apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b").unwrap();
        assert_eq!(p.url, "http://localhost/users/alice");
        assert_eq!(p.headers["Authorization"], "Bearer abc123");
        assert_eq!(p.headers["Accept"], "*/*");
        assert_eq!(p.body.as_deref(), Some(r#"{"user": "alice"}"#));
    }

    #[test]
    fn test_compiled_once_per_field() {
        let templater = Templater::new();
        for _ in 0..3 {
            let mut p = parts("/{{ auth }}", &[("X", "{{ auth }}")], None);
            templater.apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b").unwrap();
            assert_eq!(p.url, "/abc123");
        }
        assert_eq!(templater.cached(), 2);
    }

    #[test]
    fn test_html_kind_escapes() {
        let templater = Templater::new();
        let mut p = parts("/", &[], Some("<p>{{ html }}</p>"));
        templater.apply(&mut p, &ctx(), TemplaterKind::Html, "s", "b").unwrap();
        assert_eq!(p.body.as_deref(), Some("<p>&lt;b&gt;&amp;&lt;&#x2F;b&gt;</p>"));

        let mut p = parts("/", &[], Some("<p>{{ html }}</p>"));
        templater.apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b").unwrap();
        assert_eq!(p.body.as_deref(), Some("<p><b>&</b></p>"));
    }

    #[test]
    fn test_cache_keeps_names_with_underscores_apart() {
        let templater = Templater::new();
        let ctx = ctx();

        let mut first = parts("/first/{{ auth }}", &[], None);
        templater.apply(&mut first, &ctx, TemplaterKind::Text, "load", "get_user").unwrap();
        let mut second = parts("/second/{{ hostname }}", &[], None);
        templater.apply(&mut second, &ctx, TemplaterKind::Text, "load_get", "user").unwrap();

        assert_eq!(first.url, "/first/abc123");
        assert_eq!(second.url, "/second/localhost");
        assert_eq!(templater.cached(), 2);
    }

    #[test]
    fn test_header_field_does_not_collide_with_url() {
        let templater = Templater::new();
        let mut p = parts("/{{ auth }}", &[("url", "h-{{ hostname }}")], None);
        templater.apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b").unwrap();
        assert_eq!(p.url, "/abc123");
        assert_eq!(p.headers["url"], "h-localhost");
    }

    #[test]
    fn test_generator_functions() {
        let templater = Templater::new();
        let mut p = parts(
            "/n/{{ randInt(from=7, to=7) }}",
            &[("X-Request-Id", "{{ uuid() }}")],
            Some("{{ randString(len=3, chars='k') }}"),
        );
        templater.apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b").unwrap();
        assert_eq!(p.url, "/n/7");
        assert_eq!(p.headers["X-Request-Id"].len(), 36);
        assert_eq!(p.body.as_deref(), Some("kkk"));
    }

    #[test]
    fn test_parse_error() {
        let templater = Templater::new();
        let mut p = parts("/{{ auth ", &[], None);
        let err = templater
            .apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b")
            .unwrap_err();
        assert!(matches!(err, ShootError::TemplateParse { .. }));
    }

    #[test]
    fn test_missing_variable_is_exec_error() {
        let templater = Templater::new();
        let mut p = parts("/{{ nope }}", &[], None);
        let err = templater
            .apply(&mut p, &ctx(), TemplaterKind::Text, "s", "b")
            .unwrap_err();
        match err {
            ShootError::TemplateExec { name, .. } => assert_eq!(name, "s/b/url"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
