//! Top-level names a template reads
//!
//! Rendering only copies these names into the tera context, so a large
//! variable source costs nothing for templates that never mention it. Under
//! `source` the scan narrows further to `source.<name>`.

use std::collections::BTreeSet;

use crate::context::SOURCE_KEY;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRefs {
    names: BTreeSet<String>,
    sources: BTreeSet<String>,
    all_sources: bool,
}

impl TemplateRefs {
    /// Collect identifiers from every `{{ }}` and `{% %}` block of `source`.
    ///
    /// The scan over-approximates: keywords, filter names and loop variables
    /// are collected too and simply miss when looked up.
    pub fn scan(source: &str) -> Self {
        let mut refs = Self::default();
        let mut rest = source;

        while let Some(start) = find_open(rest) {
            let close = if rest[start..].starts_with("{{") { "}}" } else { "%}" };
            let body = &rest[start + 2..];
            let end = body.find(close).unwrap_or(body.len());
            refs.scan_expr(&body[..end]);
            rest = &body[(end + 2).min(body.len())..];
        }

        refs
    }

    /// Root-level names other than `source`
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Named sources read as `source.<name>`
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    /// `source` is read as a whole (iterated, indexed with brackets, ...)
    pub fn all_sources(&self) -> bool {
        self.all_sources
    }

    fn scan_expr(&mut self, expr: &str) {
        let bytes = expr.as_bytes();
        let mut i = 0;
        let mut after_dot = false;

        while i < bytes.len() {
            let c = bytes[i];
            match c {
                b'"' | b'\'' | b'`' => {
                    i += 1;
                    while i < bytes.len() && bytes[i] != c {
                        i += 1;
                    }
                    i += 1;
                    after_dot = false;
                }
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    let start = i;
                    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                        i += 1;
                    }
                    if !after_dot {
                        self.add(&expr[start..i], &expr[i..]);
                    }
                    after_dot = false;
                }
                b'.' => {
                    after_dot = true;
                    i += 1;
                }
                c if c.is_ascii_whitespace() => i += 1,
                _ => {
                    after_dot = false;
                    i += 1;
                }
            }
        }
    }

    fn add(&mut self, ident: &str, rest: &str) {
        if ident != SOURCE_KEY {
            self.names.insert(ident.to_string());
            return;
        }
        match source_name(rest) {
            Some(name) => {
                self.sources.insert(name.to_string());
            }
            None => self.all_sources = true,
        }
    }
}

fn find_open(s: &str) -> Option<usize> {
    match (s.find("{{"), s.find("{%")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// `name` in `.name...` following `source`
fn source_name(rest: &str) -> Option<&str> {
    let rest = rest.trim_start().strip_prefix('.')?.trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(refs: &TemplateRefs) -> Vec<&str> {
        refs.names().collect()
    }

    #[test]
    fn test_plain_text_has_no_refs() {
        let refs = TemplateRefs::scan("http://example.com/a?b=c");
        assert_eq!(refs, TemplateRefs::default());
    }

    #[test]
    fn test_root_names_only() {
        let refs = TemplateRefs::scan("/{{ user.name }}/{{ request.auth.token | lower }}?x={{ 'lit' }}");
        assert_eq!(names(&refs), vec!["lower", "request", "user"]);
        assert!(!refs.all_sources());
    }

    #[test]
    fn test_source_narrowed_to_name() {
        let refs = TemplateRefs::scan("{{ source.users.0.name }} {{ source . filter }}");
        assert_eq!(refs.sources().collect::<Vec<_>>(), vec!["filter", "users"]);
        assert!(!refs.all_sources());
        assert!(names(&refs).is_empty());
    }

    #[test]
    fn test_whole_source() {
        let refs = TemplateRefs::scan("{% for k in source %}{{ k }}{% endfor %}");
        assert!(refs.all_sources());
        assert_eq!(names(&refs), vec!["endfor", "for", "in", "k"]);
    }

    #[test]
    fn test_unclosed_block() {
        let refs = TemplateRefs::scan("/{{ auth ");
        assert_eq!(names(&refs), vec!["auth"]);
    }
}
