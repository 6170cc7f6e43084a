//! Read-only variable data shared by every shot
//!
//! The store holds static template variables (visible at the template root)
//! and named sources (visible under `source.<name>`). It is built once before
//! shooting and never mutated afterwards.

pub mod csv;
pub mod json;

pub use self::csv::{read_csv, CsvOptions};
pub use self::json::read_json;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::errors::{Result, ShootError};
use crate::template::compute_calls;

/// One named data source in the ammo file
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum VariableSourceConfig {
    #[serde(rename = "file/csv")]
    Csv(CsvSourceConfig),
    #[serde(rename = "file/json")]
    Json(JsonSourceConfig),
    #[serde(rename = "variables")]
    Inline(InlineSourceConfig),
}

impl VariableSourceConfig {
    pub fn name(&self) -> &str {
        match self {
            VariableSourceConfig::Csv(c) => &c.name,
            VariableSourceConfig::Json(c) => &c.name,
            VariableSourceConfig::Inline(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CsvSourceConfig {
    pub name: String,
    pub file: PathBuf,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub skip_header: bool,
    #[serde(default)]
    pub header_as_fields: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSourceConfig {
    pub name: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineSourceConfig {
    pub name: String,
    #[serde(default)]
    pub variables: Map<String, JsonValue>,
}

#[derive(Debug)]
pub struct VariableStore {
    globals: Map<String, JsonValue>,
    sources: JsonValue,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            globals: Map::new(),
            sources: JsonValue::Object(Map::new()),
        }
    }

    /// Build the store from static variables and source definitions.
    ///
    /// Relative source file paths are resolved against `base_dir`.
    pub fn load(
        globals: Map<String, JsonValue>,
        sources: &[VariableSourceConfig],
        base_dir: &Path,
    ) -> Result<Self> {
        let mut store = Self::new();
        store.globals = globals;

        for config in sources {
            let name = config.name();
            if name.is_empty() {
                return Err(ShootError::Config("variable source without a name".to_string()));
            }
            if store.source(name).is_some() {
                return Err(ShootError::Source {
                    name: name.to_string(),
                    message: "duplicate source name".to_string(),
                });
            }

            let value = load_source(config, base_dir)?;
            debug!(source = name, "Loaded variable source");
            store.insert_source(name, value);
        }

        Ok(store)
    }

    pub fn insert_global(&mut self, key: impl Into<String>, value: JsonValue) {
        self.globals.insert(key.into(), value);
    }

    pub fn insert_source(&mut self, name: impl Into<String>, value: JsonValue) {
        if let JsonValue::Object(sources) = &mut self.sources {
            sources.insert(name.into(), value);
        }
    }

    /// Static variables, visible at the template root
    pub fn globals(&self) -> &Map<String, JsonValue> {
        &self.globals
    }

    /// All sources as one object keyed by source name
    pub fn sources(&self) -> &JsonValue {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&JsonValue> {
        self.sources.get(name)
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

fn load_source(config: &VariableSourceConfig, base_dir: &Path) -> Result<JsonValue> {
    let source_err = |message: String| ShootError::Source {
        name: config.name().to_string(),
        message,
    };

    match config {
        VariableSourceConfig::Csv(c) => {
            let file = open(&base_dir.join(&c.file)).map_err(source_err)?;
            let opts = CsvOptions {
                fields: c.fields.clone(),
                skip_header: c.skip_header,
                header_as_fields: c.header_as_fields,
            };
            let rows = read_csv(file, &opts).map_err(|e| source_err(e.to_string()))?;
            Ok(JsonValue::Array(rows))
        }
        VariableSourceConfig::Json(c) => {
            let file = open(&base_dir.join(&c.file)).map_err(source_err)?;
            read_json(file).map_err(|e| source_err(e.to_string()))
        }
        VariableSourceConfig::Inline(c) => {
            let mut value = JsonValue::Object(c.variables.clone());
            compute_calls(&mut value);
            Ok(value)
        }
    }
}

fn open(path: &Path) -> std::result::Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        let mut f = File::create(dir.path().join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_all_source_kinds() {
        let dir = TempDir::new().unwrap();
        write(&dir, "users.csv", "id,name\n1,alice\n2,bob\n");
        write(&dir, "filter.json", r#"{"q": ["a", "b"]}"#);

        let sources: Vec<VariableSourceConfig> = serde_json::from_value(json!([
            {"type": "file/csv", "name": "users", "file": "users.csv", "skip_header": true},
            {"type": "file/json", "name": "filter", "file": "filter.json"},
            {"type": "variables", "name": "global", "variables": {"a": 1}}
        ]))
        .unwrap();

        let mut globals = Map::new();
        globals.insert("hostname".into(), json!("localhost"));

        let store = VariableStore::load(globals, &sources, dir.path()).unwrap();
        assert_eq!(
            store.source("users"),
            Some(&json!([{"id": "1", "name": "alice"}, {"id": "2", "name": "bob"}]))
        );
        assert_eq!(store.source("filter"), Some(&json!({"q": ["a", "b"]})));
        assert_eq!(store.source("global"), Some(&json!({"a": 1})));
        assert_eq!(store.globals().get("hostname"), Some(&json!("localhost")));
    }

    #[test]
    fn test_duplicate_source_name() {
        let sources: Vec<VariableSourceConfig> = serde_json::from_value(json!([
            {"type": "variables", "name": "v", "variables": {}},
            {"type": "variables", "name": "v", "variables": {}}
        ]))
        .unwrap();
        let err = VariableStore::load(Map::new(), &sources, Path::new(".")).unwrap_err();
        assert!(matches!(err, ShootError::Source { .. }));
    }

    #[test]
    fn test_missing_file() {
        let sources: Vec<VariableSourceConfig> = serde_json::from_value(json!([
            {"type": "file/json", "name": "gone", "file": "does-not-exist.json"}
        ]))
        .unwrap();
        let err = VariableStore::load(Map::new(), &sources, Path::new("/nonexistent")).unwrap_err();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_inline_calls_are_computed_once() {
        let sources: Vec<VariableSourceConfig> = serde_json::from_value(json!([
            {"type": "variables", "name": "gen", "variables": {
                "n": "randInt(3, 3)",
                "ids": ["randString(4, x)", "literal"]
            }}
        ]))
        .unwrap();
        let store = VariableStore::load(Map::new(), &sources, Path::new(".")).unwrap();
        assert_eq!(store.source("gen"), Some(&json!({"n": "3", "ids": ["xxxx", "literal"]})));
    }
}
