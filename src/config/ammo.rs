//! Ammo file: requests, scenarios and variable sources

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::errors::{Result, ShootError};
use crate::process::Postprocessor;
use crate::store::VariableSourceConfig;
use crate::template::TemplaterKind;

/// Maximum ammo file size (1MB)
const MAX_AMMO_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AmmoConfig {
    /// Static variables, visible at the template root
    #[serde(default)]
    pub variables: Map<String, JsonValue>,
    #[serde(default, alias = "variablesources")]
    pub variable_sources: Vec<VariableSourceConfig>,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(alias = "url")]
    pub uri: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Defaults to the request name
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub templater: TemplaterKind,
    #[serde(default)]
    pub preprocessor: Option<PreprocessorConfig>,
    #[serde(default)]
    pub postprocessors: Vec<Postprocessor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(alias = "variables")]
    pub mapping: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u64,
    /// Milliseconds
    #[serde(default)]
    pub min_waiting_time: u64,
    #[serde(alias = "requests")]
    pub shoot: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_weight() -> u64 {
    1
}

/// Load an ammo file; the format is chosen by extension (`yaml`/`yml`,
/// `toml`, `json`), falling back to YAML then TOML.
pub fn load_ammo_config(path: &Path) -> Result<AmmoConfig> {
    let metadata = fs::metadata(path)?;
    if metadata.len() > MAX_AMMO_FILE_SIZE {
        return Err(ShootError::Config(format!(
            "Ammo file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_AMMO_FILE_SIZE
        )));
    }

    let content = fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let config = parse_ammo_config(&content, &extension)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_ammo_config(content: &str, format: &str) -> Result<AmmoConfig> {
    match format {
        "yaml" | "yml" => serde_yaml::from_str(content)
            .map_err(|e| ShootError::Config(format!("Failed to parse YAML ammo: {}", e))),
        "toml" => toml::from_str(content)
            .map_err(|e| ShootError::Config(format!("Failed to parse TOML ammo: {}", e))),
        "json" => serde_json::from_str(content)
            .map_err(|e| ShootError::Config(format!("Failed to parse JSON ammo: {}", e))),
        _ => serde_yaml::from_str(content).or_else(|_| {
            toml::from_str(content)
                .map_err(|e| ShootError::Config(format!("Failed to parse ammo: {}", e)))
        }),
    }
}

fn validate(config: &AmmoConfig) -> Result<()> {
    if config.scenarios.is_empty() {
        return Err(ShootError::Config("Ammo must define at least one scenario".to_string()));
    }

    let mut names = HashSet::new();
    for (i, req) in config.requests.iter().enumerate() {
        if req.name.is_empty() {
            return Err(ShootError::Config(format!("Request {} must have a name", i + 1)));
        }
        if !names.insert(req.name.as_str()) {
            return Err(ShootError::Config(format!("Duplicate request name '{}'", req.name)));
        }
        if req.uri.is_empty() {
            return Err(ShootError::Config(format!("Request '{}' must have a uri", req.name)));
        }
    }

    let mut names = HashSet::new();
    for (i, sc) in config.scenarios.iter().enumerate() {
        if sc.name.is_empty() {
            return Err(ShootError::Config(format!("Scenario {} must have a name", i + 1)));
        }
        if !names.insert(sc.name.as_str()) {
            return Err(ShootError::Config(format!("Duplicate scenario name '{}'", sc.name)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
variables:
  hostname: localhost
variable_sources:
  - type: variables
    name: global
    variables: { a: 1 }
requests:
  - name: auth
    method: POST
    uri: /auth
    headers:
      Content-Type: application/json
    body: '{"name": "{{ user }}"}'
    preprocessor:
      mapping:
        user: source.global.a
    postprocessors:
      - type: var/jsonpath
        mapping:
          token: $.token
  - name: list
    uri: /list
scenarios:
  - name: s1
    weight: 50
    min_waiting_time: 1000
    shoot: [auth(1), sleep(100), list(2)]
"#;

    #[test]
    fn test_parse_yaml() {
        let config = parse_ammo_config(YAML, "yaml").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.variables.get("hostname"), Some(&JsonValue::from("localhost")));
        assert_eq!(config.requests.len(), 2);
        assert_eq!(config.requests[1].method, "GET");
        assert_eq!(config.requests[0].postprocessors.len(), 1);
        assert_eq!(
            config.requests[0].preprocessor.as_ref().unwrap().mapping["user"],
            "source.global.a"
        );
        assert_eq!(config.scenarios[0].shoot, vec!["auth(1)", "sleep(100)", "list(2)"]);
        assert_eq!(config.scenarios[0].min_waiting_time, 1000);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[[requests]]
name = "ping"
uri = "/ping"

[[scenarios]]
name = "s"
shoot = ["ping"]
"#;
        let config = parse_ammo_config(toml, "toml").unwrap();
        assert_eq!(config.scenarios[0].weight, 1);
        assert_eq!(config.requests[0].uri, "/ping");
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let json = r#"{
            "requests": [{"name": "a", "uri": "/a"}, {"name": "a", "uri": "/b"}],
            "scenarios": [{"name": "s", "shoot": ["a"]}]
        }"#;
        let config = parse_ammo_config(json, "json").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = load_ammo_config(file.path()).unwrap();
        assert_eq!(config.scenarios[0].name, "s1");
    }

    #[test]
    fn test_no_scenarios() {
        let config = parse_ammo_config("requests: []", "yaml").unwrap();
        assert!(validate(&config).is_err());
    }
}
