//! Ammo file loading and engine options

pub mod ammo;

pub use ammo::{load_ammo_config, parse_ammo_config, AmmoConfig, PreprocessorConfig, RequestConfig, ScenarioConfig};

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::client::ClientConfig;

/// Which responses are dumped to the answer log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnswerLogFilter {
    /// Answer logging disabled
    #[default]
    Off,
    All,
    /// Status >= 400
    Warning,
    /// Status >= 500
    Error,
}

impl AnswerLogFilter {
    pub fn is_enabled(self) -> bool {
        self != AnswerLogFilter::Off
    }

    pub fn accepts(self, status: u16) -> bool {
        match self {
            AnswerLogFilter::Off => false,
            AnswerLogFilter::All => true,
            AnswerLogFilter::Warning => status >= 400,
            AnswerLogFilter::Error => status >= 500,
        }
    }
}

impl FromStr for AnswerLogFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(AnswerLogFilter::Off),
            "all" => Ok(AnswerLogFilter::All),
            "warning" => Ok(AnswerLogFilter::Warning),
            "error" => Ok(AnswerLogFilter::Error),
            other => Err(format!("unknown answer log filter '{}'", other)),
        }
    }
}

/// How long a run keeps shooting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Fixed number of shots
    Shots(u64),
    /// Keep shooting until the deadline
    Duration(Duration),
}

/// Options for one engine run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL step URLs are resolved against
    pub target: Option<Url>,
    /// Shots in flight at once
    pub concurrency: usize,
    pub limit: RunLimit,
    pub answer_log: AnswerLogFilter,
    /// Seed for `rand` path indices; OS entropy when unset
    pub seed: Option<u64>,
    pub client: ClientConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target: None,
            concurrency: 10,
            limit: RunLimit::Shots(1),
            answer_log: AnswerLogFilter::Off,
            seed: None,
            client: ClientConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_log_filter() {
        let f: AnswerLogFilter = "warning".parse().unwrap();
        assert!(!f.accepts(399));
        assert!(f.accepts(404));
        assert!("error".parse::<AnswerLogFilter>().unwrap().accepts(503));
        assert!(!AnswerLogFilter::Error.accepts(404));
        assert!(AnswerLogFilter::All.accepts(200));
        assert!(!AnswerLogFilter::Off.is_enabled());
        assert!("loud".parse::<AnswerLogFilter>().is_err());
    }
}
