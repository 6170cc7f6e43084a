//! CLI argument definitions using clap

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use url::Url;

use crate::client::ClientConfig;
use crate::config::{AnswerLogFilter, EngineConfig, RunLimit};

/// QuicShot - scenario-driven HTTP load generator
#[derive(Parser, Debug, Clone)]
#[command(name = "quicshot", version, about, long_about = None)]
pub struct Args {
    /// Ammo file describing requests and scenarios (.yaml, .toml or .json)
    #[arg(value_name = "AMMO_FILE")]
    pub ammo: PathBuf,

    // =========================================================================
    // TARGET
    // =========================================================================

    /// Base URL step URLs are resolved against (e.g. http://localhost:8080)
    #[arg(short = 't', long = "target", value_name = "URL", env = "QUICSHOT_TARGET")]
    pub target: Option<Url>,

    /// Follow redirects
    #[arg(short = 'F', long = "follow", action = ArgAction::SetTrue)]
    pub follow: bool,

    /// Maximum redirects to follow with --follow
    #[arg(long = "max-redirects", value_name = "NUM", default_value = "10")]
    pub max_redirects: usize,

    /// Skip TLS certificate verification
    #[arg(long = "insecure", action = ArgAction::SetTrue)]
    pub insecure: bool,

    /// Request timeout (e.g. 5s, 500ms)
    #[arg(long = "timeout", value_name = "DURATION", default_value = "30s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Connection timeout (e.g. 2s)
    #[arg(long = "connect-timeout", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Shots in flight at once
    #[arg(short = 'c', long = "concurrency", value_name = "NUM", default_value = "10")]
    pub concurrency: usize,

    /// Total number of shots (default: 1 unless --duration is given)
    #[arg(short = 'n', long = "shots", value_name = "NUM", conflicts_with = "duration")]
    pub shots: Option<u64>,

    /// Keep shooting for this long (e.g. 30s, 5m)
    #[arg(short = 'd', long = "duration", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Seed for `rand` indices in variable paths
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    // =========================================================================
    // LOGGING
    // =========================================================================

    /// Dump requests and responses: all, warning (status >= 400), error (status >= 500)
    #[arg(long = "answ-log", value_name = "FILTER", default_value = "off")]
    pub answer_log: AnswerLogFilter,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Output format for structured logging: json (JSON Lines) or text (default)
    #[arg(long = "log-format", value_name = "FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn limit(&self) -> RunLimit {
        match (self.shots, self.duration) {
            (_, Some(d)) => RunLimit::Duration(d),
            (Some(n), None) => RunLimit::Shots(n),
            (None, None) => RunLimit::Shots(1),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            target: self.target.clone(),
            concurrency: self.concurrency.max(1),
            limit: self.limit(),
            answer_log: self.answer_log,
            seed: self.seed,
            client: ClientConfig {
                timeout: Some(self.timeout),
                connect_timeout: self.connect_timeout,
                follow_redirects: self.follow,
                max_redirects: self.max_redirects,
                insecure: self.insecure,
                ..ClientConfig::default()
            },
        }
    }

    /// Default filter directive for the tracing subscriber
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Log output format
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text output (default)
    #[default]
    Text,
    /// JSON Lines format for parsing
    Json,
}
