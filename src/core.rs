//! Program flow: parse arguments, load the ammo file, shoot, report

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::aggregator::{collect, format_results, Aggregator, ChannelAggregator};
use crate::cli::{Args, LogFormat};
use crate::client::HttpClient;
use crate::config::load_ammo_config;
use crate::engine::{Engine, ScenarioGun};
use crate::path::{IteratorState, PathIterator};
use crate::scenario::AmmoProvider;
use crate::signals;
use crate::status::ExitStatus;

/// Main entry point for the CLI
pub fn run(args: Vec<String>) -> ExitStatus {
    let parsed = match Args::try_parse_from(&args) {
        Ok(args) => args,
        Err(e) => {
            e.print().ok();
            return if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion
            {
                ExitStatus::Success
            } else {
                ExitStatus::Error
            };
        }
    };

    init_tracing(&parsed);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            return ExitStatus::Error;
        }
    };

    match runtime.block_on(program(parsed)) {
        Ok(status) => status,
        Err(e) => handle_error(e),
    }
}

fn init_tracing(args: &Args) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded in tests
    let _ = match args.log_format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub async fn program(args: Args) -> anyhow::Result<ExitStatus> {
    let config = args.engine_config();

    let ammo = load_ammo_config(&args.ammo)
        .with_context(|| format!("failed to load ammo file {}", args.ammo.display()))?;
    let base_dir = args.ammo.parent().unwrap_or_else(|| Path::new("."));

    let iterator: Arc<dyn PathIterator> = Arc::new(match config.seed {
        Some(seed) => IteratorState::new(seed),
        None => IteratorState::from_os_rng(),
    });
    let provider = Arc::new(AmmoProvider::from_config(&ammo, base_dir, iterator)?);

    let client = HttpClient::new(&config.client).context("failed to build HTTP client")?;

    let (aggregator, rx) = ChannelAggregator::new();
    let collector = tokio::spawn(collect(rx));
    let aggregator: Arc<dyn Aggregator> = Arc::new(aggregator);

    let cancel = signals::shutdown_token().child_token();
    let gun = ScenarioGun::new(Arc::new(client), aggregator)
        .with_target(config.target.clone())
        .with_answer_log(config.answer_log)
        .with_cancellation(cancel.clone());

    let summary = {
        let engine = Engine::new(gun, provider)
            .with_concurrency(config.concurrency)
            .with_limit(config.limit)
            .with_cancellation(cancel);
        // Dropping the engine closes the last sample sender
        engine.run().await
    };

    let stats = collector
        .await
        .context("sample collector failed")?
        .finalize(summary.duration);

    info!(shots = summary.shots, samples = stats.total.samples, "Run complete");
    println!("{}", format_results(&stats));

    if summary.interrupted || signals::was_interrupted() {
        return Ok(ExitStatus::Interrupted);
    }
    Ok(ExitStatus::Success)
}

fn handle_error(err: anyhow::Error) -> ExitStatus {
    eprintln!("Error: {:#}", err);
    ExitStatus::Error
}
