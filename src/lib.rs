//! QuicShot library interface
//!
//! A scenario-driven HTTP load generator. Each shot runs an ordered list of
//! request steps; values extracted from one response feed the templates of
//! later steps.
//!
//! # Module Organization
//!
//! - [`engine`] - Scenario gun (step executor) and the shooting pool
//! - [`scenario`] - Steps, scenarios, ammo and the weighted provider
//! - [`process`] - Preprocessor and response postprocessors
//! - [`template`] - Tera-backed request templating
//! - [`store`] / [`context`] - Shared variable data and the per-shot scope
//! - [`path`] - Variable path resolution with `next`/`rand`/`last` indices
//! - [`client`] - Client trait and the reqwest-backed implementation
//! - [`aggregator`] / [`sample`] - Per-step samples and run statistics
//! - [`config`] / [`cli`] - Ammo file loading and command-line options
//! - [`signals`] / [`status`] - Interrupt handling and exit codes
//! - [`core`] - Main execution logic

pub mod aggregator;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod errors;
pub mod path;
pub mod process;
pub mod sample;
pub mod scenario;
pub mod signals;
pub mod status;
pub mod store;
pub mod template;
