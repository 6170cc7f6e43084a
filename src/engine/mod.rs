//! Engine: drives scenario guns at a fixed concurrency
//!
//! Shots are pulled from the [`AmmoProvider`] and spawned onto the runtime;
//! a semaphore caps how many are in flight. The run stops when the shot
//! limit or the deadline is reached, or when the cancellation token fires.

pub mod gun;

pub use gun::{ScenarioGun, ANSWER_LOG_TARGET};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::RunLimit;
use crate::scenario::AmmoProvider;

/// What a finished run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Shots started
    pub shots: u64,
    pub duration: Duration,
    /// Whether the run ended through cancellation
    pub interrupted: bool,
}

pub struct Engine<C> {
    gun: Arc<ScenarioGun<C>>,
    provider: Arc<AmmoProvider>,
    concurrency: usize,
    limit: RunLimit,
    cancel: CancellationToken,
}

impl<C: Client + 'static> Engine<C> {
    pub fn new(gun: ScenarioGun<C>, provider: Arc<AmmoProvider>) -> Self {
        Self {
            gun: Arc::new(gun),
            provider,
            concurrency: 1,
            limit: RunLimit::Shots(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_limit(mut self, limit: RunLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Token observed by the pool; should be the one the gun was built with
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shoot until the limit is hit, then wait for in-flight shots
    pub async fn run(&self) -> RunSummary {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut shots = 0u64;

        let deadline = match self.limit {
            RunLimit::Duration(d) => Some(tokio::time::Instant::now() + d),
            RunLimit::Shots(_) => None,
        };
        let until_deadline = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(until_deadline);

        info!(
            concurrency = self.concurrency,
            limit = ?self.limit,
            scenarios = self.provider.cycle_len(),
            "Starting shooting"
        );

        loop {
            if let RunLimit::Shots(max) = self.limit {
                if shots >= max {
                    break;
                }
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = &mut until_deadline => {
                    debug!("Run deadline reached");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let ammo = self.provider.next();
            let gun = self.gun.clone();
            tasks.spawn(async move {
                gun.shoot(&ammo).await;
                drop(permit);
            });
            shots += 1;

            // Reap finished shots so the set does not grow with the run
            while let Some(res) = tasks.try_join_next() {
                log_join_error(res);
            }
        }

        let interrupted = self.cancel.is_cancelled();

        // A duration limit stops in-flight shots too
        if deadline.is_some() && !interrupted {
            self.cancel.cancel();
        }

        while let Some(res) = tasks.join_next().await {
            log_join_error(res);
        }

        self.gun.client().close_idle_connections();

        let duration = start.elapsed();
        info!(shots, duration = ?duration, interrupted, "Shooting finished");

        RunSummary {
            shots,
            duration,
            interrupted,
        }
    }
}

fn log_join_error(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            warn!(error = %e, "Shot task panicked");
        }
    }
}
