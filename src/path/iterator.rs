//! Shared index cursors for `next` and `rand` path indices
//!
//! One `IteratorState` is built per engine run and shared by every shot, so
//! `[next]` walks a source list round-robin across all concurrent shots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of `next`/`rand` indices used by the path resolver
pub trait PathIterator: Send + Sync {
    /// Next raw counter value for `key`, starting at 0.
    ///
    /// The caller wraps the value into the container length.
    fn next(&self, key: &str) -> usize;

    /// Uniform index in `[0, n)`; 0 when `n == 0`
    fn rand(&self, n: usize) -> usize;
}

/// Thread-safe cursors keyed by textual path, plus one seeded random source
pub struct IteratorState {
    counters: DashMap<String, AtomicU64>,
    rng: Mutex<StdRng>,
}

impl IteratorState {
    /// Create a state with a fixed seed (reproducible `rand` sequence)
    pub fn new(seed: u64) -> Self {
        Self {
            counters: DashMap::new(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Create a state seeded from the OS
    pub fn from_os_rng() -> Self {
        Self {
            counters: DashMap::new(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Number of distinct cursors created so far
    pub fn cursor_count(&self) -> usize {
        self.counters.len()
    }
}

impl Default for IteratorState {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl std::fmt::Debug for IteratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IteratorState")
            .field("cursors", &self.counters.len())
            .finish()
    }
}

impl PathIterator for IteratorState {
    fn next(&self, key: &str) -> usize {
        // Fast path avoids allocating the key once the cursor exists
        if let Some(counter) = self.counters.get(key) {
            return counter.fetch_add(1, Ordering::Relaxed) as usize;
        }
        self.counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed) as usize
    }

    fn rand(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(0..n)
    }
}
