//! Hands out numbered ammo in weighted round-robin order

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::{build_scenarios, Ammo, Scenario};
use crate::config::AmmoConfig;
use crate::errors::{Result, ShootError};
use crate::path::PathIterator;
use crate::store::VariableStore;

#[derive(Debug)]
pub struct AmmoProvider {
    /// One spread cycle: each scenario repeated by its spread count
    cycle: Vec<Arc<Scenario>>,
    store: Arc<VariableStore>,
    next_id: AtomicU64,
}

impl AmmoProvider {
    pub fn new(scenarios: Vec<(Arc<Scenario>, usize)>, store: Arc<VariableStore>) -> Result<Self> {
        let cycle: Vec<Arc<Scenario>> = scenarios
            .into_iter()
            .flat_map(|(scenario, count)| std::iter::repeat_n(scenario, count))
            .collect();

        if cycle.is_empty() {
            return Err(ShootError::Config("no scenario has a positive weight".to_string()));
        }

        Ok(Self {
            cycle,
            store,
            next_id: AtomicU64::new(0),
        })
    }

    /// Load variable sources and build scenarios from a parsed ammo file.
    ///
    /// Relative source paths resolve against `base_dir`.
    pub fn from_config(
        config: &AmmoConfig,
        base_dir: &Path,
        iterator: Arc<dyn PathIterator>,
    ) -> Result<Self> {
        let store = VariableStore::load(config.variables.clone(), &config.variable_sources, base_dir)?;
        let scenarios = build_scenarios(config, iterator)?;

        for (scenario, count) in &scenarios {
            info!(
                scenario = %scenario.name,
                steps = scenario.steps.len(),
                spread = count,
                "Scenario loaded"
            );
        }

        Self::new(scenarios, Arc::new(store))
    }

    /// Next ammo; ids increase from 0
    pub fn next(&self) -> Ammo {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let scenario = self.cycle[(id % self.cycle.len() as u64) as usize].clone();
        Ammo::new(id, scenario, self.store.clone())
    }

    pub fn store(&self) -> &Arc<VariableStore> {
        &self.store
    }

    pub fn cycle_len(&self) -> usize {
        self.cycle.len()
    }
}
