//! Pools: typed views over environment scalars holding molecule counts.

use std::collections::HashMap;
use std::hash::Hash;

use crate::{Environment, EnvironmentError, Result};

/// A non-negative concentration stored in the environment.
///
/// The handle is `Copy`; all operations go through the environment so the
/// one-writer-per-id discipline stays visible at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool {
    env_id: usize,
}

impl Pool {
    pub fn register(env: &mut Environment, baseline: f64) -> Result<Self> {
        if baseline < 0.0 {
            return Err(EnvironmentError::NegativeConcentration(baseline));
        }
        Ok(Self {
            env_id: env.register(baseline, false, false)?,
        })
    }

    pub fn env_id(&self) -> usize {
        self.env_id
    }

    pub fn concentration(&self, env: &Environment) -> f64 {
        env.get(self.env_id)
    }

    pub fn set(&self, env: &Environment, concentration: f64) -> Result<()> {
        if concentration < 0.0 {
            return Err(EnvironmentError::NegativeConcentration(concentration));
        }
        env.set(self.env_id, concentration);
        Ok(())
    }

    pub fn add(&self, env: &Environment, delta: f64) {
        env.add(self.env_id, delta);
    }

    /// Adds without letting the pending value exceed `cap`.
    pub fn add_capped(&self, env: &Environment, delta: f64, cap: f64) {
        env.add_capped(self.env_id, delta, cap);
    }

    /// Removes, clamping the pending value at zero.
    pub fn remove(&self, env: &Environment, delta: f64) {
        env.remove(self.env_id, delta);
    }
}

/// A keyed family of pools, typically one per molecule.
#[derive(Debug, Clone, Default)]
pub struct PoolCluster<K: Eq + Hash> {
    pools: HashMap<K, Pool>,
}

impl<K: Eq + Hash + Copy> PoolCluster<K> {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Registers one pool per key, all at the same baseline.
    pub fn register(
        env: &mut Environment,
        keys: impl IntoIterator<Item = K>,
        baseline: f64,
    ) -> Result<Self> {
        let mut pools = HashMap::new();
        for key in keys {
            pools.insert(key, Pool::register(env, baseline)?);
        }
        Ok(Self { pools })
    }

    pub fn pool(&self, key: K) -> Option<Pool> {
        self.pools.get(&key).copied()
    }

    pub fn contains(&self, key: K) -> bool {
        self.pools.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.pools.keys().copied()
    }

    pub fn concentration(&self, env: &Environment, key: K) -> f64 {
        self.pools.get(&key).map_or(0.0, |p| p.concentration(env))
    }

    pub fn total(&self, env: &Environment) -> f64 {
        self.pools.values().map(|p| p.concentration(env)).sum()
    }
}
