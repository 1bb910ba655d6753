//! Double-buffered shared-scalar store for neural simulations.
//!
//! Every scalar that more than one component may observe (soma voltages,
//! neurotransmitter pool concentrations, dendrite bound counts) lives in a
//! single [`Environment`]. Two buffers are kept: readers always see the
//! `prev` buffer, writers always mutate the `next` buffer, and a `step()`
//! call publishes `next` into `prev`. All cross-component coupling is
//! therefore delayed by exactly one tick, which is what makes lock-free
//! parallel stepping of the neuron graph race-free.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

pub mod pool;

pub use pool::{Pool, PoolCluster};

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Registration after the environment was sealed")]
    Sealed,

    #[error("Negative concentration: {0}")]
    NegativeConcentration(f64),
}

pub type Result<T> = std::result::Result<T, EnvironmentError>;

/// Voltage at or above which a recorded value counts as a spike (mV).
pub const SPIKE_THRESHOLD: f64 = 30.0;

/// An `f64` cell with atomic access, stored as raw bits in an `AtomicU64`.
///
/// The simulation guarantees a single writer per cell within a tick, so
/// relaxed loads and stores are sufficient; `fetch_update` uses a
/// compare-exchange loop and stays correct even without that guarantee.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Applies `f` to the current value atomically and returns the new value.
    pub fn fetch_update(&self, f: impl Fn(f64) -> f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let updated = f(f64::from_bits(current)).to_bits();
            match self.0.compare_exchange_weak(
                current,
                updated,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return f64::from_bits(updated),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}

/// Per-id instrumentation requested at registration time.
#[derive(Debug, Clone, Copy, Default)]
struct Instrumentation {
    record: bool,
    spiking: bool,
}

/// The double-buffered scalar store.
///
/// Ids are handed out by [`Environment::register`] and are stable for the
/// lifetime of the environment. Registration must complete before the engine
/// starts stepping; [`Environment::seal`] enforces this.
#[derive(Debug, Default)]
pub struct Environment {
    prev: Vec<f64>,
    next: Vec<AtomicF64>,
    dirty: AtomicBool,
    sealed: bool,
    instrumentation: Vec<Instrumentation>,
    records: Vec<Vec<f64>>,
    spikes: Vec<u64>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new scalar initialized in both buffers.
    ///
    /// `record` keeps a per-step trace of the published value; `spiking`
    /// additionally counts steps on which the published value reaches
    /// [`SPIKE_THRESHOLD`].
    pub fn register(&mut self, initial: f64, record: bool, spiking: bool) -> Result<usize> {
        if self.sealed {
            return Err(EnvironmentError::Sealed);
        }
        let env_id = self.prev.len();
        self.prev.push(initial);
        self.next.push(AtomicF64::new(initial));
        self.instrumentation.push(Instrumentation { record, spiking });
        self.records.push(Vec::new());
        self.spikes.push(0);
        Ok(env_id)
    }

    /// Freezes the id space. Called by the engine before the first tick.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn len(&self) -> usize {
        self.prev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev.is_empty()
    }

    /// Reads the value published by the most recent `step()`.
    pub fn get(&self, env_id: usize) -> f64 {
        self.prev[env_id]
    }

    /// Overwrites the pending value.
    pub fn set(&self, env_id: usize, value: f64) {
        self.dirty.store(true, Ordering::Relaxed);
        self.next[env_id].store(value);
    }

    /// Adds `delta` to the pending value.
    pub fn add(&self, env_id: usize, delta: f64) {
        self.dirty.store(true, Ordering::Relaxed);
        self.next[env_id].fetch_update(|v| v + delta);
    }

    /// Removes `delta` from the pending value, clamping at zero.
    pub fn remove(&self, env_id: usize, delta: f64) {
        self.dirty.store(true, Ordering::Relaxed);
        self.next[env_id].fetch_update(|v| (v - delta).max(0.0));
    }

    /// Adds `delta` to the pending value without exceeding `cap`.
    pub fn add_capped(&self, env_id: usize, delta: f64, cap: f64) {
        self.dirty.store(true, Ordering::Relaxed);
        self.next[env_id].fetch_update(|v| (v + delta).min(cap));
    }

    /// Reads the pending (not yet published) value.
    pub fn peek_next(&self, env_id: usize) -> f64 {
        self.next[env_id].load()
    }

    /// Publishes pending writes and runs instrumentation.
    ///
    /// Returns `true` when the environment is stable: nothing wrote to the
    /// next buffer since the last step.
    pub fn step(&mut self) -> bool {
        for (env_id, inst) in self.instrumentation.iter().enumerate() {
            if inst.record {
                self.records[env_id].push(self.prev[env_id]);
            }
            if inst.spiking && self.prev[env_id] >= SPIKE_THRESHOLD {
                self.spikes[env_id] += 1;
            }
        }

        if self.dirty.swap(false, Ordering::Relaxed) {
            for (prev, next) in self.prev.iter_mut().zip(&self.next) {
                *prev = next.load();
            }
            false
        } else {
            true
        }
    }

    /// The recorded trace for an id registered with `record = true`.
    pub fn record(&self, env_id: usize) -> &[f64] {
        &self.records[env_id]
    }

    /// The spike count for an id registered with `spiking = true`.
    pub fn spike_count(&self, env_id: usize) -> u64 {
        self.spikes[env_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut env = Environment::new();
        let a = env.register(-65.0, false, false).unwrap();
        let b = env.register(0.5, false, false).unwrap();

        assert_eq!(env.get(a), -65.0);
        assert_eq!(env.get(b), 0.5);

        // Untouched ids keep their value across steps.
        env.step();
        assert_eq!(env.get(a), -65.0);
    }

    #[test]
    fn test_writes_publish_on_step() {
        let mut env = Environment::new();
        let id = env.register(1.0, false, false).unwrap();

        env.set(id, 2.0);
        assert_eq!(env.get(id), 1.0);

        let stable = env.step();
        assert!(!stable);
        assert_eq!(env.get(id), 2.0);

        // No writes: the next step reports stability.
        assert!(env.step());
    }

    #[test]
    fn test_reads_independent_of_write_order() {
        let mut env = Environment::new();
        let a = env.register(10.0, false, false).unwrap();
        let b = env.register(20.0, false, false).unwrap();

        // Interleaved writes never leak into the read buffer mid-tick.
        env.set(a, 11.0);
        assert_eq!(env.get(b), 20.0);
        env.add(b, 5.0);
        assert_eq!(env.get(a), 10.0);
        env.remove(a, 100.0);

        env.step();
        assert_eq!(env.get(a), 0.0);
        assert_eq!(env.get(b), 25.0);
    }

    #[test]
    fn test_remove_clamps_at_zero() {
        let mut env = Environment::new();
        let id = env.register(0.25, false, false).unwrap();
        env.remove(id, 1.0);
        env.step();
        assert_eq!(env.get(id), 0.0);
    }

    #[test]
    fn test_add_capped() {
        let mut env = Environment::new();
        let id = env.register(9.5, false, false).unwrap();
        env.add_capped(id, 0.3, 10.0);
        env.add_capped(id, 0.3, 10.0);
        env.step();
        assert_eq!(env.get(id), 10.0);
    }

    #[test]
    fn test_recording_and_spikes() {
        let mut env = Environment::new();
        let id = env.register(-70.0, true, true).unwrap();

        env.set(id, 31.0);
        env.step();
        env.set(id, -70.0);
        env.step();
        env.step();

        assert_eq!(env.record(id), &[-70.0, 31.0, -70.0]);
        assert_eq!(env.spike_count(id), 1);
    }

    #[test]
    fn test_register_after_seal_fails() {
        let mut env = Environment::new();
        env.register(0.0, false, false).unwrap();
        env.seal();
        assert!(matches!(
            env.register(0.0, false, false),
            Err(EnvironmentError::Sealed)
        ));
    }
}
