//! The simulation engine: graph construction, drivers, probes, and the
//! per-tick driver loop with sparse activation.
//!
//! The engine owns the environment and flat arenas of neurons; every
//! cross-component reference is an integer handle. One tick runs in a fixed
//! order: drivers fire, active neurons step (serially or on a rayon worker
//! pool over contiguous id ranges), probes record, the environment publishes,
//! and the next tick's activity set is derived from stability flags. All
//! cross-neuron coupling is read from the previous tick's buffer, which is
//! what makes the parallel schedule bit-identical to the serial one.

use std::collections::HashMap;

use environment::Environment;
use ndarray::Array2;
use neurons::SomaDynamics;
use rayon::prelude::*;
use synapses::{ChemicalSynapse, ReleaseMode, SimpleSynapse};
use thiserror::Error;
use tracing::debug;

pub mod drivers;
pub mod neuron;
pub mod probes;

pub use drivers::{ActivationPulseDriver, ConstantDriver, Driver, PulseDriver, Stimulus};
pub use neuron::{GapJunction, Neuron, NeuronConfig, NeuronKind, SomaModel, Synapse};
pub use probes::{Probe, ProbeKind, ProbeTarget};
pub use synapses::SynapseConfig;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid engine parameter: {0}")]
    InvalidParameter(String),

    #[error("Lifecycle violation: {0}")]
    LifecycleViolation(String),

    #[error("Unknown probe or driver name: {0}")]
    UnknownName(String),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Environment(#[from] environment::EnvironmentError),

    #[error(transparent)]
    Soma(#[from] neurons::SomaError),

    #[error(transparent)]
    Synapse(#[from] synapses::SynapseError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Opaque handle to a neuron in the engine's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeuronId(pub(crate) usize);

impl NeuronId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Opaque handle to a synapse: the owning presynaptic neuron plus the slot
/// in its outgoing list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SynapseId {
    pub(crate) neuron: usize,
    pub(crate) index: usize,
}

/// The simulation engine and graph factory.
pub struct Engine {
    env: Environment,
    neurons: Vec<Neuron>,
    /// Downstream and gap-coupled neighbors, woken while a neuron is
    /// unstable.
    neighbors: Vec<Vec<usize>>,
    drivers: Vec<(usize, Box<dyn Driver>)>,
    driver_names: HashMap<String, usize>,
    probes: Vec<Probe>,
    probe_names: HashMap<String, usize>,
    active: Vec<bool>,
    time: u64,
    stable: bool,
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
    seed: u64,
    noise: f64,
    synapse_count: u64,
    started: bool,
    closed: bool,
}

impl Engine {
    /// An engine stepping neurons on `num_threads` workers (1 = serial).
    pub fn new(num_threads: usize) -> Self {
        Self::with_seed(num_threads, 0)
    }

    /// Seeds every synapse's stochastic stream; identical seeds give
    /// identical trajectories for any thread count.
    pub fn with_seed(num_threads: usize, seed: u64) -> Self {
        Self {
            env: Environment::new(),
            neurons: Vec::new(),
            neighbors: Vec::new(),
            drivers: Vec::new(),
            driver_names: HashMap::new(),
            probes: Vec::new(),
            probe_names: HashMap::new(),
            active: Vec::new(),
            time: 0,
            stable: false,
            num_threads: num_threads.max(1),
            pool: None,
            seed,
            noise: 0.0,
            synapse_count: 0,
            started: false,
            closed: false,
        }
    }

    /// Engine-wide stochastic noise level. Must be set before synapses are
    /// created; zero keeps every draw on its deterministic envelope.
    pub fn set_noise(&mut self, noise: f64) -> Result<()> {
        if noise < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "negative noise {noise}"
            )));
        }
        self.noise = noise;
        Ok(())
    }

    fn check_construction_allowed(&self) -> Result<()> {
        if self.started {
            return Err(EngineError::LifecycleViolation(
                "graph construction after the first step".into(),
            ));
        }
        Ok(())
    }

    pub fn create_neuron(&mut self, config: &NeuronConfig) -> Result<NeuronId> {
        self.check_construction_allowed()?;
        let id = self.neurons.len();
        let neuron = Neuron::new(&mut self.env, id, config)?;
        self.neurons.push(neuron);
        self.neighbors.push(Vec::new());
        Ok(NeuronId(id))
    }

    /// A `height x width` grid of identically configured neurons.
    pub fn create_neuron_grid(
        &mut self,
        width: usize,
        height: usize,
        config: &NeuronConfig,
    ) -> Result<Array2<NeuronId>> {
        let mut ids = Vec::with_capacity(width * height);
        for _ in 0..height {
            for _ in 0..width {
                ids.push(self.create_neuron(config)?);
            }
        }
        Array2::from_shape_vec((height, width), ids)
            .map_err(|e| EngineError::InvalidParameter(e.to_string()))
    }

    /// A chemical synapse from `pre` to `post`. The release mode follows the
    /// presynaptic kind: spiking cells get Erlang burst release, graded
    /// cells continuous release.
    pub fn create_synapse(
        &mut self,
        pre: NeuronId,
        post: NeuronId,
        config: &SynapseConfig,
    ) -> Result<SynapseId> {
        self.check_construction_allowed()?;
        let mode = if self.neurons[pre.0].kind().is_spiking() {
            ReleaseMode::Spiking
        } else {
            ReleaseMode::Graded
        };
        let seed = self.next_synapse_seed();
        let synapse = ChemicalSynapse::new(&mut self.env, config, mode, post.0, seed, self.noise)?;
        let binding = synapse.primary_binding();

        let index = self.neurons[pre.0].add_out_synapse(Synapse::Chemical(synapse));
        self.neurons[post.0].add_in_binding(binding);
        self.neighbors[pre.0].push(post.0);
        Ok(SynapseId {
            neuron: pre.0,
            index,
        })
    }

    /// A delay-line synapse from `pre` to `post` with no cleft chemistry.
    pub fn create_simple_synapse(
        &mut self,
        pre: NeuronId,
        post: NeuronId,
        receptor: neurochemistry::Receptor,
        delay: usize,
        strength: f64,
    ) -> Result<SynapseId> {
        self.check_construction_allowed()?;
        let mode = if self.neurons[pre.0].kind().is_spiking() {
            ReleaseMode::Spiking
        } else {
            ReleaseMode::Graded
        };
        let synapse = SimpleSynapse::new(&mut self.env, receptor, mode, delay, strength, post.0)?;
        let binding = synapse.binding();

        let index = self.neurons[pre.0].add_out_synapse(Synapse::Simple(synapse));
        self.neurons[post.0].add_in_binding(binding);
        self.neighbors[pre.0].push(post.0);
        Ok(SynapseId {
            neuron: pre.0,
            index,
        })
    }

    /// A further receptor membrane on an existing chemical synapse,
    /// activating `post`.
    pub fn create_synapse_dendrite(
        &mut self,
        synapse: SynapseId,
        post: NeuronId,
        receptor: neurochemistry::Receptor,
        density: f64,
        strength: f64,
    ) -> Result<()> {
        self.check_construction_allowed()?;
        let Self { env, neurons, .. } = self;
        let binding = match neurons[synapse.neuron].out_synapse_mut(synapse.index) {
            Some(Synapse::Chemical(chemical)) => {
                chemical.create_dendrite(env, receptor, density, strength)?
            }
            _ => {
                return Err(EngineError::InvalidParameter(
                    "dendrites can only be added to chemical synapses".into(),
                ))
            }
        };
        self.neurons[post.0].add_in_binding(binding);
        self.neighbors[synapse.neuron].push(post.0);
        Ok(())
    }

    /// A symmetric conductive coupling between two somas.
    pub fn create_gap_junction(
        &mut self,
        a: NeuronId,
        b: NeuronId,
        conductance: f64,
    ) -> Result<()> {
        self.check_construction_allowed()?;
        if conductance < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "negative gap conductance {conductance}"
            )));
        }
        if a == b {
            return Err(EngineError::InvalidParameter(
                "gap junction endpoints must differ".into(),
            ));
        }
        let a_voltage = self.neurons[a.0].voltage_env_id();
        let b_voltage = self.neurons[b.0].voltage_env_id();
        self.neurons[a.0].add_gap_junction(GapJunction {
            peer: b.0,
            peer_voltage_id: b_voltage,
            conductance,
        });
        self.neurons[b.0].add_gap_junction(GapJunction {
            peer: a.0,
            peer_voltage_id: a_voltage,
            conductance,
        });
        self.neighbors[a.0].push(b.0);
        self.neighbors[b.0].push(a.0);
        Ok(())
    }

    /// Registers a driver for one neuron, optionally under a name for later
    /// data extraction.
    pub fn register_driver(
        &mut self,
        neuron: NeuronId,
        driver: Box<dyn Driver>,
        name: Option<&str>,
    ) -> Result<()> {
        self.check_construction_allowed()?;
        let index = self.drivers.len();
        self.drivers.push((neuron.0, driver));
        if let Some(name) = name {
            self.driver_names.insert(name.to_string(), index);
        }
        Ok(())
    }

    /// Attaches a named probe; the combination of target and kind must make
    /// sense (voltage and spikes on neurons, concentrations on synapses).
    pub fn attach_probe(&mut self, name: &str, target: ProbeTarget, kind: ProbeKind) -> Result<()> {
        self.check_construction_allowed()?;
        let valid = matches!(
            (&target, &kind),
            (ProbeTarget::Neuron(_), ProbeKind::Voltage)
                | (ProbeTarget::Neuron(_), ProbeKind::Spikes)
                | (ProbeTarget::Synapse(_), ProbeKind::AxonConcentration)
                | (ProbeTarget::Synapse(_), ProbeKind::CleftConcentration(_))
                | (ProbeTarget::Synapse(_), ProbeKind::DendriteBound)
        );
        if !valid {
            return Err(EngineError::InvalidParameter(format!(
                "probe kind {kind:?} cannot attach to {target:?}"
            )));
        }
        let index = self.probes.len();
        self.probes.push(Probe::new(name, target, kind));
        self.probe_names.insert(name.to_string(), index);
        Ok(())
    }

    fn next_synapse_seed(&mut self) -> u64 {
        self.synapse_count += 1;
        // SplitMix-style stream separation per synapse.
        self.seed ^ self.synapse_count.wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    fn start(&mut self) -> Result<()> {
        if self.neurons.is_empty() {
            return Err(EngineError::LifecycleViolation(
                "step() before any neuron exists".into(),
            ));
        }
        self.env.seal();
        self.active = vec![true; self.neurons.len()];
        let workers = self.num_threads.min(self.neurons.len());
        if workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
            self.pool = Some(pool);
        }
        self.started = true;
        debug!(
            neurons = self.neurons.len(),
            workers, "engine started"
        );
        Ok(())
    }

    /// Advances the simulation by `count` ticks.
    pub fn step(&mut self, count: usize) -> Result<()> {
        if self.closed {
            return Err(EngineError::LifecycleViolation(
                "step() after close()".into(),
            ));
        }
        if !self.started {
            self.start()?;
        }
        for _ in 0..count {
            self.tick();
        }
        Ok(())
    }

    fn tick(&mut self) {
        // 1. Drivers prepare neurons; any stimulus forces a step this tick.
        {
            let Self {
                drivers,
                neurons,
                active,
                time,
                ..
            } = self;
            for (neuron_id, driver) in drivers.iter_mut() {
                if let Some(stimulus) = driver.drive(*time) {
                    match stimulus {
                        Stimulus::Current(current) => {
                            neurons[*neuron_id].set_external_current(current)
                        }
                        Stimulus::Activation(level) => neurons[*neuron_id].set_light_input(level),
                    }
                    active[*neuron_id] = true;
                }
            }
        }

        // 2. Step the active neurons, reading prev and writing next.
        let workers = self.num_threads;
        {
            let Self {
                env,
                neurons,
                active,
                pool,
                ..
            } = self;
            let env = &*env;
            let active = &*active;
            match pool {
                Some(pool) => {
                    let chunk = neurons.len().div_ceil(workers).max(1);
                    pool.install(|| {
                        neurons
                            .par_chunks_mut(chunk)
                            .enumerate()
                            .for_each(|(chunk_index, chunk_neurons)| {
                                let base = chunk_index * chunk;
                                for (offset, neuron) in chunk_neurons.iter_mut().enumerate() {
                                    if active[base + offset] {
                                        neuron.step(env);
                                    }
                                }
                            });
                    });
                }
                None => {
                    for (neuron, &is_active) in neurons.iter_mut().zip(active.iter()) {
                        if is_active {
                            neuron.step(env);
                        }
                    }
                }
            }
        }

        // 3. Probes sample the published values.
        self.record_probes();

        // 4. Publish this tick's writes.
        let env_stable = self.env.step();

        // 5. Derive the next activity set: unstable neurons keep stepping
        //    and keep their neighbors awake.
        let mut any_active = false;
        for slot in self.active.iter_mut() {
            *slot = false;
        }
        for i in 0..self.neurons.len() {
            if !self.neurons[i].is_stable() {
                self.active[i] = true;
                any_active = true;
                for &neighbor in &self.neighbors[i] {
                    self.active[neighbor] = true;
                }
            }
        }

        self.stable = !any_active && env_stable;
        self.time += 1;
    }

    fn record_probes(&mut self) {
        for i in 0..self.probes.len() {
            let (target, kind) = (self.probes[i].target, self.probes[i].kind);
            let value = self.sample(target, kind);
            self.probes[i].data.push(value);
        }
    }

    fn sample(&self, target: ProbeTarget, kind: ProbeKind) -> f64 {
        match (target, kind) {
            (ProbeTarget::Neuron(id), ProbeKind::Voltage) => {
                self.neurons[id.0].soma().adjusted_voltage(&self.env)
            }
            (ProbeTarget::Neuron(id), ProbeKind::Spikes) => {
                self.env.spike_count(self.neurons[id.0].voltage_env_id()) as f64
            }
            (ProbeTarget::Synapse(id), kind) => {
                match &self.neurons[id.neuron].out_synapses()[id.index] {
                    Synapse::Chemical(chemical) => match kind {
                        ProbeKind::AxonConcentration => chemical.axon_concentration(&self.env),
                        ProbeKind::CleftConcentration(mol) => {
                            chemical.cleft_concentration(&self.env, mol)
                        }
                        ProbeKind::DendriteBound => chemical.dendrite_bound(&self.env),
                        _ => 0.0,
                    },
                    Synapse::Simple(simple) => match kind {
                        ProbeKind::DendriteBound => simple.released(&self.env),
                        _ => 0.0,
                    },
                }
            }
            _ => 0.0,
        }
    }

    /// True once the activity set is empty and the environment reports no
    /// pending writes.
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    pub fn neuron(&self, id: NeuronId) -> &Neuron {
        &self.neurons[id.0]
    }

    /// Published soma voltage of a neuron (mV).
    pub fn voltage(&self, id: NeuronId) -> f64 {
        self.neurons[id.0].voltage(&self.env)
    }

    /// Scaled probe voltage of a neuron.
    pub fn adjusted_voltage(&self, id: NeuronId) -> f64 {
        self.neurons[id.0].soma().adjusted_voltage(&self.env)
    }

    /// Per-tick voltage trace for a neuron created with `record = true`.
    pub fn voltage_record(&self, id: NeuronId) -> &[f64] {
        self.env.record(self.neurons[id.0].voltage_env_id())
    }

    /// Spikes counted so far for a spiking neuron.
    pub fn spike_count(&self, id: NeuronId) -> u64 {
        self.env.spike_count(self.neurons[id.0].voltage_env_id())
    }

    /// Sets a neuron's external current from outside the tick loop.
    pub fn set_external_current(&self, id: NeuronId, current: f64) {
        self.neurons[id.0].set_external_current(current);
    }

    pub fn probe_data(&self, name: &str) -> Result<&[f64]> {
        self.probe_names
            .get(name)
            .map(|&i| self.probes[i].data())
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))
    }

    pub fn driver_data(&self, name: &str) -> Result<&[f64]> {
        self.driver_names
            .get(name)
            .map(|&i| self.drivers[i].1.data())
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))
    }

    /// Read access to the environment, mainly for tests and probing.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Releases the worker pool. The engine cannot step afterwards.
    pub fn close(&mut self) {
        self.pool = None;
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_without_neurons_is_rejected() {
        let mut engine = Engine::new(1);
        assert!(matches!(
            engine.step(1),
            Err(EngineError::LifecycleViolation(_))
        ));
    }

    #[test]
    fn test_construction_after_start_is_rejected() {
        let mut engine = Engine::new(1);
        engine.create_neuron(&NeuronConfig::ganglion()).unwrap();
        engine.step(1).unwrap();
        assert!(matches!(
            engine.create_neuron(&NeuronConfig::ganglion()),
            Err(EngineError::LifecycleViolation(_))
        ));
    }

    #[test]
    fn test_quiet_network_stabilizes() {
        let mut engine = Engine::new(1);
        let a = engine.create_neuron(&NeuronConfig::ganglion()).unwrap();
        let b = engine.create_neuron(&NeuronConfig::ganglion()).unwrap();
        engine
            .create_synapse(a, b, &SynapseConfig::default())
            .unwrap();

        engine.step(100).unwrap();
        assert!(engine.is_stable());
    }

    #[test]
    fn test_driver_keeps_neuron_active() {
        let mut engine = Engine::new(1);
        let neuron = engine
            .create_neuron(&NeuronConfig::ganglion().with_record(true))
            .unwrap();
        engine
            .register_driver(neuron, Box::new(ConstantDriver::current(10.0, 0)), None)
            .unwrap();

        engine.step(300).unwrap();
        assert!(!engine.is_stable());
        assert!(engine.spike_count(neuron) > 0);
    }

    #[test]
    fn test_close_releases_engine() {
        let mut engine = Engine::new(2);
        engine.create_neuron(&NeuronConfig::ganglion()).unwrap();
        engine.step(1).unwrap();
        engine.close();
        assert!(matches!(
            engine.step(1),
            Err(EngineError::LifecycleViolation(_))
        ));
    }

    #[test]
    fn test_grid_handles() {
        let mut engine = Engine::new(1);
        let grid = engine
            .create_neuron_grid(3, 2, &NeuronConfig::photoreceptor())
            .unwrap();
        assert_eq!(grid.dim(), (2, 3));
        assert_eq!(engine.len(), 6);
        assert_ne!(grid[[0, 0]], grid[[1, 2]]);
    }
}
