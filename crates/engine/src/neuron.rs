//! The neuron: a soma plus its synaptic and electrical connections.

use environment::{AtomicF64, Environment};
use neurons::{
    HodgkinHuxleySoma, IzhikevichPreset, IzhikevichSoma, PhotoreceptorSoma, Soma, SomaDynamics,
};
use serde::{Deserialize, Serialize};
use synapses::{ChemicalSynapse, DendriteBinding, SimpleSynapse};
use tracing::warn;

use crate::{EngineError, Result};

/// Change in fused current below which a neuron stays stable.
const CURRENT_EPSILON: f64 = 1e-6;

/// Voltage handed to outgoing synapses while the axon gate is closed.
/// Negative infinity reads as "no drive": graded release clamps to zero and
/// spike-mode arming never triggers.
const GATED_VOLTAGE: f64 = f64::NEG_INFINITY;

/// Retinal circuit cell classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeuronKind {
    Photoreceptor,
    Horizontal,
    Bipolar,
    Amacrine,
    Ganglion,
}

impl NeuronKind {
    /// Spiking cells release on action potentials; the rest release on
    /// graded depolarization.
    pub fn is_spiking(&self) -> bool {
        matches!(self, NeuronKind::Ganglion)
    }

    /// Standing current injected by the cell class itself.
    pub fn default_base_current(&self) -> f64 {
        match self {
            NeuronKind::Horizontal => -100.0,
            _ => 0.0,
        }
    }

    /// Soma voltage below which outgoing synapses receive no drive (mV).
    /// Spiking cells gate their axons; graded cells are always open.
    pub fn axon_threshold(&self) -> f64 {
        match self {
            NeuronKind::Ganglion => -55.0,
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Which integrator backs the soma.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SomaModel {
    Izhikevich(IzhikevichPreset),
    HodgkinHuxley,
    Photoreceptor,
}

/// Construction parameters for a neuron.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuronConfig {
    pub kind: NeuronKind,
    pub base_current: f64,
    /// Override for the kind's default soma model.
    pub soma_model: Option<SomaModel>,
    /// Time constant of the photoreceptor light low-pass, in ticks.
    pub light_tau: Option<f64>,
    /// Keep a per-tick voltage trace in the environment.
    pub record: bool,
}

impl NeuronConfig {
    pub fn new(kind: NeuronKind) -> Self {
        Self {
            kind,
            base_current: kind.default_base_current(),
            soma_model: None,
            light_tau: None,
            record: false,
        }
    }

    pub fn ganglion() -> Self {
        Self::new(NeuronKind::Ganglion)
    }

    pub fn photoreceptor() -> Self {
        Self::new(NeuronKind::Photoreceptor)
    }

    pub fn with_base_current(mut self, current: f64) -> Self {
        self.base_current = current;
        self
    }

    pub fn with_soma_model(mut self, model: SomaModel) -> Self {
        self.soma_model = Some(model);
        self
    }

    pub fn with_light_tau(mut self, tau: f64) -> Self {
        self.light_tau = Some(tau);
        self
    }

    pub fn with_record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    fn resolved_soma_model(&self) -> SomaModel {
        self.soma_model.unwrap_or(match self.kind {
            NeuronKind::Photoreceptor => SomaModel::Photoreceptor,
            NeuronKind::Horizontal => SomaModel::Izhikevich(IzhikevichPreset::Horizontal),
            _ => SomaModel::Izhikevich(IzhikevichPreset::Default),
        })
    }
}

impl Default for NeuronConfig {
    fn default() -> Self {
        Self::ganglion()
    }
}

/// A conductive electrical coupling to a peer soma.
#[derive(Debug, Clone, Copy)]
pub struct GapJunction {
    pub peer: usize,
    pub peer_voltage_id: usize,
    pub conductance: f64,
}

/// Outgoing synapse variants. Both expose the same step contract.
#[derive(Debug)]
pub enum Synapse {
    Chemical(ChemicalSynapse),
    Simple(SimpleSynapse),
}

impl Synapse {
    pub fn step(&mut self, env: &Environment, voltage: f64) -> bool {
        match self {
            Synapse::Chemical(synapse) => synapse.step(env, voltage),
            Synapse::Simple(synapse) => synapse.step(env, voltage),
        }
    }

    pub fn postsynaptic(&self) -> usize {
        match self {
            Synapse::Chemical(synapse) => synapse.postsynaptic(),
            Synapse::Simple(synapse) => synapse.postsynaptic(),
        }
    }
}

/// A point neuron owning its soma and outgoing synapses.
///
/// Incoming connections appear only as [`DendriteBinding`] handles, and gap
/// junction peers only as environment ids, so the graph stays an arena of
/// indices with no reference cycles.
#[derive(Debug)]
pub struct Neuron {
    id: usize,
    kind: NeuronKind,
    soma: Soma,
    base_current: f64,
    current: f64,
    external: AtomicF64,
    axon_threshold: f64,
    out_synapses: Vec<Synapse>,
    in_bindings: Vec<DendriteBinding>,
    gap_junctions: Vec<GapJunction>,
    stable: bool,
}

impl Neuron {
    pub(crate) fn new(env: &mut Environment, id: usize, config: &NeuronConfig) -> Result<Self> {
        let spiking = config.kind.is_spiking();
        let soma = match config.resolved_soma_model() {
            SomaModel::Izhikevich(preset) => {
                Soma::Izhikevich(IzhikevichSoma::new(env, preset, config.record, spiking)?)
            }
            SomaModel::HodgkinHuxley => {
                Soma::HodgkinHuxley(HodgkinHuxleySoma::new(env, config.record, spiking)?)
            }
            SomaModel::Photoreceptor => {
                if spiking {
                    return Err(EngineError::InvalidParameter(
                        "photoreceptor somas cannot spike".into(),
                    ));
                }
                let soma = match config.light_tau {
                    Some(tau) => PhotoreceptorSoma::with_light_tau(env, config.record, tau)?,
                    None => PhotoreceptorSoma::new(env, config.record)?,
                };
                Soma::Photoreceptor(soma)
            }
        };
        Ok(Self {
            id,
            kind: config.kind,
            soma,
            base_current: config.base_current,
            current: config.base_current,
            external: AtomicF64::new(0.0),
            axon_threshold: config.kind.axon_threshold(),
            out_synapses: Vec::new(),
            in_bindings: Vec::new(),
            gap_junctions: Vec::new(),
            stable: false,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind(&self) -> NeuronKind {
        self.kind
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn soma(&self) -> &Soma {
        &self.soma
    }

    pub fn voltage_env_id(&self) -> usize {
        self.soma.env_id()
    }

    pub fn voltage(&self, env: &Environment) -> f64 {
        self.soma.voltage(env)
    }

    /// External drive; the only field written from outside the owning
    /// worker, hence atomic.
    pub fn set_external_current(&self, current: f64) {
        self.external.store(current);
    }

    pub fn external_current(&self) -> f64 {
        self.external.load()
    }

    pub(crate) fn add_out_synapse(&mut self, synapse: Synapse) -> usize {
        self.out_synapses.push(synapse);
        self.out_synapses.len() - 1
    }

    pub(crate) fn add_in_binding(&mut self, binding: DendriteBinding) {
        self.in_bindings.push(binding);
    }

    pub(crate) fn add_gap_junction(&mut self, junction: GapJunction) {
        self.gap_junctions.push(junction);
        self.stable = false;
    }

    pub fn out_synapses(&self) -> &[Synapse] {
        &self.out_synapses
    }

    pub(crate) fn out_synapse_mut(&mut self, index: usize) -> Option<&mut Synapse> {
        self.out_synapses.get_mut(index)
    }

    pub fn gap_junctions(&self) -> &[GapJunction] {
        &self.gap_junctions
    }

    /// Summed electrical current from gap-junction peers, read from the
    /// previous tick's published voltages.
    fn gap_current(&self, env: &Environment, soma_voltage: f64) -> f64 {
        self.gap_junctions
            .iter()
            .map(|gj| gj.conductance * (env.get(gj.peer_voltage_id) - soma_voltage))
            .sum()
    }

    /// Summed ligand current from incoming dendrites.
    fn ligand_current(&self, env: &Environment, soma_voltage: f64) -> f64 {
        self.in_bindings
            .iter()
            .map(|binding| binding.ligand_current(env, soma_voltage))
            .sum()
    }

    /// Advances the neuron one tick. Returns whether it is stable.
    pub fn step(&mut self, env: &Environment) -> bool {
        let soma_voltage = self.soma.voltage(env);

        let mut current = self.base_current;
        if !self.gap_junctions.is_empty() {
            current += self.gap_current(env, soma_voltage);
        }
        current += self.ligand_current(env, soma_voltage);
        current += self.external.load();

        if (current - self.current).abs() > CURRENT_EPSILON {
            self.current = current;
            self.stable = false;
        }

        if !self.stable {
            // Axon-threshold gate: a spiking presynapse delivers no drive
            // while its soma sits below threshold.
            let axon_voltage = if soma_voltage > self.axon_threshold {
                soma_voltage
            } else {
                GATED_VOLTAGE
            };
            let mut synapses_stable = true;
            for synapse in &mut self.out_synapses {
                synapses_stable &= synapse.step(env, axon_voltage);
            }
            let soma_stable = self.soma.step(env, current);

            let voltage = env.peek_next(self.soma.env_id());
            if !voltage.is_finite() {
                // A runaway integration must not take the tick down with it;
                // park the soma at rest and freeze the neuron.
                warn!(neuron = self.id, voltage, "non-finite soma voltage");
                self.soma.reset(env);
                self.stable = true;
            } else {
                self.stable = soma_stable && synapses_stable;
            }
        }
        self.stable
    }

    pub(crate) fn set_light_input(&mut self, level: f64) {
        self.soma.set_light_input(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        assert!(NeuronKind::Ganglion.is_spiking());
        assert!(!NeuronKind::Photoreceptor.is_spiking());
        assert_eq!(NeuronKind::Horizontal.default_base_current(), -100.0);
        assert_eq!(NeuronKind::Ganglion.axon_threshold(), -55.0);
        assert_eq!(
            NeuronKind::Photoreceptor.axon_threshold(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_axon_threshold_gates_release() {
        use synapses::ReleaseMode;

        let mut env = Environment::new();
        let mut neuron = Neuron::new(&mut env, 0, &NeuronConfig::ganglion()).unwrap();
        // A graded synapse releases for any voltage above -150 mV, so any
        // output below proves the gate, not the release curve.
        let synapse = SimpleSynapse::new(
            &mut env,
            neurochemistry::Receptor::ampa(),
            ReleaseMode::Graded,
            0,
            1.0,
            1,
        )
        .unwrap();
        neuron.add_out_synapse(Synapse::Simple(synapse));

        let released = |neuron: &Neuron, env: &Environment| match &neuron.out_synapses()[0] {
            Synapse::Simple(simple) => simple.released(env),
            _ => unreachable!(),
        };

        // Below the -55 mV axon threshold: no drive reaches the synapse.
        env.set(neuron.voltage_env_id(), -60.0);
        env.step();
        neuron.step(&env);
        env.step();
        assert_eq!(released(&neuron, &env), 0.0);

        // Above threshold: the soma voltage passes through.
        env.set(neuron.voltage_env_id(), -50.0);
        env.step();
        neuron.step(&env);
        env.step();
        assert!(released(&neuron, &env) > 0.0);
    }

    #[test]
    fn test_stable_without_input() {
        let mut env = Environment::new();
        let mut neuron = Neuron::new(&mut env, 0, &NeuronConfig::ganglion()).unwrap();

        let mut stable = false;
        for _ in 0..50 {
            stable = neuron.step(&env);
            env.step();
        }
        assert!(stable);
    }

    #[test]
    fn test_external_current_destabilizes() {
        let mut env = Environment::new();
        let mut neuron = Neuron::new(&mut env, 0, &NeuronConfig::ganglion()).unwrap();

        for _ in 0..50 {
            neuron.step(&env);
            env.step();
        }
        assert!(neuron.is_stable());

        neuron.set_external_current(10.0);
        neuron.step(&env);
        env.step();
        assert!(!neuron.is_stable());

        // Sustained drive produces spikes.
        let mut spiked = false;
        for _ in 0..200 {
            neuron.step(&env);
            env.step();
            spiked |= neuron.voltage(&env) > 30.0;
        }
        assert!(spiked);
    }

    #[test]
    fn test_gap_current_is_antisymmetric() {
        let mut env = Environment::new();
        let mut a = Neuron::new(&mut env, 0, &NeuronConfig::ganglion()).unwrap();
        let mut b = Neuron::new(&mut env, 1, &NeuronConfig::ganglion()).unwrap();

        let (a_vid, b_vid) = (a.voltage_env_id(), b.voltage_env_id());
        a.add_gap_junction(GapJunction {
            peer: 1,
            peer_voltage_id: b_vid,
            conductance: 0.5,
        });
        b.add_gap_junction(GapJunction {
            peer: 0,
            peer_voltage_id: a_vid,
            conductance: 0.5,
        });

        env.set(a_vid, -60.0);
        env.set(b_vid, -70.0);
        env.step();

        // Both currents derive from the same published voltages, so the
        // edge conserves charge exactly.
        let i_a = a.gap_current(&env, env.get(a_vid));
        let i_b = b.gap_current(&env, env.get(b_vid));
        assert_eq!(i_a, -i_b);
        assert_eq!(i_a, -5.0);
    }

    #[test]
    fn test_photoreceptor_rejects_spiking_config() {
        let mut env = Environment::new();
        let config = NeuronConfig::ganglion().with_soma_model(SomaModel::Photoreceptor);
        assert!(Neuron::new(&mut env, 0, &config).is_err());
    }
}
