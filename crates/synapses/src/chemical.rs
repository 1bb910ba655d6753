//! The full chemical synapse: axon, cleft, and dendrites in one pipeline.

use environment::Environment;
use neurochemistry::{EnzymeId, MoleculeId, Receptor, StochasticSampler};

use crate::axon::Axon;
use crate::cleft::SynapticCleft;
use crate::dendrite::{Dendrite, DendriteBinding};
use crate::{ReleaseMode, Result, SynapseConfig};

/// A one-way chemical connection between two neurons.
///
/// Per tick the presynaptic soma voltage drives the axon, the axon releases
/// into the cleft, and the cleft metabolizes and distributes transmitter
/// onto the dendrites. The postsynaptic neuron observes only the dendrites'
/// bound concentrations, one tick delayed, through [`DendriteBinding`]
/// handles.
#[derive(Debug)]
pub struct ChemicalSynapse {
    axon: Axon,
    cleft: SynapticCleft,
    dendrites: Vec<Dendrite>,
    sampler: StochasticSampler,
    postsynaptic: usize,
}

impl ChemicalSynapse {
    /// Builds the synapse from a validated config.
    ///
    /// `seed` isolates this synapse's stochastic stream; `noise` is the
    /// engine-wide noise level.
    pub fn new(
        env: &mut Environment,
        config: &SynapseConfig,
        mode: ReleaseMode,
        postsynaptic: usize,
        seed: u64,
        noise: f64,
    ) -> Result<Self> {
        config.validate()?;
        let cleft = SynapticCleft::new(
            env,
            config.resolved_active_molecules(),
            config.enzyme_concentration,
        )?;
        let axon = Axon::new(env, config, mode)?;
        let dendrite = Dendrite::new(
            env,
            config.receptor.clone(),
            config.dendrite_density,
            config.dendrite_strength,
        )?;
        Ok(Self {
            axon,
            cleft,
            dendrites: vec![dendrite],
            sampler: StochasticSampler::new(seed, noise)?,
            postsynaptic,
        })
    }

    /// Adds a further receptor membrane fed by the same cleft.
    pub fn create_dendrite(
        &mut self,
        env: &mut Environment,
        receptor: Receptor,
        density: f64,
        strength: f64,
    ) -> Result<DendriteBinding> {
        let dendrite = Dendrite::new(env, receptor, density, strength)?;
        let binding = dendrite.binding();
        self.dendrites.push(dendrite);
        Ok(binding)
    }

    /// Advances the pipeline one tick with the presynaptic soma voltage.
    /// Returns whether both the axon and the cleft are stable.
    pub fn step(&mut self, env: &Environment, voltage: f64) -> bool {
        let axon_stable = self
            .axon
            .step(env, &self.cleft, &mut self.sampler, voltage);
        let cleft_stable =
            self.cleft
                .step(env, &mut self.sampler, Some(&self.axon), &self.dendrites);
        axon_stable && cleft_stable
    }

    /// Arms a release burst directly, bypassing the soma voltage.
    pub fn fire(&mut self, strength: f64) -> Result<()> {
        self.axon.fire(strength)
    }

    pub fn set_enzyme_concentration(
        &mut self,
        concentration: f64,
        enzymes: &[EnzymeId],
    ) -> Result<()> {
        self.cleft.set_enzyme_concentration(concentration, enzymes)
    }

    /// Handle for the first (primary) dendrite.
    pub fn primary_binding(&self) -> DendriteBinding {
        self.dendrites[0].binding()
    }

    pub fn postsynaptic(&self) -> usize {
        self.postsynaptic
    }

    pub fn axon(&self) -> &Axon {
        &self.axon
    }

    pub fn cleft(&self) -> &SynapticCleft {
        &self.cleft
    }

    pub fn dendrites(&self) -> &[Dendrite] {
        &self.dendrites
    }

    /// Probe surface: axon reserve concentration.
    pub fn axon_concentration(&self, env: &Environment) -> f64 {
        self.axon.concentration(env)
    }

    /// Probe surface: cleft concentration of one molecule.
    pub fn cleft_concentration(&self, env: &Environment, mol: MoleculeId) -> f64 {
        self.cleft.concentration(env, mol)
    }

    /// Probe surface: bound concentration on the primary dendrite.
    pub fn dendrite_bound(&self, env: &Environment) -> f64 {
        self.dendrites[0].bound(env)
    }
}
