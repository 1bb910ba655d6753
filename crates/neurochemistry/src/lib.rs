//! Static neurochemical catalogs and reaction kinetics.
//!
//! This crate holds the immutable tables the synapse pipeline is built on:
//! - Molecules and the enzymes that metabolize them
//! - Receptors with agonist/antagonist affinity maps
//! - Transporters with reuptake-inhibitor affinity maps
//! - Michaelis-Menten metabolism
//! - The two stochastic primitives (beta-shaped draws and Erlang-shaped
//!   release generators)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod stochastic;

pub use stochastic::{ReleaseGenerator, StochasticSampler};

#[derive(Debug, Error)]
pub enum ChemistryError {
    #[error("Affinity out of range [0, 1]: {0}")]
    InvalidAffinity(f64),

    #[error("Invalid sampler parameter: {0}")]
    InvalidSamplerParameter(String),
}

pub type Result<T> = std::result::Result<T, ChemistryError>;

/// Neurotransmitter molecules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoleculeId {
    /// Excitatory.
    Glutamate,
    /// Inhibitory.
    Gaba,
}

impl MoleculeId {
    pub const ALL: [MoleculeId; 2] = [MoleculeId::Glutamate, MoleculeId::Gaba];

    /// The enzyme that metabolizes this molecule.
    pub fn enzyme(&self) -> EnzymeId {
        match self {
            MoleculeId::Glutamate => EnzymeId::Glutamate,
            MoleculeId::Gaba => EnzymeId::Gaba,
        }
    }

    /// Rate of metabolism by the native enzyme, in (0, 1].
    pub fn metab_rate(&self) -> f64 {
        match self {
            MoleculeId::Glutamate => 0.25,
            MoleculeId::Gaba => 0.25,
        }
    }
}

/// Enzymes degrading cleft neurotransmitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnzymeId {
    Glutamate,
    Gaba,
}

pub const NUM_ENZYMES: usize = 2;

impl EnzymeId {
    pub const ALL: [EnzymeId; NUM_ENZYMES] = [EnzymeId::Glutamate, EnzymeId::Gaba];

    pub fn index(&self) -> usize {
        match self {
            EnzymeId::Glutamate => 0,
            EnzymeId::Gaba => 1,
        }
    }
}

/// How an occupied receptor modifies its host neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Excitatory postsynaptic potential.
    Epsp,
    /// Excitatory, but only when the host soma is already depolarized
    /// above the magnesium-block threshold.
    VoltageEpsp,
    /// Inhibitory postsynaptic potential.
    Ipsp,
}

/// Soma voltage above which a voltage-gated receptor conducts (mV).
pub const VOLTAGE_GATE_THRESHOLD: f64 = -60.0;

fn check_affinity(affinity: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&affinity) {
        return Err(ChemistryError::InvalidAffinity(affinity));
    }
    Ok(affinity)
}

/// A postsynaptic receptor protein.
///
/// The native molecule is the receptor's primary agonist. Further agonists
/// and antagonists can be registered; antagonists occupy the receptor and
/// compete for binding without activating the host cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receptor {
    native: MoleculeId,
    activation: Activation,
    agonists: Vec<MoleculeId>,
    antagonists: Vec<MoleculeId>,
    affinities: HashMap<MoleculeId, f64>,
}

impl Receptor {
    pub fn new(native: MoleculeId, native_affinity: f64, activation: Activation) -> Result<Self> {
        check_affinity(native_affinity)?;
        Ok(Self {
            native,
            activation,
            agonists: vec![native],
            antagonists: Vec::new(),
            affinities: HashMap::from([(native, native_affinity)]),
        })
    }

    /// AMPA: fast glutamatergic excitation.
    pub fn ampa() -> Self {
        Self::new(MoleculeId::Glutamate, 0.8, Activation::Epsp).unwrap()
    }

    /// NMDA: glutamatergic excitation gated on depolarization.
    pub fn nmda() -> Self {
        Self::new(MoleculeId::Glutamate, 0.4, Activation::VoltageEpsp).unwrap()
    }

    /// GABA-A: fast inhibition.
    pub fn gabaa() -> Self {
        Self::new(MoleculeId::Gaba, 0.9, Activation::Ipsp).unwrap()
    }

    pub fn add_agonist(&mut self, mol: MoleculeId, affinity: f64) -> Result<()> {
        self.agonists.push(mol);
        self.affinities.insert(mol, check_affinity(affinity)?);
        Ok(())
    }

    pub fn add_antagonist(&mut self, mol: MoleculeId, affinity: f64) -> Result<()> {
        self.antagonists.push(mol);
        self.affinities.insert(mol, check_affinity(affinity)?);
        Ok(())
    }

    pub fn native(&self) -> MoleculeId {
        self.native
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn agonists(&self) -> &[MoleculeId] {
        &self.agonists
    }

    pub fn affinity(&self, mol: MoleculeId) -> Option<f64> {
        self.affinities.get(&mol).copied()
    }

    pub fn affinities(&self) -> impl Iterator<Item = (MoleculeId, f64)> + '_ {
        self.affinities.iter().map(|(&m, &a)| (m, a))
    }
}

/// A presynaptic reuptake transporter.
///
/// Transporters pump their native molecule back into the axon. Reuptake
/// inhibitors bind the transporter and reduce the protein pool available
/// for reuptake without being transported themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transporter {
    native: MoleculeId,
    reuptake_inhibitors: Vec<MoleculeId>,
    affinities: HashMap<MoleculeId, f64>,
}

impl Transporter {
    pub fn new(native: MoleculeId) -> Self {
        Self {
            native,
            reuptake_inhibitors: Vec::new(),
            affinities: HashMap::from([(native, 1.0)]),
        }
    }

    pub fn glutamate() -> Self {
        Self::new(MoleculeId::Glutamate)
    }

    pub fn gaba() -> Self {
        Self::new(MoleculeId::Gaba)
    }

    pub fn add_reuptake_inhibitor(&mut self, mol: MoleculeId, affinity: f64) -> Result<()> {
        self.reuptake_inhibitors.push(mol);
        self.affinities.insert(mol, check_affinity(affinity)?);
        Ok(())
    }

    pub fn native(&self) -> MoleculeId {
        self.native
    }

    pub fn affinity(&self, mol: MoleculeId) -> Option<f64> {
        self.affinities.get(&mol).copied()
    }

    pub fn affinities(&self) -> impl Iterator<Item = (MoleculeId, f64)> + '_ {
        self.affinities.iter().map(|(&m, &a)| (m, a))
    }
}

/// Amount of substrate destroyed in one tick of enzymatic degradation.
///
/// Michaelis-Menten initial-velocity form:
///
/// ```text
/// V0 = Vmax * [S] / ([S] + Km)
/// ```
///
/// with `Vmax` the enzyme concentration and `Km = 1 - metab_rate` acting as
/// the dissociation constant.
pub fn metabolize(enzyme_count: f64, mol_count: f64, metab_rate: f64) -> f64 {
    let km = 1.0 - metab_rate;
    enzyme_count * mol_count / (mol_count + km)
}
