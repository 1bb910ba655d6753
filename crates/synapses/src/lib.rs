//! Chemical synapse pipeline: axon, synaptic cleft, and dendrite.
//!
//! A [`ChemicalSynapse`] couples a presynaptic axon (finite vesicle
//! reserve, spike-triggered or graded release) to postsynaptic dendrites
//! through a synaptic cleft that metabolizes transmitter enzymatically and
//! distributes the rest by competitive protein binding. [`SimpleSynapse`]
//! is the cheap alternative: a delay line and a release curve with no cleft
//! chemistry.

use neurochemistry::{MoleculeId, Receptor, Transporter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod axon;
pub mod chemical;
pub mod cleft;
pub mod dendrite;
pub mod simple;

pub use axon::Axon;
pub use chemical::ChemicalSynapse;
pub use cleft::SynapticCleft;
pub use dendrite::{Dendrite, DendriteBinding};
pub use simple::SimpleSynapse;

#[derive(Debug, Error)]
pub enum SynapseError {
    #[error("Invalid synapse parameter: {0}")]
    InvalidParameter(String),

    #[error("Transporter ({transporter:?}) and receptor ({receptor:?}) use different native molecules")]
    WrongTransporterReceptorPair {
        transporter: MoleculeId,
        receptor: MoleculeId,
    },

    #[error(transparent)]
    Environment(#[from] environment::EnvironmentError),

    #[error(transparent)]
    Chemistry(#[from] neurochemistry::ChemistryError),
}

pub type Result<T> = std::result::Result<T, SynapseError>;

/// How the presynaptic axon converts soma voltage into release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseMode {
    /// Erlang-shaped release bursts armed by spikes.
    Spiking,
    /// Continuous release proportional to depolarization.
    Graded,
}

/// Construction parameters for a [`ChemicalSynapse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseConfig {
    pub transporter: Transporter,
    pub receptor: Receptor,
    /// Initial cleft enzyme concentration (all enzyme kinds).
    pub enzyme_concentration: f64,
    /// Axon response delay in ticks.
    pub axon_delay: usize,
    /// Postsynaptic current per unit of bound transmitter.
    pub dendrite_strength: f64,
    /// Receptor density on the dendrite membrane, in [0, 1].
    pub dendrite_density: f64,
    /// Vesicle regeneration rate, in [0, 1].
    pub replenish_rate: f64,
    /// Transporter density on the axon membrane, in [0, 1].
    pub reuptake_rate: f64,
    /// Vesicle reserve capacity.
    pub capacity: f64,
    /// Skew of the release draw; the beta release rate is twice this.
    pub release_multiple: f64,
    /// Stretch of the Erlang release curve; higher values delay the peak.
    pub release_time_factor: f64,
    /// Voltage at which graded release starts (mV).
    pub graded_floor: f64,
    /// Voltage at which graded release saturates (mV).
    pub graded_ceiling: f64,
    /// Molecules admitted to the cleft; defaults to every molecule either
    /// protein has an affinity for.
    pub active_molecules: Option<Vec<MoleculeId>>,
}

impl Default for SynapseConfig {
    fn default() -> Self {
        Self {
            transporter: Transporter::glutamate(),
            receptor: Receptor::ampa(),
            enzyme_concentration: 1.0,
            axon_delay: 0,
            dendrite_strength: 25.0,
            dendrite_density: 0.25,
            replenish_rate: 0.5,
            reuptake_rate: 0.5,
            capacity: 10.0,
            release_multiple: 5.0,
            release_time_factor: 1.0,
            graded_floor: -70.0,
            graded_ceiling: -40.0,
            active_molecules: None,
        }
    }
}

impl SynapseConfig {
    pub fn new(transporter: Transporter, receptor: Receptor) -> Self {
        Self {
            transporter,
            receptor,
            ..Self::default()
        }
    }

    /// GABAergic defaults (GABA transporter, GABA-A receptor).
    pub fn gabaergic() -> Self {
        Self::new(Transporter::gaba(), Receptor::gabaa())
    }

    pub fn with_enzyme_concentration(mut self, concentration: f64) -> Self {
        self.enzyme_concentration = concentration;
        self
    }

    pub fn with_axon_delay(mut self, delay: usize) -> Self {
        self.axon_delay = delay;
        self
    }

    pub fn with_dendrite_strength(mut self, strength: f64) -> Self {
        self.dendrite_strength = strength;
        self
    }

    pub fn with_dendrite_density(mut self, density: f64) -> Self {
        self.dendrite_density = density;
        self
    }

    pub fn with_replenish_rate(mut self, rate: f64) -> Self {
        self.replenish_rate = rate;
        self
    }

    pub fn with_reuptake_rate(mut self, rate: f64) -> Self {
        self.reuptake_rate = rate;
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_release_multiple(mut self, multiple: f64) -> Self {
        self.release_multiple = multiple;
        self
    }

    pub fn with_release_time_factor(mut self, factor: f64) -> Self {
        self.release_time_factor = factor;
        self
    }

    pub fn with_graded_range(mut self, floor: f64, ceiling: f64) -> Self {
        self.graded_floor = floor;
        self.graded_ceiling = ceiling;
        self
    }

    pub fn with_active_molecules(mut self, molecules: Vec<MoleculeId>) -> Self {
        self.active_molecules = Some(molecules);
        self
    }

    pub fn validate(&self) -> Result<()> {
        fn unit_range(name: &str, value: f64) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(SynapseError::InvalidParameter(format!(
                    "{name} {value} outside [0, 1]"
                )));
            }
            Ok(())
        }

        if self.transporter.native() != self.receptor.native() {
            return Err(SynapseError::WrongTransporterReceptorPair {
                transporter: self.transporter.native(),
                receptor: self.receptor.native(),
            });
        }
        unit_range("dendrite_density", self.dendrite_density)?;
        unit_range("replenish_rate", self.replenish_rate)?;
        unit_range("reuptake_rate", self.reuptake_rate)?;
        if self.enzyme_concentration < 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "negative enzyme concentration {}",
                self.enzyme_concentration
            )));
        }
        if self.capacity <= 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "capacity {} must be positive",
                self.capacity
            )));
        }
        if self.dendrite_strength <= 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "dendrite_strength {} must be positive",
                self.dendrite_strength
            )));
        }
        if self.release_multiple <= 0.0 || self.release_time_factor <= 0.0 {
            return Err(SynapseError::InvalidParameter(
                "release parameters must be positive".into(),
            ));
        }
        if self.graded_floor >= self.graded_ceiling {
            return Err(SynapseError::InvalidParameter(format!(
                "graded range [{}, {}] is empty",
                self.graded_floor, self.graded_ceiling
            )));
        }
        Ok(())
    }

    /// Molecules the cleft must track: the explicit list if given, otherwise
    /// everything either protein binds, always including the native molecule.
    pub fn resolved_active_molecules(&self) -> Vec<MoleculeId> {
        let mut molecules: Vec<MoleculeId> = match &self.active_molecules {
            Some(list) => list.clone(),
            None => {
                let mut all: Vec<MoleculeId> =
                    self.transporter.affinities().map(|(m, _)| m).collect();
                all.extend(self.receptor.affinities().map(|(m, _)| m));
                all
            }
        };
        molecules.push(self.transporter.native());
        molecules.sort_by_key(|m| *m as usize);
        molecules.dedup();
        molecules
    }
}
