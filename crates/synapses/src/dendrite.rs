//! Postsynaptic receptor membranes.

use environment::{Environment, Pool};
use neurochemistry::{Activation, MoleculeId, Receptor, VOLTAGE_GATE_THRESHOLD};

use crate::{Result, SynapseError};

/// A receptor membrane on the postsynaptic side of a cleft.
///
/// The cleft is the only writer of the bound concentration; the host neuron
/// reads it through a [`DendriteBinding`] handle, so no reference cycle
/// exists between the synapse and the postsynaptic neuron.
#[derive(Debug)]
pub struct Dendrite {
    receptor: Receptor,
    density: f64,
    strength: f64,
    bound: Pool,
}

impl Dendrite {
    pub fn new(
        env: &mut Environment,
        receptor: Receptor,
        density: f64,
        strength: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&density) {
            return Err(SynapseError::InvalidParameter(format!(
                "dendrite density {density} outside [0, 1]"
            )));
        }
        if strength <= 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "dendrite strength {strength} must be positive"
            )));
        }
        Ok(Self {
            receptor,
            density,
            strength,
            bound: Pool::register(env, 0.0)?,
        })
    }

    pub fn receptor(&self) -> &Receptor {
        &self.receptor
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn native(&self) -> MoleculeId {
        self.receptor.native()
    }

    /// Transmitter currently bound to the membrane.
    pub fn bound(&self, env: &Environment) -> f64 {
        self.bound.concentration(env)
    }

    pub(crate) fn set_bound(&self, env: &Environment, concentration: f64) {
        env.set(self.bound.env_id(), concentration.max(0.0));
    }

    pub(crate) fn add_bound(&self, env: &Environment, delta: f64) {
        self.bound.add(env, delta);
    }

    /// The handle handed to the postsynaptic neuron.
    pub fn binding(&self) -> DendriteBinding {
        DendriteBinding {
            bound_id: self.bound.env_id(),
            strength: self.strength,
            activation: self.receptor.activation(),
        }
    }
}

/// Read-only view of a dendrite used by the host neuron during current
/// fusion.
#[derive(Debug, Clone, Copy)]
pub struct DendriteBinding {
    bound_id: usize,
    strength: f64,
    activation: Activation,
}

impl DendriteBinding {
    pub(crate) fn from_raw(bound_id: usize, strength: f64, activation: Activation) -> Self {
        Self {
            bound_id,
            strength,
            activation,
        }
    }

    /// Ligand current contributed to the host, given the host's own soma
    /// voltage (for the voltage-gated receptor kind).
    pub fn ligand_current(&self, env: &Environment, soma_voltage: f64) -> f64 {
        let activation = env.get(self.bound_id);
        match self.activation {
            Activation::Epsp => self.strength * activation,
            Activation::VoltageEpsp => {
                if soma_voltage > VOLTAGE_GATE_THRESHOLD {
                    self.strength * activation
                } else {
                    0.0
                }
            }
            Activation::Ipsp => -self.strength * activation,
        }
    }

    pub fn bound_id(&self) -> usize {
        self.bound_id
    }
}
