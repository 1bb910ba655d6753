//! Probes: named per-tick samplers of simulation scalars.

use neurochemistry::MoleculeId;
use serde::{Deserialize, Serialize};

use crate::{NeuronId, SynapseId};

/// What a probe samples each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProbeKind {
    /// The target neuron's adjusted soma voltage.
    Voltage,
    /// Cumulative spike count of the target neuron.
    Spikes,
    /// Vesicle reserve of the target synapse's axon.
    AxonConcentration,
    /// Cleft concentration of one molecule in the target synapse.
    CleftConcentration(MoleculeId),
    /// Bound concentration on the target synapse's primary dendrite.
    DendriteBound,
}

/// What a probe is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Neuron(NeuronId),
    Synapse(SynapseId),
}

/// A named time-series sink, sampled after every neuron-step phase.
#[derive(Debug)]
pub struct Probe {
    pub(crate) name: String,
    pub(crate) target: ProbeTarget,
    pub(crate) kind: ProbeKind,
    pub(crate) data: Vec<f64>,
}

impl Probe {
    pub(crate) fn new(name: &str, target: ProbeTarget, kind: ProbeKind) -> Self {
        Self {
            name: name.to_string(),
            target,
            kind,
            data: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}
