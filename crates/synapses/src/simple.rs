//! Delay-line synapse without cleft chemistry.
//!
//! The simple synapse shares the chemical synapse's release functions but
//! skips the axon reserve, cleft, and binding math entirely: the release
//! value itself is published as a shared scalar and postsynaptic dendrite
//! handles read it directly. Interchangeable with [`ChemicalSynapse`]
//! where transmitter bookkeeping is not the point.
//!
//! [`ChemicalSynapse`]: crate::chemical::ChemicalSynapse

use std::collections::VecDeque;

use environment::Environment;
use neurochemistry::{Receptor, ReleaseGenerator};

use crate::dendrite::DendriteBinding;
use crate::{ReleaseMode, Result, SynapseError};

/// Soma voltage that arms a spike-mode release generator (mV).
const SPIKE_THRESHOLD: f64 = 30.0;

/// Graded release range for non-spiking presynapses (mV).
const GRADED_FLOOR: f64 = -150.0;
const GRADED_CEILING: f64 = -82.0;

/// Baseline voltage priming the delay queue (mV).
const BASELINE_VOLTAGE: f64 = -70.0;

/// A synapse reduced to a delay queue and a release curve.
#[derive(Debug)]
pub struct SimpleSynapse {
    value_id: usize,
    strength: f64,
    receptor: Receptor,
    mode: ReleaseMode,
    release_scale: f64,
    generators: Vec<ReleaseGenerator>,
    delay_queue: Option<VecDeque<f64>>,
    above_threshold: bool,
    last_released: f64,
    postsynaptic: usize,
}

impl SimpleSynapse {
    pub fn new(
        env: &mut Environment,
        receptor: Receptor,
        mode: ReleaseMode,
        delay: usize,
        strength: f64,
        postsynaptic: usize,
    ) -> Result<Self> {
        if strength <= 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "strength {strength} must be positive"
            )));
        }
        let delay_queue = (delay > 0).then(|| {
            let mut queue = VecDeque::with_capacity(delay);
            queue.extend(std::iter::repeat(BASELINE_VOLTAGE).take(delay));
            queue
        });
        Ok(Self {
            value_id: env.register(0.0, false, false)?,
            strength,
            receptor,
            mode,
            release_scale: 1.0,
            generators: Vec::new(),
            delay_queue,
            above_threshold: false,
            last_released: 0.0,
            postsynaptic,
        })
    }

    pub fn postsynaptic(&self) -> usize {
        self.postsynaptic
    }

    /// Handle for the postsynaptic neuron's current fusion.
    pub fn binding(&self) -> DendriteBinding {
        DendriteBinding::from_raw(self.value_id, self.strength, self.receptor.activation())
    }

    /// Published release value.
    pub fn released(&self, env: &Environment) -> f64 {
        env.get(self.value_id)
    }

    /// Advances one tick with the presynaptic soma voltage. Returns whether
    /// the synapse is stable (nothing released).
    pub fn step(&mut self, env: &Environment, voltage: f64) -> bool {
        let voltage = match &mut self.delay_queue {
            Some(queue) => {
                queue.push_front(voltage);
                queue.pop_back().unwrap_or(voltage)
            }
            None => voltage,
        };

        let released = match self.mode {
            ReleaseMode::Spiking => {
                if voltage > SPIKE_THRESHOLD {
                    if !self.above_threshold {
                        self.above_threshold = true;
                        self.generators
                            .push(ReleaseGenerator::new(self.release_scale, 1.0));
                    }
                } else {
                    self.above_threshold = false;
                }
                let mut total = 0.0;
                for generator in &mut self.generators {
                    total += generator.next().unwrap_or(0.0);
                }
                self.generators.retain(|g| !g.is_done());
                total.min(1.0)
            }
            ReleaseMode::Graded => {
                ((voltage - GRADED_FLOOR) / (GRADED_CEILING - GRADED_FLOOR)).clamp(0.0, 1.0)
            }
        };

        if released != self.last_released {
            env.set(self.value_id, released);
            self.last_released = released;
        }
        released == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_release_decays() {
        let mut env = Environment::new();
        let mut synapse = SimpleSynapse::new(
            &mut env,
            Receptor::ampa(),
            ReleaseMode::Spiking,
            0,
            1.0,
            1,
        )
        .unwrap();

        synapse.step(&env, 31.0);
        env.step();
        let first = synapse.released(&env);
        assert!(first > 0.0);

        // Track the burst over the following ticks; it rises then drains.
        let mut peak = first;
        let mut last = first;
        for _ in 0..40 {
            synapse.step(&env, -70.0);
            env.step();
            last = synapse.released(&env);
            peak = peak.max(last);
        }
        assert!(peak >= first);
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_graded_release_follows_voltage() {
        let mut env = Environment::new();
        let mut synapse = SimpleSynapse::new(
            &mut env,
            Receptor::gabaa(),
            ReleaseMode::Graded,
            0,
            1.0,
            1,
        )
        .unwrap();

        assert!(synapse.step(&env, -160.0));
        env.step();
        assert_eq!(synapse.released(&env), 0.0);

        synapse.step(&env, -116.0);
        env.step();
        assert!((synapse.released(&env) - 0.5).abs() < 1e-9);

        synapse.step(&env, -82.0);
        env.step();
        assert_eq!(synapse.released(&env), 1.0);
    }

    #[test]
    fn test_delay_defers_release() {
        let mut env = Environment::new();
        let mut synapse = SimpleSynapse::new(
            &mut env,
            Receptor::ampa(),
            ReleaseMode::Spiking,
            2,
            1.0,
            1,
        )
        .unwrap();

        synapse.step(&env, 31.0);
        env.step();
        assert_eq!(synapse.released(&env), 0.0);
        synapse.step(&env, -70.0);
        env.step();
        assert_eq!(synapse.released(&env), 0.0);
        synapse.step(&env, -70.0);
        env.step();
        assert!(synapse.released(&env) > 0.0);
    }
}
