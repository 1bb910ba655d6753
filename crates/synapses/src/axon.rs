//! Presynaptic axon: vesicle reserve, release generators, delay line.

use std::collections::VecDeque;

use environment::{Environment, Pool};
use neurochemistry::{MoleculeId, ReleaseGenerator, StochasticSampler, Transporter};

use crate::cleft::SynapticCleft;
use crate::{ReleaseMode, Result, SynapseConfig, SynapseError};

/// Soma voltage that arms a spike-mode release generator (mV).
const SPIKE_THRESHOLD: f64 = 30.0;

/// Resting voltage used to prime the delay queue (mV).
const BASELINE_VOLTAGE: f64 = -70.0;

/// Reserve gap below which replenishment snaps to capacity.
const REPLENISH_EPSILON: f64 = 1e-5;

/// The axon terminal of a chemical synapse.
///
/// The vesicle reserve lives in the environment so probes and the cleft's
/// reuptake accounting read the same published value. Release decrements
/// the reserve; regeneration comes from `replenish` (asymptotic approach to
/// capacity) and from reuptake, which the cleft performs by treating the
/// axon's transporter as one of the competing proteins.
#[derive(Debug)]
pub struct Axon {
    transporter: Transporter,
    reserve: Pool,
    capacity: f64,
    density: f64,
    replenish_rate: f64,
    release_scale: f64,
    release_rate: f64,
    mode: ReleaseMode,
    generators: Vec<ReleaseGenerator>,
    delay_queue: Option<VecDeque<f64>>,
    graded_floor: f64,
    graded_ceiling: f64,
    above_threshold: bool,
}

impl Axon {
    pub fn new(env: &mut Environment, config: &SynapseConfig, mode: ReleaseMode) -> Result<Self> {
        config.validate()?;
        let delay_queue = (config.axon_delay > 0).then(|| {
            let mut queue = VecDeque::with_capacity(config.axon_delay);
            queue.extend(std::iter::repeat(BASELINE_VOLTAGE).take(config.axon_delay));
            queue
        });
        Ok(Self {
            transporter: config.transporter.clone(),
            reserve: Pool::register(env, config.capacity)?,
            capacity: config.capacity,
            density: config.reuptake_rate,
            replenish_rate: config.replenish_rate,
            release_scale: 1.0 / config.release_time_factor,
            release_rate: 2.0 * config.release_multiple,
            mode,
            generators: Vec::new(),
            delay_queue,
            graded_floor: config.graded_floor,
            graded_ceiling: config.graded_ceiling,
            above_threshold: false,
        })
    }

    pub fn transporter(&self) -> &Transporter {
        &self.transporter
    }

    pub fn native(&self) -> MoleculeId {
        self.transporter.native()
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn mode(&self) -> ReleaseMode {
        self.mode
    }

    /// Published vesicle reserve.
    pub fn concentration(&self, env: &Environment) -> f64 {
        self.reserve.concentration(env)
    }

    pub(crate) fn reserve(&self) -> Pool {
        self.reserve
    }

    /// Arms a release generator for one spike of the given `strength`.
    pub fn fire(&mut self, strength: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(SynapseError::InvalidParameter(format!(
                "spike strength {strength} outside [0, 1]"
            )));
        }
        self.generators
            .push(ReleaseGenerator::new(self.release_scale, strength));
        Ok(())
    }

    /// Advances one tick with the presynaptic soma voltage.
    ///
    /// Returns whether the axon is stable: full reserve and nothing left to
    /// release.
    pub fn step(
        &mut self,
        env: &Environment,
        cleft: &SynapticCleft,
        sampler: &mut StochasticSampler,
        voltage: f64,
    ) -> bool {
        let voltage = match &mut self.delay_queue {
            Some(queue) => {
                queue.push_front(voltage);
                queue.pop_back().unwrap_or(voltage)
            }
            None => voltage,
        };

        let replenished = self.replenish(env, sampler);
        let released = self.release(env, cleft, sampler, voltage);
        replenished && released
    }

    /// Per-tick release fraction in `[0, 1]` before the stochastic draw.
    fn release_fraction(&mut self, voltage: f64) -> f64 {
        match self.mode {
            ReleaseMode::Spiking => {
                // Arm a fresh generator on the rising edge of a spike.
                if voltage > SPIKE_THRESHOLD {
                    if !self.above_threshold {
                        self.above_threshold = true;
                        self.generators
                            .push(ReleaseGenerator::new(self.release_scale, 1.0));
                    }
                } else {
                    self.above_threshold = false;
                }

                let mut fraction = 0.0;
                for generator in &mut self.generators {
                    fraction += generator.next().unwrap_or(0.0);
                }
                self.generators.retain(|g| !g.is_done());
                fraction.min(1.0)
            }
            ReleaseMode::Graded => {
                ((voltage - self.graded_floor) / (self.graded_ceiling - self.graded_floor))
                    .clamp(0.0, 1.0)
            }
        }
    }

    fn release(
        &mut self,
        env: &Environment,
        cleft: &SynapticCleft,
        sampler: &mut StochasticSampler,
        voltage: f64,
    ) -> bool {
        let fraction = self.release_fraction(voltage);
        if fraction <= 0.0 {
            return true;
        }

        let released = sampler
            .beta(fraction, self.release_rate)
            .min(self.concentration(env));
        if released <= 0.0 {
            return true;
        }

        self.reserve.remove(env, released);
        cleft.deposit(env, self.native(), released);
        false
    }

    fn replenish(&mut self, env: &Environment, sampler: &mut StochasticSampler) -> bool {
        let concentration = self.concentration(env);
        let missing = self.capacity - concentration;
        if missing <= 0.0 || self.replenish_rate == 0.0 {
            return true;
        }
        if missing < REPLENISH_EPSILON {
            // Asymptotic regeneration: once the gap is negligible, snap to
            // capacity instead of chasing it forever.
            let _ = self.reserve.set(env, self.capacity);
            return true;
        }
        let sample = sampler.beta(missing, self.replenish_rate);
        self.reserve.add_capped(env, sample, self.capacity);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fixture(mode: ReleaseMode) -> (Environment, Axon, SynapticCleft, StochasticSampler) {
        let mut env = Environment::new();
        let config = SynapseConfig::default();
        let cleft = SynapticCleft::new(
            &mut env,
            config.resolved_active_molecules(),
            config.enzyme_concentration,
        )
        .unwrap();
        let axon = Axon::new(&mut env, &config, mode).unwrap();
        let sampler = StochasticSampler::new(42, 0.0).unwrap();
        (env, axon, cleft, sampler)
    }

    #[test]
    fn test_fire_rejects_invalid_strength() {
        let (_, mut axon, _, _) = fixture(ReleaseMode::Spiking);
        assert!(axon.fire(1.5).is_err());
        assert!(axon.fire(-0.1).is_err());
        assert!(axon.fire(0.5).is_ok());
    }

    #[test]
    fn test_spike_release_transfers_to_cleft() {
        let (mut env, mut axon, cleft, mut sampler) = fixture(ReleaseMode::Spiking);

        // One spike, then sub-threshold voltage while the burst drains.
        axon.step(&env, &cleft, &mut sampler, 31.0);
        env.step();
        for _ in 0..10 {
            axon.step(&env, &cleft, &mut sampler, -70.0);
            env.step();
        }

        let reserve = axon.concentration(&env);
        assert!(reserve < axon.capacity());
        assert!(cleft.concentration(&env, MoleculeId::Glutamate) > 0.0);
    }

    #[test]
    fn test_graded_release_tracks_voltage() {
        let (mut env, mut axon, cleft, mut sampler) = fixture(ReleaseMode::Graded);

        // Below the floor: no release.
        assert!(axon.step(&env, &cleft, &mut sampler, -80.0));
        env.step();
        assert_eq!(cleft.concentration(&env, MoleculeId::Glutamate), 0.0);

        // At the ceiling: a full-fraction draw.
        axon.step(&env, &cleft, &mut sampler, -40.0);
        env.step();
        assert!(cleft.concentration(&env, MoleculeId::Glutamate) > 0.5);
    }

    #[test]
    fn test_replenish_approaches_capacity() {
        let (mut env, mut axon, cleft, mut sampler) = fixture(ReleaseMode::Spiking);

        env.set(axon.reserve().env_id(), 2.0);
        env.step();

        let mut previous = axon.concentration(&env);
        let mut previous_gain = f64::MAX;
        for _ in 0..200 {
            axon.step(&env, &cleft, &mut sampler, -70.0);
            env.step();
            let concentration = axon.concentration(&env);
            let gain = concentration - previous;
            assert!(gain >= -1e-12);
            // Asymptotic approach: gains shrink monotonically.
            assert!(gain <= previous_gain + 1e-9);
            assert!(concentration <= axon.capacity() + 1e-9);
            previous_gain = gain;
            previous = concentration;
        }
        assert_relative_eq!(axon.concentration(&env), axon.capacity(), epsilon = 1e-6);
    }

    #[test]
    fn test_delay_queue_postpones_release() {
        let mut env = Environment::new();
        let config = SynapseConfig::default().with_axon_delay(3);
        let cleft = SynapticCleft::new(
            &mut env,
            config.resolved_active_molecules(),
            config.enzyme_concentration,
        )
        .unwrap();
        let mut axon = Axon::new(&mut env, &config, ReleaseMode::Spiking).unwrap();
        let mut sampler = StochasticSampler::new(42, 0.0).unwrap();

        // The spike voltage sits in the queue for three ticks.
        axon.step(&env, &cleft, &mut sampler, 31.0);
        env.step();
        for _ in 0..2 {
            axon.step(&env, &cleft, &mut sampler, -70.0);
            env.step();
            assert_eq!(cleft.concentration(&env, MoleculeId::Glutamate), 0.0);
        }
        axon.step(&env, &cleft, &mut sampler, -70.0);
        env.step();
        axon.step(&env, &cleft, &mut sampler, -70.0);
        env.step();
        assert!(cleft.concentration(&env, MoleculeId::Glutamate) > 0.0);
    }
}
