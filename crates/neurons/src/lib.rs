//! Membrane-voltage integrators for point-neuron somas.
//!
//! Three soma models are provided:
//! - Hodgkin-Huxley with the classic Na+/K+/leak conductances
//! - Izhikevich with the standard preset parameter table
//! - A photoreceptor variant of Hodgkin-Huxley whose sodium activation is
//!   suppressed by light
//!
//! Every soma publishes its voltage into the shared [`Environment`], so
//! gap-junction peers and axons read a consistent previous-tick value.

use environment::Environment;
use thiserror::Error;

pub mod hodgkin_huxley;
pub mod izhikevich;
pub mod photoreceptor;

pub use hodgkin_huxley::HodgkinHuxleySoma;
pub use izhikevich::{IzhikevichPreset, IzhikevichSoma};
pub use photoreceptor::PhotoreceptorSoma;

#[derive(Debug, Error)]
pub enum SomaError {
    #[error("Invalid soma parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Environment(#[from] environment::EnvironmentError),
}

pub type Result<T> = std::result::Result<T, SomaError>;

/// Default number of forward-Euler sub-steps per tick.
pub const DEFAULT_RESOLUTION: u32 = 100;

/// Consecutive quiet steps required before a soma declares stability.
pub const STABILITY_STEPS: u32 = 10;

/// Common contract of all soma integrators.
pub trait SomaDynamics {
    /// Advances one tick under the fused input `current` and returns whether
    /// the soma has settled at its resting state.
    fn step(&mut self, env: &Environment, current: f64) -> bool;

    /// Voltage published at the last environment step (mV).
    fn voltage(&self, env: &Environment) -> f64;

    /// Scaled voltage suitable for probes.
    fn adjusted_voltage(&self, env: &Environment) -> f64;

    /// Returns the soma to its initial state.
    fn reset(&mut self, env: &Environment);

    /// Resting voltage of the model (mV).
    fn stable_voltage(&self) -> f64;

    /// Environment id holding the soma voltage.
    fn env_id(&self) -> usize;
}

/// The soma sum type owned by a neuron.
#[derive(Debug)]
pub enum Soma {
    HodgkinHuxley(HodgkinHuxleySoma),
    Izhikevich(IzhikevichSoma),
    Photoreceptor(PhotoreceptorSoma),
}

impl Soma {
    /// Light input for photoreceptor somas; ignored by the other models.
    pub fn set_light_input(&mut self, level: f64) {
        if let Soma::Photoreceptor(soma) = self {
            soma.set_light_input(level);
        }
    }

    /// Whether the last step crossed the spike threshold.
    pub fn firing(&self) -> bool {
        match self {
            Soma::Izhikevich(soma) => soma.firing(),
            Soma::HodgkinHuxley(soma) => soma.firing(),
            Soma::Photoreceptor(_) => false,
        }
    }
}

impl SomaDynamics for Soma {
    fn step(&mut self, env: &Environment, current: f64) -> bool {
        match self {
            Soma::HodgkinHuxley(soma) => soma.step(env, current),
            Soma::Izhikevich(soma) => soma.step(env, current),
            Soma::Photoreceptor(soma) => soma.step(env, current),
        }
    }

    fn voltage(&self, env: &Environment) -> f64 {
        match self {
            Soma::HodgkinHuxley(soma) => soma.voltage(env),
            Soma::Izhikevich(soma) => soma.voltage(env),
            Soma::Photoreceptor(soma) => soma.voltage(env),
        }
    }

    fn adjusted_voltage(&self, env: &Environment) -> f64 {
        match self {
            Soma::HodgkinHuxley(soma) => soma.adjusted_voltage(env),
            Soma::Izhikevich(soma) => soma.adjusted_voltage(env),
            Soma::Photoreceptor(soma) => soma.adjusted_voltage(env),
        }
    }

    fn reset(&mut self, env: &Environment) {
        match self {
            Soma::HodgkinHuxley(soma) => soma.reset(env),
            Soma::Izhikevich(soma) => soma.reset(env),
            Soma::Photoreceptor(soma) => soma.reset(env),
        }
    }

    fn stable_voltage(&self) -> f64 {
        match self {
            Soma::HodgkinHuxley(soma) => soma.stable_voltage(),
            Soma::Izhikevich(soma) => soma.stable_voltage(),
            Soma::Photoreceptor(soma) => soma.stable_voltage(),
        }
    }

    fn env_id(&self) -> usize {
        match self {
            Soma::HodgkinHuxley(soma) => soma.env_id(),
            Soma::Izhikevich(soma) => soma.env_id(),
            Soma::Photoreceptor(soma) => soma.env_id(),
        }
    }
}
