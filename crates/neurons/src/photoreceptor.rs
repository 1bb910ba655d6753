//! Photoreceptor soma: light-suppressed Hodgkin-Huxley membrane.
//!
//! Photoreceptors do not spike. A standing sodium conductance keeps the
//! membrane depolarized near -40 mV in the dark; light closes sodium
//! channels (here: lowers the `m` gate directly), hyperpolarizing the cell
//! and throttling its graded transmitter release.

use environment::Environment;

use crate::hodgkin_huxley::{alpha_h, alpha_n, beta_h, beta_n, HodgkinHuxleyParameters};
use crate::{Result, SomaDynamics, DEFAULT_RESOLUTION, STABILITY_STEPS};

/// Dark steady-state voltage (mV).
const STABLE_VOLTAGE: f64 = -40.132_346_795_6;

/// Standing sodium activation in full darkness.
const BASE_CONDUCTANCE: f64 = 0.8;

// Gating values at the dark steady state.
const H_DARK: f64 = 0.051_158_791_537_3;
const N_DARK: f64 = 0.677_131_688_462;

/// Default time constant of the light low-pass (ticks).
pub const DEFAULT_LIGHT_TAU: f64 = 1000.0;

/// Photoreceptor soma.
#[derive(Debug)]
pub struct PhotoreceptorSoma {
    env_id: usize,
    params: HodgkinHuxleyParameters,
    h: f64,
    n: f64,
    light_level: f64,
    light_input: f64,
    light_tau: f64,
    resolution: u32,
    dt: f64,
    prev_voltage: f64,
    stable_count: u32,
}

impl PhotoreceptorSoma {
    pub fn new(env: &mut Environment, record: bool) -> Result<Self> {
        Self::with_light_tau(env, record, DEFAULT_LIGHT_TAU)
    }

    pub fn with_light_tau(env: &mut Environment, record: bool, light_tau: f64) -> Result<Self> {
        let env_id = env.register(STABLE_VOLTAGE, record, false)?;
        Ok(Self {
            env_id,
            params: HodgkinHuxleyParameters::default(),
            h: H_DARK,
            n: N_DARK,
            light_level: 0.0,
            light_input: 0.0,
            light_tau: light_tau.max(1.0),
            resolution: DEFAULT_RESOLUTION,
            dt: 1.0 / DEFAULT_RESOLUTION as f64,
            prev_voltage: STABLE_VOLTAGE,
            stable_count: 0,
        })
    }

    /// Target light level in `[0, 1]`, low-passed into the membrane.
    pub fn set_light_input(&mut self, level: f64) {
        self.light_input = level.clamp(0.0, 1.0);
    }

    pub fn light_level(&self) -> f64 {
        self.light_level
    }

    fn cycle(&mut self, voltage: f64, current: f64, m: f64) -> f64 {
        let p = self.params;
        let mut v = voltage;

        for _ in 0..self.resolution {
            let (ah, bh) = (alpha_h(v), beta_h(v));
            let (an, bn) = (alpha_n(v), beta_n(v));

            let ina = p.gnabar * m.powi(3) * self.h * (v - p.vna);
            let ik = p.gkbar * self.n.powi(4) * (v - p.vk);
            let il = p.gl * (v - p.vl);

            v += self.dt * (current - ina - ik - il) / p.cm;
            self.h += self.dt * (ah / (ah + bh) - self.h) * (ah + bh);
            self.n += self.dt * (an / (an + bn) - self.n) * (an + bn);
        }
        v
    }
}

impl SomaDynamics for PhotoreceptorSoma {
    fn step(&mut self, env: &Environment, current: f64) -> bool {
        self.light_level += (self.light_input - self.light_level) / self.light_tau;
        let m = (BASE_CONDUCTANCE - self.light_level).clamp(0.0, 1.0);

        let voltage = self.cycle(env.get(self.env_id), current, m);
        env.set(self.env_id, voltage);

        let quiet = (voltage - self.prev_voltage).abs() < 1e-6
            && (self.light_input - self.light_level).abs() < 1e-6
            && current == 0.0;
        if quiet {
            self.stable_count += 1;
        } else {
            self.stable_count = 0;
        }
        self.prev_voltage = voltage;
        self.stable_count > STABILITY_STEPS
    }

    fn voltage(&self, env: &Environment) -> f64 {
        env.get(self.env_id)
    }

    fn adjusted_voltage(&self, env: &Environment) -> f64 {
        (self.voltage(env) - STABLE_VOLTAGE) / 100.0
    }

    fn reset(&mut self, env: &Environment) {
        env.set(self.env_id, STABLE_VOLTAGE);
        self.h = H_DARK;
        self.n = N_DARK;
        self.light_level = 0.0;
        self.light_input = 0.0;
        self.prev_voltage = STABLE_VOLTAGE;
        self.stable_count = 0;
    }

    fn stable_voltage(&self) -> f64 {
        STABLE_VOLTAGE
    }

    fn env_id(&self) -> usize {
        self.env_id
    }
}
