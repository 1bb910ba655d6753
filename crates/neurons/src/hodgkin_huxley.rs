//! Hodgkin-Huxley soma with Na+, K+, and leak conductances.
//!
//! Forward Euler with a fixed sub-step of `1/resolution` per tick. Rate
//! constants follow the classic squid-axon parameterization.

use environment::Environment;
use serde::{Deserialize, Serialize};

use crate::{Result, SomaDynamics, DEFAULT_RESOLUTION, STABILITY_STEPS};

/// Membrane parameters for the Hodgkin-Huxley model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HodgkinHuxleyParameters {
    /// Membrane capacitance (uF/cm^2)
    pub cm: f64,
    /// Maximum Na+ conductance (mS/cm^2)
    pub gnabar: f64,
    /// Maximum K+ conductance (mS/cm^2)
    pub gkbar: f64,
    /// Leak conductance (mS/cm^2)
    pub gl: f64,
    /// Na+ reversal potential (mV)
    pub vna: f64,
    /// K+ reversal potential (mV)
    pub vk: f64,
    /// Leak reversal potential (mV)
    pub vl: f64,
}

impl Default for HodgkinHuxleyParameters {
    fn default() -> Self {
        Self {
            cm: 1.0,
            gnabar: 120.0,
            gkbar: 36.0,
            gl: 0.3,
            vna: 50.0,
            vk: -77.0,
            vl: -54.4,
        }
    }
}

/// Resting point of the default parameterization (mV).
const STABLE_VOLTAGE: f64 = -64.999_722_433_7;

// Gating values at the resting point.
const M_REST: f64 = 0.052_934_217_620_9;
const H_REST: f64 = 0.596_111_046_355;
const N_REST: f64 = 0.317_681_167_58;

pub(crate) fn alpha_m(v: f64) -> f64 {
    // Singular at v = -40; take the analytic limit.
    if (v + 40.0).abs() < 1e-6 {
        1.0
    } else {
        0.1 * (v + 40.0) / (1.0 - (-(v + 40.0) / 10.0).exp())
    }
}

pub(crate) fn beta_m(v: f64) -> f64 {
    4.0 * (-(v + 65.0) / 18.0).exp()
}

pub(crate) fn alpha_h(v: f64) -> f64 {
    0.07 * (-(v + 65.0) / 20.0).exp()
}

pub(crate) fn beta_h(v: f64) -> f64 {
    1.0 / (1.0 + (-(v + 35.0) / 10.0).exp())
}

pub(crate) fn alpha_n(v: f64) -> f64 {
    if (v + 55.0).abs() < 1e-6 {
        0.1
    } else {
        0.01 * (v + 55.0) / (1.0 - (-(v + 55.0) / 10.0).exp())
    }
}

pub(crate) fn beta_n(v: f64) -> f64 {
    0.125 * (-(v + 65.0) / 80.0).exp()
}

/// Hodgkin-Huxley soma.
#[derive(Debug)]
pub struct HodgkinHuxleySoma {
    env_id: usize,
    params: HodgkinHuxleyParameters,
    m: f64,
    h: f64,
    n: f64,
    resolution: u32,
    dt: f64,
    prev_voltage: f64,
    stable_count: u32,
    firing: bool,
}

impl HodgkinHuxleySoma {
    pub fn new(env: &mut Environment, record: bool, spiking: bool) -> Result<Self> {
        Self::with_resolution(env, record, spiking, DEFAULT_RESOLUTION)
    }

    pub fn with_resolution(
        env: &mut Environment,
        record: bool,
        spiking: bool,
        resolution: u32,
    ) -> Result<Self> {
        let resolution = resolution.max(1);
        let env_id = env.register(STABLE_VOLTAGE, record, spiking)?;
        Ok(Self {
            env_id,
            params: HodgkinHuxleyParameters::default(),
            m: M_REST,
            h: H_REST,
            n: N_REST,
            resolution,
            dt: 1.0 / resolution as f64,
            prev_voltage: STABLE_VOLTAGE,
            stable_count: 0,
            firing: false,
        })
    }

    pub fn firing(&self) -> bool {
        self.firing
    }

    fn cycle(&mut self, voltage: f64, current: f64) -> f64 {
        let p = self.params;
        let mut v = voltage;

        for _ in 0..self.resolution {
            let (am, bm) = (alpha_m(v), beta_m(v));
            let (ah, bh) = (alpha_h(v), beta_h(v));
            let (an, bn) = (alpha_n(v), beta_n(v));

            let ina = p.gnabar * self.m.powi(3) * self.h * (v - p.vna);
            let ik = p.gkbar * self.n.powi(4) * (v - p.vk);
            let il = p.gl * (v - p.vl);

            v += self.dt * (current - ina - ik - il) / p.cm;

            // Gating variables relax toward alpha/(alpha+beta) with time
            // constant 1/(alpha+beta).
            self.m += self.dt * (am / (am + bm) - self.m) * (am + bm);
            self.h += self.dt * (ah / (ah + bh) - self.h) * (ah + bh);
            self.n += self.dt * (an / (an + bn) - self.n) * (an + bn);
        }
        v
    }
}

impl SomaDynamics for HodgkinHuxleySoma {
    fn step(&mut self, env: &Environment, current: f64) -> bool {
        let voltage = self.cycle(env.get(self.env_id), current);
        env.set(self.env_id, voltage);

        self.firing = voltage > 0.0 && self.prev_voltage <= 0.0;

        if current == 0.0 && (voltage - STABLE_VOLTAGE).abs() < 1e-3 {
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
        ((self.voltage(env) - STABLE_VOLTAGE) / 100.0).min(0.2)
    }

    fn reset(&mut self, env: &Environment) {
        env.set(self.env_id, STABLE_VOLTAGE);
        self.m = M_REST;
        self.h = H_REST;
        self.n = N_REST;
        self.prev_voltage = STABLE_VOLTAGE;
        self.stable_count = 0;
        self.firing = false;
    }

    fn stable_voltage(&self) -> f64 {
        STABLE_VOLTAGE
    }

    fn env_id(&self) -> usize {
        self.env_id
    }
}
