//! Izhikevich soma model.
//!
//! Two-variable quadratic integrate-and-fire:
//!
//! ```text
//! v' = 0.04v^2 + 5v + 140 - u + I
//! u' = a(bv - u)
//! if v > 30: v = c, u += d
//! ```
//!
//! The preset table covers the standard firing phenotypes plus the graded
//! retinal cells (photoreceptor, horizontal), which use a = b = d = 0 and
//! act as leaky integrators around their resting point.

use environment::Environment;
use serde::{Deserialize, Serialize};

use crate::{Result, SomaDynamics, DEFAULT_RESOLUTION, STABILITY_STEPS};

/// Spike cutoff (mV).
pub const SPIKE_VOLTAGE: f64 = 30.0;

/// Named parameter presets `(a, b, c, d)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IzhikevichPreset {
    Default,
    Regular,
    Bursting,
    Chattering,
    Fast,
    LowThreshold,
    ThalamoCortical,
    Resonator,
    Photoreceptor,
    Horizontal,
}

impl IzhikevichPreset {
    /// `(a, b, c, d)` parameter tuple.
    pub fn params(&self) -> (f64, f64, f64, f64) {
        match self {
            IzhikevichPreset::Default => (0.02, 0.2, -70.0, 2.0),
            IzhikevichPreset::Regular => (0.02, 0.2, -65.0, 8.0),
            IzhikevichPreset::Bursting => (0.02, 0.2, -55.0, 4.0),
            IzhikevichPreset::Chattering => (0.02, 0.2, -50.0, 2.0),
            IzhikevichPreset::Fast => (0.1, 0.2, -65.0, 2.0),
            IzhikevichPreset::LowThreshold => (0.02, 0.25, -65.0, 2.0),
            IzhikevichPreset::ThalamoCortical => (0.02, 0.25, -65.0, 0.05),
            IzhikevichPreset::Resonator => (0.1, 0.26, -65.0, 2.0),
            IzhikevichPreset::Photoreceptor => (0.0, 0.0, -82.6, 0.0),
            IzhikevichPreset::Horizontal => (0.0, 0.0, -82.6, 0.0),
        }
    }
}

/// Izhikevich soma.
#[derive(Debug)]
pub struct IzhikevichSoma {
    env_id: usize,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    u: f64,
    resolution: u32,
    dt: f64,
    prev_voltage: f64,
    stable_count: u32,
    firing: bool,
}

impl IzhikevichSoma {
    pub fn new(
        env: &mut Environment,
        preset: IzhikevichPreset,
        record: bool,
        spiking: bool,
    ) -> Result<Self> {
        Self::with_resolution(env, preset, record, spiking, DEFAULT_RESOLUTION)
    }

    pub fn with_resolution(
        env: &mut Environment,
        preset: IzhikevichPreset,
        record: bool,
        spiking: bool,
        resolution: u32,
    ) -> Result<Self> {
        let resolution = resolution.max(1);
        let (a, b, c, d) = preset.params();
        let env_id = env.register(c, record, spiking)?;
        Ok(Self {
            env_id,
            a,
            b,
            c,
            d,
            u: b * c,
            resolution,
            dt: 1.0 / resolution as f64,
            prev_voltage: c,
            stable_count: 0,
            firing: false,
        })
    }

    pub fn firing(&self) -> bool {
        self.firing
    }

    fn cycle(&mut self, voltage: f64, current: f64) -> f64 {
        let mut v = voltage;

        // After-spike reset applies before integrating the next tick.
        if v > SPIKE_VOLTAGE {
            v = self.c;
            self.u += self.d;
        }

        for _ in 0..self.resolution {
            if v > SPIKE_VOLTAGE {
                self.firing = true;
                break;
            }
            let dv = 0.04 * v * v + 5.0 * v + 140.0 - self.u + current;
            v += self.dt * dv;
        }
        self.u += self.a * (self.b * v - self.u);
        v
    }
}

impl SomaDynamics for IzhikevichSoma {
    fn step(&mut self, env: &Environment, current: f64) -> bool {
        self.firing = false;
        let voltage = self.cycle(env.get(self.env_id), current);
        env.set(self.env_id, voltage);

        if (voltage - self.prev_voltage).abs() < 1e-3 {
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
        (self.voltage(env).min(SPIKE_VOLTAGE) - self.c) / 100.0
    }

    fn reset(&mut self, env: &Environment) {
        env.set(self.env_id, self.c);
        self.u = self.b * self.c;
        self.prev_voltage = self.c;
        self.stable_count = 0;
        self.firing = false;
    }

    fn stable_voltage(&self) -> f64 {
        self.c
    }

    fn env_id(&self) -> usize {
        self.env_id
    }
}
