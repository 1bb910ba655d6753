//! Stochastic primitives: beta-shaped draws and Erlang release generators.
//!
//! These are the only two randomness sources in the simulator. Each synapse
//! owns its own seeded sampler, so trajectories are reproducible regardless
//! of how the engine schedules neuron steps across worker threads.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};

use crate::{ChemistryError, Result};

/// Increment below which an exhausted release generator terminates.
pub const RELEASE_EPSILON: f64 = 1e-6;

const RATE_EPSILON: f64 = 1e-4;

/// Draws values in `[0, maximum]` following a beta shape.
///
/// The `noise` level is fixed at construction; `rate` skews each draw, with
/// high rates concentrating mass near `maximum`. At `noise == 0` the
/// distribution collapses onto its mean and the draw is replaced by the
/// closed-form envelope `maximum / (1 + ratio)`.
#[derive(Debug)]
pub struct StochasticSampler {
    rng: StdRng,
    noise: f64,
}

impl StochasticSampler {
    pub fn new(seed: u64, noise: f64) -> Result<Self> {
        if noise < 0.0 {
            return Err(ChemistryError::InvalidSamplerParameter(format!(
                "negative noise {noise}"
            )));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            noise,
        })
    }

    /// A draw in `[0, maximum]` skewed by `rate`.
    pub fn beta(&mut self, maximum: f64, rate: f64) -> f64 {
        debug_assert!(rate >= 0.0, "negative rate {rate}");
        if maximum <= 0.0 {
            return 0.0;
        }

        let ratio = 1.0 / (RATE_EPSILON + rate.max(0.0));
        if self.noise == 0.0 {
            return maximum / (1.0 + ratio);
        }

        let a = (1.0 + 100.0 * (1.0 - self.noise)).max(RATE_EPSILON);
        let b = ratio * a;
        match Beta::new(a, b) {
            Ok(dist) => maximum * dist.sample(&mut self.rng),
            // Degenerate shape parameters: fall back to the mean envelope.
            Err(_) => maximum / (1.0 + ratio),
        }
    }

    pub fn noise(&self) -> f64 {
        self.noise
    }
}

/// CDF of the Erlang distribution with shape 2 and unit rate.
fn erlang2_cdf(t: f64) -> f64 {
    if t <= 0.0 {
        0.0
    } else {
        1.0 - (-t).exp() * (1.0 + t)
    }
}

/// A finite stream of per-tick neurochemical release increments.
///
/// Yields `strength * (F(scale*x) - F(scale*(x-1)))` for `x = 1, 2, ...`
/// where `F` is the Erlang(2) CDF, and terminates at the first increment
/// below [`RELEASE_EPSILON`] once increments have become non-zero. Larger
/// time scales stretch the release curve and delay its peak.
#[derive(Debug, Clone)]
pub struct ReleaseGenerator {
    scale: f64,
    strength: f64,
    x: u64,
    prev_cdf: f64,
    started: bool,
    done: bool,
}

impl ReleaseGenerator {
    pub fn new(scale: f64, strength: f64) -> Self {
        Self {
            scale,
            strength,
            x: 0,
            prev_cdf: 0.0,
            started: false,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Iterator for ReleaseGenerator {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.done {
            return None;
        }
        self.x += 1;
        let cdf = erlang2_cdf(self.scale * self.x as f64);
        let increment = self.strength * (cdf - self.prev_cdf);
        self.prev_cdf = cdf;

        if increment >= RELEASE_EPSILON {
            self.started = true;
        } else if self.started || cdf >= 1.0 - RELEASE_EPSILON {
            self.done = true;
            return None;
        }
        Some(increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_beta_envelope() {
        let mut sampler = StochasticSampler::new(7, 0.5).unwrap();
        for &maximum in &[0.0, 0.1, 1.0, 10.0] {
            for &rate in &[0.0, 1.0, 10.0] {
                for _ in 0..100 {
                    let draw = sampler.beta(maximum, rate);
                    assert!(draw >= 0.0 && draw <= maximum, "{draw} vs {maximum}");
                }
            }
        }
    }

    #[test]
    fn test_beta_deterministic_without_noise() {
        let mut a = StochasticSampler::new(1, 0.0).unwrap();
        let mut b = StochasticSampler::new(2, 0.0).unwrap();
        assert_eq!(a.beta(1.0, 10.0), b.beta(1.0, 10.0));

        // Mean envelope: maximum * (rate + eps) / (rate + eps + 1).
        assert_relative_eq!(a.beta(1.0, 10.0), 10.0001 / 11.0001, epsilon = 1e-12);
    }

    #[test]
    fn test_beta_rejects_negative_noise() {
        assert!(StochasticSampler::new(0, -0.1).is_err());
    }

    #[test]
    fn test_release_generator_sums_to_strength() {
        let total: f64 = ReleaseGenerator::new(1.0, 0.8).sum();
        assert_relative_eq!(total, 0.8, epsilon = 1e-3);
    }

    #[test]
    fn test_release_generator_terminates() {
        let increments: Vec<f64> = ReleaseGenerator::new(1.0, 1.0).collect();
        assert!(!increments.is_empty());
        assert!(increments.len() < 100);
        assert!(increments.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn test_release_peak_shifts_with_scale() {
        // A smaller time scale (longer release_time_factor) moves the peak
        // increment to a later tick.
        let peak_index = |scale: f64| {
            ReleaseGenerator::new(scale, 1.0)
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .map(|(i, _)| i)
                .unwrap()
        };
        assert!(peak_index(0.2) > peak_index(1.0));
        assert!(peak_index(0.05) > peak_index(0.2));
    }
}
