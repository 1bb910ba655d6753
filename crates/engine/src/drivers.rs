//! Drivers: external time functions injecting current or light into neurons.

use serde::{Deserialize, Serialize};

/// What a driver applies to its neuron on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Stimulus {
    /// External applied current.
    Current(f64),
    /// Light level for photoreceptor somas, in `[0, 1]`.
    Activation(f64),
}

impl Stimulus {
    pub fn magnitude(&self) -> f64 {
        match self {
            Stimulus::Current(v) | Stimulus::Activation(v) => *v,
        }
    }
}

/// An external time function attached to one neuron.
///
/// `drive` runs once per tick before the neuron-step phase. Returning
/// `Some` applies the stimulus and marks the neuron active for this tick;
/// returning `None` leaves the neuron alone.
pub trait Driver: Send {
    fn drive(&mut self, time: u64) -> Option<Stimulus>;

    /// Recorded stimulus series, if this driver records.
    fn data(&self) -> &[f64] {
        &[]
    }
}

/// Applies a fixed stimulus from `delay` onward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantDriver {
    stimulus: Stimulus,
    delay: u64,
}

impl ConstantDriver {
    pub fn new(stimulus: Stimulus, delay: u64) -> Self {
        Self { stimulus, delay }
    }

    pub fn current(current: f64, delay: u64) -> Self {
        Self::new(Stimulus::Current(current), delay)
    }
}

impl Driver for ConstantDriver {
    fn drive(&mut self, time: u64) -> Option<Stimulus> {
        (time >= self.delay).then_some(self.stimulus)
    }
}

/// Square current pulses: `current` for `length` ticks out of every
/// `period`, starting after `delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseDriver {
    current: f64,
    period: u64,
    length: u64,
    delay: u64,
    record: bool,
    #[serde(skip)]
    data: Vec<f64>,
    on: bool,
}

impl PulseDriver {
    pub fn new(current: f64, period: u64, length: u64, delay: u64) -> Self {
        Self {
            current,
            period,
            length,
            delay,
            record: false,
            data: Vec::new(),
            on: false,
        }
    }

    pub fn with_record(mut self) -> Self {
        self.record = true;
        self
    }
}

impl Driver for PulseDriver {
    fn drive(&mut self, time: u64) -> Option<Stimulus> {
        let applied = match time.checked_sub(self.delay) {
            None => None,
            Some(t) => {
                let phase = t % self.period.max(1);
                if phase == 0 {
                    self.on = true;
                } else if phase == self.length {
                    self.on = false;
                }
                if self.on {
                    Some(Stimulus::Current(self.current))
                } else if phase == self.length {
                    // Falling edge: withdraw the drive explicitly.
                    Some(Stimulus::Current(0.0))
                } else {
                    None
                }
            }
        };
        if self.record {
            self.data.push(applied.map_or(0.0, |s| s.magnitude()));
        }
        applied
    }

    fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Square light pulses for photoreceptors, with an optional per-pulse
/// decrement modeling bleaching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationPulseDriver {
    activation: f64,
    period: u64,
    length: u64,
    delay: u64,
    decrement: Option<f64>,
    record: bool,
    #[serde(skip)]
    data: Vec<f64>,
    on: bool,
}

impl ActivationPulseDriver {
    pub fn new(activation: f64, period: u64, length: u64, delay: u64) -> Self {
        Self {
            activation,
            period,
            length,
            delay,
            decrement: None,
            record: false,
            data: Vec::new(),
            on: false,
        }
    }

    pub fn with_decrement(mut self, decrement: f64) -> Self {
        self.decrement = Some(decrement);
        self
    }

    pub fn with_record(mut self) -> Self {
        self.record = true;
        self
    }
}

impl Driver for ActivationPulseDriver {
    fn drive(&mut self, time: u64) -> Option<Stimulus> {
        let applied = match time.checked_sub(self.delay) {
            None => None,
            Some(t) => {
                let phase = t % self.period.max(1);
                if phase < self.length {
                    self.on = true;
                    if let Some(decrement) = self.decrement {
                        self.activation = (self.activation - decrement).max(0.0);
                    }
                    (self.activation > 0.0).then_some(Stimulus::Activation(self.activation))
                } else if self.on {
                    // Lights off.
                    self.on = false;
                    Some(Stimulus::Activation(0.0))
                } else {
                    None
                }
            }
        };
        if self.record {
            self.data.push(applied.map_or(0.0, |s| s.magnitude()));
        }
        applied
    }

    fn data(&self) -> &[f64] {
        &self.data
    }
}
