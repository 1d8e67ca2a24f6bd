//! Counter increment algorithms.

use super::sampler;
use super::{MetricValue, TickContext, ValueGenerator};
use crate::config::CounterAlgorithm;
use rand_chacha::ChaCha20Rng;

/// Seconds in one diurnal cycle.
const DIURNAL_PERIOD_S: f64 = 86_400.0;

/// Generates monotonically non-decreasing cumulative counts.
///
/// The spike multiplier scales each tick's increment before it is added
/// to the accumulator, so the exported value never decreases for any
/// multiplier >= 0.
pub struct CounterGenerator {
    algorithm: CounterAlgorithm,
    rng: ChaCha20Rng,
    accumulator: f64,
}

impl CounterGenerator {
    pub fn new(algorithm: CounterAlgorithm, rng: ChaCha20Rng) -> Self {
        Self {
            algorithm,
            rng,
            accumulator: 0.0,
        }
    }

    /// `1 + amp * sin(2pi * t / 86400)`, floored at zero so a large
    /// amplitude cannot drive the Poisson mean negative.
    fn diurnal_factor(t_s: f64, amp: f64) -> f64 {
        (1.0 + amp * (std::f64::consts::TAU * t_s / DIURNAL_PERIOD_S).sin()).max(0.0)
    }
}

impl ValueGenerator for CounterGenerator {
    fn next(&mut self, ctx: &TickContext, multiplier: f64) -> MetricValue {
        let increment = match &self.algorithm {
            CounterAlgorithm::Poisson {
                base_rate,
                diurnal_amp,
            } => {
                let mean =
                    base_rate * ctx.tick_interval_s * Self::diurnal_factor(ctx.t_s, *diurnal_amp);
                sampler::poisson(&mut self.rng, mean) as f64
            }
            CounterAlgorithm::Constant { increment } => *increment,
        };

        self.accumulator += increment * multiplier;
        MetricValue::Counter {
            cumulative: self.accumulator,
        }
    }
}
