//! Gauge value algorithms.

use super::sampler;
use super::{MetricValue, TickContext, ValueGenerator};
use crate::config::GaugeAlgorithm;
use rand_chacha::ChaCha20Rng;

/// Generates point-in-time gauge values.
///
/// The spike multiplier rescales the output only; the nominal state (the
/// random-walk position) is never scaled, so the series returns exactly
/// to its unspiked trajectory when the spike expires.
pub struct GaugeGenerator {
    algorithm: GaugeAlgorithm,
    rng: ChaCha20Rng,
    /// Current random-walk position, if the algorithm has one.
    walk_state: Option<f64>,
}

impl GaugeGenerator {
    pub fn new(algorithm: GaugeAlgorithm, rng: ChaCha20Rng) -> Self {
        Self {
            algorithm,
            rng,
            walk_state: None,
        }
    }
}

impl ValueGenerator for GaugeGenerator {
    fn next(&mut self, ctx: &TickContext, multiplier: f64) -> MetricValue {
        let nominal = match &self.algorithm {
            GaugeAlgorithm::RandomWalk {
                start,
                step,
                clamp_lo,
                clamp_hi,
            } => {
                let prev = self.walk_state.unwrap_or(*start);
                let mut value = prev + sampler::uniform_range(&mut self.rng, -step, *step);
                if let Some(lo) = clamp_lo {
                    value = value.max(*lo);
                }
                if let Some(hi) = clamp_hi {
                    value = value.min(*hi);
                }
                self.walk_state = Some(value);
                value
            }
            GaugeAlgorithm::Sine {
                offset,
                amplitude,
                period_s,
            } => offset + amplitude * (std::f64::consts::TAU * ctx.t_s / period_s).sin(),
            GaugeAlgorithm::Bernoulli { p } => {
                if sampler::uniform_open01(&mut self.rng) < *p {
                    1.0
                } else {
                    0.0
                }
            }
            GaugeAlgorithm::Sawtooth { min, max, period_s } => {
                let phase = ctx.t_s.rem_euclid(*period_s) / period_s;
                min + (max - min) * phase
            }
        };

        MetricValue::Gauge {
            value: nominal * multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::SeedableRng;

    fn ctx(t_s: f64) -> TickContext {
        TickContext {
            tick_index: t_s as u64,
            t_s,
            tick_interval_s: 1.0,
        }
    }

    fn generator(algorithm: GaugeAlgorithm) -> GaugeGenerator {
        GaugeGenerator::new(algorithm, ChaCha20Rng::from_seed([2u8; 32]))
    }

    fn value(v: MetricValue) -> f64 {
        match v {
            MetricValue::Gauge { value } => value,
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_random_walk_respects_clamp() {
        let mut g = generator(GaugeAlgorithm::RandomWalk {
            start: 0.5,
            step: 0.4,
            clamp_lo: Some(0.0),
            clamp_hi: Some(1.0),
        });
        for i in 0..500 {
            let v = value(g.next(&ctx(i as f64), 1.0));
            assert!((0.0..=1.0).contains(&v), "walk escaped clamp: {v}");
        }
    }

    #[test]
    fn test_random_walk_steps_bounded() {
        let mut g = generator(GaugeAlgorithm::RandomWalk {
            start: 0.0,
            step: 0.1,
            clamp_lo: None,
            clamp_hi: None,
        });
        let mut prev = 0.0;
        for i in 0..200 {
            let v = value(g.next(&ctx(i as f64), 1.0));
            assert!((v - prev).abs() <= 0.1 + 1e-12);
            prev = v;
        }
    }

    #[test]
    fn test_sine_peaks_and_zeroes() {
        let mut g = generator(GaugeAlgorithm::Sine {
            offset: 10.0,
            amplitude: 4.0,
            period_s: 100.0,
        });
        assert!((value(g.next(&ctx(0.0), 1.0)) - 10.0).abs() < 1e-9);
        assert!((value(g.next(&ctx(25.0), 1.0)) - 14.0).abs() < 1e-9);
        assert!((value(g.next(&ctx(75.0), 1.0)) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_bernoulli_only_zero_or_one() {
        let mut g = generator(GaugeAlgorithm::Bernoulli { p: 0.3 });
        let mut ones = 0u32;
        let n = 10_000;
        for i in 0..n {
            let v = value(g.next(&ctx(i as f64), 1.0));
            assert!(v == 0.0 || v == 1.0);
            if v == 1.0 {
                ones += 1;
            }
        }
        let rate = ones as f64 / n as f64;
        assert!((rate - 0.3).abs() < 0.02, "observed rate {rate}");
    }

    #[test]
    fn test_sawtooth_ramp() {
        let mut g = generator(GaugeAlgorithm::Sawtooth {
            min: 2.0,
            max: 12.0,
            period_s: 10.0,
        });
        assert_eq!(value(g.next(&ctx(0.0), 1.0)), 2.0);
        assert_eq!(value(g.next(&ctx(5.0), 1.0)), 7.0);
        // Wraps back at the period boundary.
        assert_eq!(value(g.next(&ctx(10.0), 1.0)), 2.0);
    }

    #[test]
    fn test_spike_rescales_without_disturbing_walk() {
        let algo = GaugeAlgorithm::RandomWalk {
            start: 1.0,
            step: 0.05,
            clamp_lo: None,
            clamp_hi: None,
        };
        let mut spiked = generator(algo.clone());
        let mut plain = generator(algo);

        for i in 0..10 {
            // Spike active on ticks 3..6.
            let m = if (3..6).contains(&i) { 2.5 } else { 1.0 };
            let s = value(spiked.next(&ctx(i as f64), m));
            let p = value(plain.next(&ctx(i as f64), 1.0));
            if (3..6).contains(&i) {
                assert!((s - p * 2.5).abs() < 1e-12);
            } else {
                // Outside the window the trajectories are identical.
                assert_eq!(s, p);
            }
        }
    }
}
