//! Per-series value generation.
//!
//! Every series owns one stateful generator, seeded deterministically from
//! (global seed, metric name, label tuple) so that a run is byte-for-byte
//! reproducible and no two series share a draw sub-sequence. Draws go
//! through ChaCha20 rather than a platform-default RNG so sequences match
//! across architectures and library versions.
//!
//! Spike multipliers scale the *draw* for counters, histograms and
//! summaries (the accumulated state stays monotonic for any multiplier
//! >= 0) and rescale the output for gauges (the nominal walk state is
//! unaffected, so values return exactly to baseline when a spike expires).

mod counter;
mod distribution;
mod gauge;
mod quantile;
mod sampler;

pub use counter::CounterGenerator;
pub use distribution::DistributionGenerator;
pub use gauge::GaugeGenerator;
pub use quantile::P2Quantile;

use crate::config::{MetricDefinition, MetricShape};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use std::sync::Arc;

/// Domain separator for series seed derivation.
const SEED_DOMAIN: &[u8] = b"synthload-series-seed-v1";

/// Separator between seed derivation inputs.
const SEED_SEPARATOR: u8 = 0x1f;

/// Timing inputs shared by every series within one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// Tick number, starting at 0.
    pub tick_index: u64,
    /// Seconds elapsed since the epoch anchor, identical across series so
    /// periodic algorithms stay phase-aligned.
    pub t_s: f64,
    /// Configured seconds between ticks.
    pub tick_interval_s: f64,
}

/// One generated value, shaped by metric kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Monotonic cumulative total.
    Counter { cumulative: f64 },
    /// Point-in-time value.
    Gauge { value: f64 },
    /// Per-bucket observation counts (last entry is the implicit +Inf
    /// bucket), with running sum and count. Bounds ride along so sinks
    /// can render exposition without consulting the configuration.
    Histogram {
        bounds: Arc<Vec<f64>>,
        bucket_counts: Vec<u64>,
        sum: f64,
        count: u64,
    },
    /// Estimated quantile values plus running sum and count.
    Summary {
        quantiles: Vec<(f64, f64)>,
        sum: f64,
        count: u64,
    },
}

/// A stateful per-series value algorithm.
pub trait ValueGenerator: Send {
    /// Produces this series' value for one tick. `multiplier` is the
    /// active spike multiplier for the metric (1 when none is active).
    fn next(&mut self, ctx: &TickContext, multiplier: f64) -> MetricValue;
}

/// Derives the ChaCha20 seed for one series.
pub fn derive_series_seed(global_seed: u64, metric: &str, tuple: &[String]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SEED_DOMAIN);
    hasher.update(&global_seed.to_le_bytes());
    hasher.update(metric.as_bytes());
    hasher.update(&[SEED_SEPARATOR]);
    for value in tuple {
        hasher.update(value.as_bytes());
        hasher.update(&[SEED_SEPARATOR]);
    }
    *hasher.finalize().as_bytes()
}

/// Builds the generator for one series of a metric.
///
/// The configuration has already been validated; kind/algorithm pairings
/// are fixed by the [`MetricShape`] variants themselves.
pub fn build_generator(def: &MetricDefinition, seed: [u8; 32]) -> Box<dyn ValueGenerator> {
    let rng = ChaCha20Rng::from_seed(seed);
    match &def.shape {
        MetricShape::Counter { algorithm } => {
            Box::new(CounterGenerator::new(algorithm.clone(), rng))
        }
        MetricShape::Gauge { algorithm } => Box::new(GaugeGenerator::new(algorithm.clone(), rng)),
        MetricShape::Histogram { buckets, algorithm } => Box::new(
            DistributionGenerator::histogram(algorithm.clone(), buckets.clone(), rng),
        ),
        MetricShape::Summary {
            objectives,
            algorithm,
        } => Box::new(DistributionGenerator::summary(
            algorithm.clone(),
            objectives.clone(),
            rng,
        )),
    }
}
