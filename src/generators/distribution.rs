//! Histogram and summary observation generation.

use super::quantile::P2Quantile;
use super::sampler;
use super::{MetricValue, TickContext, ValueGenerator};
use crate::config::{ComponentDist, DistributionAlgorithm, Objective};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

/// Per-kind accumulation state.
enum Accumulation {
    /// Finite bucket upper bounds plus per-bucket counts; the final count
    /// slot is the implicit +Inf bucket.
    Histogram {
        bounds: Arc<Vec<f64>>,
        counts: Vec<u64>,
    },
    /// One streaming estimator per declared objective.
    Summary { estimators: Vec<P2Quantile> },
}

/// Draws one observation per tick from a configured distribution and
/// accumulates it into histogram buckets or summary quantile estimators.
pub struct DistributionGenerator {
    algorithm: DistributionAlgorithm,
    rng: ChaCha20Rng,
    acc: Accumulation,
    sum: f64,
    count: u64,
}

impl DistributionGenerator {
    pub fn histogram(algorithm: DistributionAlgorithm, bounds: Vec<f64>, rng: ChaCha20Rng) -> Self {
        let counts = vec![0u64; bounds.len() + 1];
        Self {
            algorithm,
            rng,
            acc: Accumulation::Histogram {
                bounds: Arc::new(bounds),
                counts,
            },
            sum: 0.0,
            count: 0,
        }
    }

    pub fn summary(
        algorithm: DistributionAlgorithm,
        objectives: Vec<Objective>,
        rng: ChaCha20Rng,
    ) -> Self {
        let estimators = objectives
            .iter()
            .map(|o| P2Quantile::new(o.quantile))
            .collect();
        Self {
            algorithm,
            rng,
            acc: Accumulation::Summary { estimators },
            sum: 0.0,
            count: 0,
        }
    }

    fn draw(&mut self) -> f64 {
        match &self.algorithm {
            DistributionAlgorithm::Lognormal { mu, sigma } => {
                sampler::lognormal(&mut self.rng, *mu, *sigma)
            }
            DistributionAlgorithm::Exponential { lambda } => {
                sampler::exponential(&mut self.rng, *lambda)
            }
            DistributionAlgorithm::Mixture { components } => {
                // One uniform for component choice, then that component's
                // draw.
                let u = sampler::uniform_open01(&mut self.rng);
                let mut cumulative = 0.0;
                let chosen = components
                    .iter()
                    .find(|c| {
                        cumulative += c.weight;
                        u < cumulative
                    })
                    .unwrap_or_else(|| components.last().expect("validated non-empty"));
                match &chosen.dist {
                    ComponentDist::Lognormal { mu, sigma } => {
                        sampler::lognormal(&mut self.rng, *mu, *sigma)
                    }
                    ComponentDist::Exponential { lambda } => {
                        sampler::exponential(&mut self.rng, *lambda)
                    }
                }
            }
        }
    }
}

impl ValueGenerator for DistributionGenerator {
    fn next(&mut self, _ctx: &TickContext, multiplier: f64) -> MetricValue {
        // Spike scales the draw; the accumulated state never shrinks.
        let x = self.draw() * multiplier;
        self.sum += x;
        self.count += 1;

        match &mut self.acc {
            Accumulation::Histogram { bounds, counts } => {
                // Smallest bound >= x; past the last bound lands in +Inf.
                let idx = bounds.partition_point(|&b| b < x);
                counts[idx] += 1;
                MetricValue::Histogram {
                    bounds: Arc::clone(bounds),
                    bucket_counts: counts.clone(),
                    sum: self.sum,
                    count: self.count,
                }
            }
            Accumulation::Summary { estimators } => {
                for est in estimators.iter_mut() {
                    est.observe(x);
                }
                MetricValue::Summary {
                    quantiles: estimators.iter().map(|e| (e.quantile(), e.value())).collect(),
                    sum: self.sum,
                    count: self.count,
                }
            }
        }
    }
}
