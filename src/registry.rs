//! Series registry: the fixed set of generated series for a run.
//!
//! Built once at startup from the configured profiles and metric
//! definitions. The topology (which series exist) never changes during a
//! run; only per-series generator state mutates, and only from the tick
//! loop, so the registry needs no locking.

use crate::config::Config;
use crate::export::LabelSet;
use crate::generators::{build_generator, derive_series_seed, MetricValue, TickContext, ValueGenerator};
use crate::labelspace::{build_label_space, CardinalityError};
use std::sync::Arc;
use thiserror::Error;

/// Errors while building the registry. Fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Cardinality(#[from] CardinalityError),
    #[error("metric '{metric}' references undefined profile '{profile}'")]
    UnknownProfile { metric: String, profile: String },
}

/// One series: a label tuple plus its stateful generator.
struct Series {
    labels: LabelSet,
    generator: Box<dyn ValueGenerator>,
}

/// All series of one metric.
pub struct MetricSeries {
    name: String,
    kind: &'static str,
    series: Vec<Series>,
}

impl MetricSeries {
    /// Base metric name, unprefixed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric kind ("counter", "gauge", "histogram", "summary").
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Generates this tick's value for every series of the metric.
    pub fn generate(
        &mut self,
        ctx: &TickContext,
        multiplier: f64,
    ) -> Vec<(LabelSet, MetricValue)> {
        self.series
            .iter_mut()
            .map(|s| (Arc::clone(&s.labels), s.generator.next(ctx, multiplier)))
            .collect()
    }
}

/// Owns every series and generator for the lifetime of a run.
pub struct SeriesRegistry {
    metrics: Vec<MetricSeries>,
}

impl SeriesRegistry {
    /// Expands all label spaces and instantiates one seeded generator per
    /// series.
    pub fn build(config: &Config) -> Result<Self, RegistryError> {
        let seed = config.global.seed;
        let mut metrics = Vec::with_capacity(config.metrics.len());

        for def in &config.metrics {
            let profile =
                config
                    .profiles
                    .get(&def.profile)
                    .ok_or_else(|| RegistryError::UnknownProfile {
                        metric: def.name.clone(),
                        profile: def.profile.clone(),
                    })?;

            let space = build_label_space(profile, &def.labels, seed, &def.name)?;

            let series = (0..space.len())
                .map(|i| {
                    let tuple = &space.tuples()[i];
                    let series_seed = derive_series_seed(seed, &def.name, tuple);
                    Series {
                        labels: Arc::new(space.labels_for(i)),
                        generator: build_generator(def, series_seed),
                    }
                })
                .collect::<Vec<_>>();

            tracing::info!(
                metric = %def.name,
                kind = def.shape.kind_name(),
                series = series.len(),
                full_cardinality = space.full_cardinality(),
                profile = %def.profile,
                "metric registered"
            );

            metrics.push(MetricSeries {
                name: def.name.clone(),
                kind: def.shape.kind_name(),
                series,
            });
        }

        Ok(Self { metrics })
    }

    pub fn metrics(&self) -> &[MetricSeries] {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut [MetricSeries] {
        &mut self.metrics
    }

    /// Base names of all registered metrics.
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.metrics.iter().any(|m| m.name == metric)
    }

    pub fn total_series(&self) -> usize {
        self.metrics.iter().map(|m| m.series.len()).sum()
    }
}
