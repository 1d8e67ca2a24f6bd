//! Generator configuration.
//!
//! The configuration is loaded from TOML and fully validated before the
//! engine starts. Algorithm parameters are modeled as a closed set of
//! tagged variants per metric kind, so an illegal kind/algorithm pairing
//! cannot be represented at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tolerance when checking that mixture weights sum to 1.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Configuration validation errors. All of these are fatal at startup;
/// generation never begins with an invalid configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
    #[error("no metrics defined")]
    NoMetrics,
    #[error("duplicate metric name: {0}")]
    DuplicateMetric(String),
    #[error("metric '{metric}' references undefined profile '{profile}'")]
    UnknownProfile { metric: String, profile: String },
    #[error("metric '{metric}': {reason}")]
    InvalidParameter { metric: String, reason: String },
    #[error("profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },
    #[error("invalid global setting: {0}")]
    InvalidGlobal(String),
}

/// Specification of one label's value set.
///
/// Either an explicit ordered list of values, or a numeric range with a
/// format rule. Resolution to concrete strings happens in
/// [`crate::labelspace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSpec {
    /// Label name (must be exposition-safe).
    pub name: String,
    /// Explicit ordered values.
    #[serde(default)]
    pub values: Option<Vec<String>>,
    /// Inclusive numeric range `[start, end]`.
    #[serde(default)]
    pub range: Option<[i64; 2]>,
    /// Format rule for range values, e.g. `"i-%02d"` or `"shard-{}"`.
    #[serde(default)]
    pub fmt: Option<String>,
}

/// How to select series when the full label space exceeds the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Keep the first N tuples in enumeration order.
    #[default]
    FirstN,
    /// Keep the N tuples with the lowest seeded hash rank, spread across
    /// all label dimensions.
    Hash,
}

/// A named label space shared between metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Labels in declaration order. The last label varies fastest during
    /// enumeration.
    pub labels: Vec<LabelSpec>,
    /// Maximum number of series; `None` means unbounded.
    #[serde(default)]
    pub series_cap: Option<usize>,
    #[serde(default)]
    pub sampling_strategy: SamplingStrategy,
}

/// Counter increment algorithms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum CounterAlgorithm {
    /// Poisson-distributed increments with optional diurnal modulation.
    Poisson {
        base_rate: f64,
        #[serde(default)]
        diurnal_amp: f64,
    },
    /// Fixed increment per tick.
    Constant { increment: f64 },
}

/// Gauge value algorithms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum GaugeAlgorithm {
    /// Clamped random walk starting at `start`.
    RandomWalk {
        start: f64,
        step: f64,
        #[serde(default)]
        clamp_lo: Option<f64>,
        #[serde(default)]
        clamp_hi: Option<f64>,
    },
    /// `offset + amplitude * sin(2pi * t / period_s)`.
    Sine {
        offset: f64,
        amplitude: f64,
        period_s: f64,
    },
    /// 1 with probability `p`, else 0.
    Bernoulli { p: f64 },
    /// Linear ramp from `min` to `max` repeating every `period_s`.
    Sawtooth { min: f64, max: f64, period_s: f64 },
}

/// One component of a mixture distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixtureComponent {
    pub weight: f64,
    #[serde(flatten)]
    pub dist: ComponentDist,
}

/// Distribution of a mixture component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum ComponentDist {
    Lognormal { mu: f64, sigma: f64 },
    Exponential { lambda: f64 },
}

/// Observation distributions for histograms and summaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum DistributionAlgorithm {
    Lognormal { mu: f64, sigma: f64 },
    Exponential { lambda: f64 },
    Mixture { components: Vec<MixtureComponent> },
}

/// A summary quantile objective: estimate `quantile` within `error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Objective {
    pub quantile: f64,
    pub error: f64,
}

/// Metric kind plus its algorithm and kind-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricShape {
    Counter {
        #[serde(flatten)]
        algorithm: CounterAlgorithm,
    },
    Gauge {
        #[serde(flatten)]
        algorithm: GaugeAlgorithm,
    },
    Histogram {
        /// Upper bounds of the finite buckets, strictly increasing.
        /// A `+Inf` bucket is implicit.
        buckets: Vec<f64>,
        #[serde(flatten)]
        algorithm: DistributionAlgorithm,
    },
    Summary {
        #[serde(default)]
        objectives: Vec<Objective>,
        #[serde(flatten)]
        algorithm: DistributionAlgorithm,
    },
}

impl MetricShape {
    /// Exposition kind name, used in logs and status output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MetricShape::Counter { .. } => "counter",
            MetricShape::Gauge { .. } => "gauge",
            MetricShape::Histogram { .. } => "histogram",
            MetricShape::Summary { .. } => "summary",
        }
    }
}

/// Definition of one generated metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Base metric name, unprefixed. Exporters apply their own prefixes.
    pub name: String,
    /// Name of the profile whose label space this metric uses.
    pub profile: String,
    /// Extra labels multiplied into the profile's space.
    #[serde(default)]
    pub labels: Vec<LabelSpec>,
    #[serde(flatten)]
    pub shape: MetricShape,
}

/// Global engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Seconds between ticks.
    pub tick_interval_s: f64,
    /// Seed for all deterministic generation.
    pub seed: u64,
    /// Initial log level filter.
    pub log_level: String,
    /// Port for the control API.
    pub control_port: u16,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            tick_interval_s: 1.0,
            seed: 42,
            log_level: "info".to_string(),
            control_port: 8081,
        }
    }
}

/// Pull (exposition) exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusExporterConfig {
    pub enabled: bool,
    pub port: u16,
    pub prefix: String,
    pub bind_address: String,
}

impl Default for PrometheusExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            prefix: "prom_".to_string(),
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Push exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushExporterConfig {
    pub enabled: bool,
    /// Target URL for batch POSTs.
    pub endpoint: String,
    pub prefix: String,
    /// Per-request timeout. A slow receiver becomes an export error, not
    /// a stalled tick.
    pub timeout_s: f64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for PushExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:4318/v1/metrics".to_string(),
            prefix: "push_".to_string(),
            timeout_s: 5.0,
            headers: BTreeMap::new(),
        }
    }
}

/// Settings for all exporters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportersConfig {
    #[serde(default)]
    pub prometheus: PrometheusExporterConfig,
    #[serde(default)]
    pub push: PushExporterConfig,
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub exporters: ExportersConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the entire configuration tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.global.tick_interval_s.is_finite() && self.global.tick_interval_s > 0.0) {
            return Err(ConfigError::InvalidGlobal(format!(
                "tick_interval_s must be positive, got {}",
                self.global.tick_interval_s
            )));
        }

        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }

        for (name, profile) in &self.profiles {
            if profile.series_cap == Some(0) {
                return Err(ConfigError::InvalidProfile {
                    profile: name.clone(),
                    reason: "series_cap must be a positive integer".to_string(),
                });
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.name.as_str()) {
                return Err(ConfigError::DuplicateMetric(metric.name.clone()));
            }
            if !self.profiles.contains_key(&metric.profile) {
                return Err(ConfigError::UnknownProfile {
                    metric: metric.name.clone(),
                    profile: metric.profile.clone(),
                });
            }
            validate_shape(&metric.name, &metric.shape)?;
        }

        Ok(())
    }

    /// Looks up a metric definition by base name.
    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

fn invalid(metric: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        metric: metric.to_string(),
        reason: reason.into(),
    }
}

fn validate_shape(metric: &str, shape: &MetricShape) -> Result<(), ConfigError> {
    match shape {
        MetricShape::Counter { algorithm } => match algorithm {
            CounterAlgorithm::Poisson {
                base_rate,
                diurnal_amp,
            } => {
                if !(base_rate.is_finite() && *base_rate >= 0.0) {
                    return Err(invalid(metric, "base_rate must be non-negative"));
                }
                if !diurnal_amp.is_finite() {
                    return Err(invalid(metric, "diurnal_amp must be finite"));
                }
            }
            CounterAlgorithm::Constant { increment } => {
                if !(increment.is_finite() && *increment >= 0.0) {
                    return Err(invalid(metric, "increment must be non-negative"));
                }
            }
        },
        MetricShape::Gauge { algorithm } => match algorithm {
            GaugeAlgorithm::RandomWalk {
                start,
                step,
                clamp_lo,
                clamp_hi,
            } => {
                if !start.is_finite() || !(step.is_finite() && *step >= 0.0) {
                    return Err(invalid(metric, "random_walk start/step out of domain"));
                }
                if let (Some(lo), Some(hi)) = (clamp_lo, clamp_hi) {
                    if lo > hi {
                        return Err(invalid(metric, "clamp_lo must not exceed clamp_hi"));
                    }
                }
            }
            GaugeAlgorithm::Sine {
                offset,
                amplitude,
                period_s,
            } => {
                if !offset.is_finite() || !amplitude.is_finite() {
                    return Err(invalid(metric, "sine offset/amplitude must be finite"));
                }
                if !(period_s.is_finite() && *period_s > 0.0) {
                    return Err(invalid(metric, "sine period_s must be positive"));
                }
            }
            GaugeAlgorithm::Bernoulli { p } => {
                if !(p.is_finite() && (0.0..=1.0).contains(p)) {
                    return Err(invalid(metric, "bernoulli p must be in [0, 1]"));
                }
            }
            GaugeAlgorithm::Sawtooth { min, max, period_s } => {
                if min > max {
                    return Err(invalid(metric, "sawtooth min must not exceed max"));
                }
                if !(period_s.is_finite() && *period_s > 0.0) {
                    return Err(invalid(metric, "sawtooth period_s must be positive"));
                }
            }
        },
        MetricShape::Histogram { buckets, algorithm } => {
            validate_buckets(metric, buckets)?;
            validate_distribution(metric, algorithm)?;
        }
        MetricShape::Summary {
            objectives,
            algorithm,
        } => {
            for obj in objectives {
                if !(obj.quantile > 0.0 && obj.quantile < 1.0) {
                    return Err(invalid(metric, "objective quantile must be in (0, 1)"));
                }
                if !(obj.error > 0.0 && obj.error < 1.0) {
                    return Err(invalid(metric, "objective error must be in (0, 1)"));
                }
            }
            validate_distribution(metric, algorithm)?;
        }
    }
    Ok(())
}

fn validate_buckets(metric: &str, buckets: &[f64]) -> Result<(), ConfigError> {
    if buckets.is_empty() {
        return Err(invalid(metric, "buckets must not be empty"));
    }
    for pair in buckets.windows(2) {
        if !(pair[0] < pair[1]) {
            return Err(invalid(metric, "buckets must be strictly increasing"));
        }
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(invalid(metric, "buckets must be finite"));
    }
    Ok(())
}

fn validate_distribution(metric: &str, algo: &DistributionAlgorithm) -> Result<(), ConfigError> {
    match algo {
        DistributionAlgorithm::Lognormal { mu, sigma } => {
            if !mu.is_finite() || !(sigma.is_finite() && *sigma > 0.0) {
                return Err(invalid(metric, "lognormal sigma must be positive"));
            }
        }
        DistributionAlgorithm::Exponential { lambda } => {
            if !(lambda.is_finite() && *lambda > 0.0) {
                return Err(invalid(metric, "exponential lambda must be positive"));
            }
        }
        DistributionAlgorithm::Mixture { components } => {
            if components.is_empty() {
                return Err(invalid(metric, "mixture must have at least one component"));
            }
            let mut sum = 0.0;
            for c in components {
                if !(c.weight.is_finite() && c.weight > 0.0) {
                    return Err(invalid(metric, "mixture weights must be positive"));
                }
                sum += c.weight;
                match &c.dist {
                    ComponentDist::Lognormal { mu, sigma } => {
                        if !mu.is_finite() || !(sigma.is_finite() && *sigma > 0.0) {
                            return Err(invalid(metric, "mixture lognormal sigma must be positive"));
                        }
                    }
                    ComponentDist::Exponential { lambda } => {
                        if !(lambda.is_finite() && *lambda > 0.0) {
                            return Err(invalid(metric, "mixture exponential lambda must be positive"));
                        }
                    }
                }
            }
            if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
                return Err(invalid(metric, format!("mixture weights sum to {sum}, expected 1")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(metric_toml: &str) -> String {
        format!(
            r#"
[global]
tick_interval_s = 1.0
seed = 42
log_level = "info"
control_port = 8081

[profiles.basic]
series_cap = 10
labels = [{{ name = "region", values = ["us", "eu"] }}]

{metric_toml}
"#
        )
    }

    #[test]
    fn test_parse_counter_poisson() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "http_requests"
profile = "basic"
kind = "counter"
algorithm = "poisson"
base_rate = 5.0
diurnal_amp = 0.3
"#,
        );
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.metrics.len(), 1);
        match &config.metrics[0].shape {
            MetricShape::Counter {
                algorithm: CounterAlgorithm::Poisson {
                    base_rate,
                    diurnal_amp,
                },
            } => {
                assert_eq!(*base_rate, 5.0);
                assert_eq!(*diurnal_amp, 0.3);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parse_histogram_with_buckets() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "latency"
profile = "basic"
kind = "histogram"
algorithm = "lognormal"
mu = 0.0
sigma = 1.0
buckets = [0.005, 0.01, 0.05, 0.1, 1.0]
"#,
        );
        let config = Config::from_toml(&toml).unwrap();
        match &config.metrics[0].shape {
            MetricShape::Histogram { buckets, .. } => assert_eq!(buckets.len(), 5),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_parse_mixture_summary() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "queue_wait"
profile = "basic"
kind = "summary"
algorithm = "mixture"
objectives = [{ quantile = 0.5, error = 0.05 }, { quantile = 0.99, error = 0.001 }]
components = [
  { weight = 0.7, dist = "lognormal", mu = 0.0, sigma = 0.5 },
  { weight = 0.3, dist = "exponential", lambda = 2.0 },
]
"#,
        );
        let config = Config::from_toml(&toml).unwrap();
        match &config.metrics[0].shape {
            MetricShape::Summary {
                objectives,
                algorithm: DistributionAlgorithm::Mixture { components },
            } => {
                assert_eq!(objectives.len(), 2);
                assert_eq!(components.len(), 2);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "m"
profile = "missing"
kind = "gauge"
algorithm = "bernoulli"
p = 0.5
"#,
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn test_duplicate_metric_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "m"
profile = "basic"
kind = "counter"
algorithm = "constant"
increment = 1.0

[[metrics]]
name = "m"
profile = "basic"
kind = "counter"
algorithm = "constant"
increment = 2.0
"#,
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::DuplicateMetric(_))
        ));
    }

    #[test]
    fn test_negative_sigma_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "latency"
profile = "basic"
kind = "histogram"
algorithm = "lognormal"
mu = 0.0
sigma = -1.0
buckets = [0.1, 1.0]
"#,
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_empty_buckets_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "latency"
profile = "basic"
kind = "histogram"
algorithm = "exponential"
lambda = 1.0
buckets = []
"#,
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_mixture_weights_must_sum_to_one() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "latency"
profile = "basic"
kind = "histogram"
algorithm = "mixture"
buckets = [0.1, 1.0]
components = [
  { weight = 0.5, dist = "exponential", lambda = 1.0 },
  { weight = 0.2, dist = "exponential", lambda = 2.0 },
]
"#,
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_bad_bernoulli_p_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "flag"
profile = "basic"
kind = "gauge"
algorithm = "bernoulli"
p = 1.5
"#,
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_zero_series_cap_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "m"
profile = "basic"
kind = "counter"
algorithm = "constant"
increment = 1.0
"#,
        )
        .replace("series_cap = 10", "series_cap = 0");
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let toml = minimal_config(
            r#"
[[metrics]]
name = "m"
profile = "basic"
kind = "counter"
algorithm = "constant"
increment = 1.0
"#,
        )
        .replace("tick_interval_s = 1.0", "tick_interval_s = 0.0");
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::InvalidGlobal(_))
        ));
    }
}
