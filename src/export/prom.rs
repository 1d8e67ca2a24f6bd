//! Pull-style exposition sink.
//!
//! Generated values arrive as complete cumulative states, so the usual
//! increment-oriented metric handles do not fit. The registry instead
//! keeps the latest value per series and renders the standard text
//! exposition from protobuf metric families on demand.

use crate::export::{ExportError, ExporterSink, LabelSet, Observation};
use crate::generators::MetricValue;
use prometheus::proto;
use prometheus::{Encoder, TextEncoder};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Latest state of every series of one metric.
struct FamilyState {
    kind: &'static str,
    series: BTreeMap<LabelSet, MetricValue>,
}

/// Holds the most recent observation per series and encodes them in
/// Prometheus text format for scrapes.
pub struct PullRegistry {
    prefix: String,
    families: Mutex<BTreeMap<String, FamilyState>>,
}

fn kind_of(value: &MetricValue) -> &'static str {
    match value {
        MetricValue::Counter { .. } => "counter",
        MetricValue::Gauge { .. } => "gauge",
        MetricValue::Histogram { .. } => "histogram",
        MetricValue::Summary { .. } => "summary",
    }
}

impl PullRegistry {
    pub fn new(prefix: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            prefix: prefix.into(),
            families: Mutex::new(BTreeMap::new()),
        })
    }

    /// Renders all stored series in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = self.families.lock().expect("registry lock poisoned");
        let mut rendered = Vec::with_capacity(families.len());
        for (name, state) in families.iter() {
            rendered.push(encode_family(&self.prefix, name, state));
        }
        drop(families);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&rendered, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl ExporterSink for PullRegistry {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn record(&self, observation: &Observation) -> Result<(), ExportError> {
        let kind = kind_of(&observation.value);
        let mut families = self.families.lock().expect("registry lock poisoned");
        let state = families
            .entry(observation.metric.clone())
            .or_insert_with(|| FamilyState {
                kind,
                series: BTreeMap::new(),
            });
        if state.kind != kind {
            return Err(ExportError::Rejected {
                sink: "prometheus".to_string(),
                reason: format!(
                    "metric '{}' changed kind from {} to {}",
                    observation.metric, state.kind, kind
                ),
            });
        }
        state
            .series
            .insert(Arc::clone(&observation.labels), observation.value.clone());
        Ok(())
    }
}

impl ExporterSink for Arc<PullRegistry> {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn record(&self, observation: &Observation) -> Result<(), ExportError> {
        (**self).record(observation)
    }
}

fn encode_family(prefix: &str, name: &str, state: &FamilyState) -> proto::MetricFamily {
    let mut family = proto::MetricFamily::default();
    family.set_name(format!("{prefix}{name}"));
    family.set_help(format!("Synthetic {} series", state.kind));
    family.set_field_type(match state.kind {
        "counter" => proto::MetricType::COUNTER,
        "gauge" => proto::MetricType::GAUGE,
        "histogram" => proto::MetricType::HISTOGRAM,
        _ => proto::MetricType::SUMMARY,
    });

    for (labels, value) in state.series.iter() {
        let mut metric = proto::Metric::default();
        for (label_name, label_value) in labels.iter() {
            let mut pair = proto::LabelPair::default();
            pair.set_name(label_name.clone());
            pair.set_value(label_value.clone());
            metric.mut_label().push(pair);
        }
        match value {
            MetricValue::Counter { cumulative } => {
                let mut counter = proto::Counter::default();
                counter.set_value(*cumulative);
                metric.set_counter(counter);
            }
            MetricValue::Gauge { value } => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(*value);
                metric.set_gauge(gauge);
            }
            MetricValue::Histogram {
                bounds,
                bucket_counts,
                sum,
                count,
            } => {
                let mut histogram = proto::Histogram::default();
                histogram.set_sample_sum(*sum);
                histogram.set_sample_count(*count);
                // Finite bounds only: the text encoder synthesizes the
                // canonical `le="+Inf"` line from sample_count when no
                // infinite bound is present.
                let mut cumulative = 0u64;
                for (bound, bucket) in bounds.iter().zip(bucket_counts.iter()) {
                    cumulative += bucket;
                    let mut proto_bucket = proto::Bucket::default();
                    proto_bucket.set_upper_bound(*bound);
                    proto_bucket.set_cumulative_count(cumulative);
                    histogram.mut_bucket().push(proto_bucket);
                }
                metric.set_histogram(histogram);
            }
            MetricValue::Summary {
                quantiles,
                sum,
                count,
            } => {
                let mut summary = proto::Summary::default();
                summary.set_sample_sum(*sum);
                summary.set_sample_count(*count);
                for (quantile, estimate) in quantiles.iter() {
                    let mut proto_quantile = proto::Quantile::default();
                    proto_quantile.set_quantile(*quantile);
                    proto_quantile.set_value(*estimate);
                    summary.mut_quantile().push(proto_quantile);
                }
                metric.set_summary(summary);
            }
        }
        family.mut_metric().push(metric);
    }

    family
}
