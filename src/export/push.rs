//! Push-style batch sink.
//!
//! Observations accumulate within a tick and are posted as one JSON batch
//! on flush. The worker thread owns the sink, so a blocking client with a
//! hard request timeout is enough to keep a slow receiver from stalling
//! generation.

use crate::config::PushExporterConfig;
use crate::export::{ExportError, ExporterSink, Observation};
use crate::generators::MetricValue;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Mutex;
use std::time::Duration;

/// Posts each tick's observations as a JSON batch to a configured URL.
pub struct PushSink {
    endpoint: String,
    prefix: String,
    client: Client,
    pending: Mutex<Vec<serde_json::Value>>,
}

impl PushSink {
    pub fn new(config: &PushExporterConfig) -> Result<Self, ExportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ExportError::Rejected {
                    sink: "push".to_string(),
                    reason: format!("invalid header name '{name}': {e}"),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ExportError::Rejected {
                sink: "push".to_string(),
                reason: format!("invalid header value for '{name:?}': {e}"),
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_s))
            .default_headers(headers)
            .build()
            .map_err(|e| ExportError::Transport {
                sink: "push".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            prefix: config.prefix.clone(),
            client,
            pending: Mutex::new(Vec::new()),
        })
    }
}

impl ExporterSink for PushSink {
    fn name(&self) -> &str {
        "push"
    }

    fn record(&self, observation: &Observation) -> Result<(), ExportError> {
        let encoded = encode(&self.prefix, observation);
        self.pending
            .lock()
            .expect("push buffer lock poisoned")
            .push(encoded);
        Ok(())
    }

    fn flush(&self) -> Result<(), ExportError> {
        let batch: Vec<serde_json::Value> = {
            let mut pending = self.pending.lock().expect("push buffer lock poisoned");
            if pending.is_empty() {
                return Ok(());
            }
            pending.drain(..).collect()
        };

        let body = serde_json::json!({ "metrics": batch });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| ExportError::Transport {
                sink: "push".to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ExportError::Rejected {
                sink: "push".to_string(),
                reason: format!("receiver returned {}", response.status()),
            });
        }
        tracing::trace!(batch = batch.len(), "batch pushed");
        Ok(())
    }
}

/// Renders one observation as its wire JSON object.
fn encode(prefix: &str, observation: &Observation) -> serde_json::Value {
    let labels: serde_json::Map<String, serde_json::Value> = observation
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let name = format!("{prefix}{}", observation.metric);
    let timestamp = observation.timestamp.to_rfc3339();

    match &observation.value {
        MetricValue::Counter { cumulative } => serde_json::json!({
            "name": name,
            "kind": "counter",
            "labels": labels,
            "timestamp": timestamp,
            "value": cumulative,
        }),
        MetricValue::Gauge { value } => serde_json::json!({
            "name": name,
            "kind": "gauge",
            "labels": labels,
            "timestamp": timestamp,
            "value": value,
        }),
        MetricValue::Histogram {
            bounds,
            bucket_counts,
            sum,
            count,
        } => {
            let buckets: Vec<serde_json::Value> = bounds
                .iter()
                .map(|b| serde_json::Value::from(*b))
                .chain(std::iter::once(serde_json::Value::String(
                    "+Inf".to_string(),
                )))
                .zip(bucket_counts.iter())
                .map(|(le, c)| serde_json::json!({ "le": le, "count": c }))
                .collect();
            serde_json::json!({
                "name": name,
                "kind": "histogram",
                "labels": labels,
                "timestamp": timestamp,
                "buckets": buckets,
                "sum": sum,
                "count": count,
            })
        }
        MetricValue::Summary {
            quantiles,
            sum,
            count,
        } => {
            let quantiles: Vec<serde_json::Value> = quantiles
                .iter()
                .map(|(q, v)| serde_json::json!({ "quantile": q, "value": v }))
                .collect();
            serde_json::json!({
                "name": name,
                "kind": "summary",
                "labels": labels,
                "timestamp": timestamp,
                "quantiles": quantiles,
                "sum": sum,
                "count": count,
            })
        }
    }
}
