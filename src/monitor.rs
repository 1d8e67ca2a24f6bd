//! Engine self-monitoring.
//!
//! Tracks the generator's own health (points emitted, export errors, tick
//! durations, active series, export queue depth) and exposes it two ways:
//! as ordinary observations pushed through the same sink path as generated
//! metrics, and as a structured snapshot for the control surface.

use crate::export::Observation;
use crate::generators::MetricValue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Tick duration histogram bounds, in seconds.
const TICK_DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Outcome of one completed tick, consumed immediately by the monitor.
#[derive(Debug, Clone)]
pub struct TickResult {
    pub tick_index: u64,
    pub timestamp: DateTime<Utc>,
    pub series_updated: usize,
    pub duration: Duration,
    pub export_errors: u64,
}

/// Structured status for the control surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSnapshot {
    pub uptime_s: f64,
    pub tick_count: u64,
    pub active_metrics: usize,
    pub total_series: usize,
    pub available_metrics: Vec<String>,
    pub points_total: u64,
    pub export_errors_total: u64,
}

/// Histogram accumulation for tick durations.
#[derive(Debug, Default)]
struct DurationHist {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

/// Counters and gauges describing the engine's own behavior.
///
/// Shared between the tick loop (writes), export workers (error counts)
/// and the control surface (reads); individual fields sit behind short
/// mutexed sections.
pub struct SelfMonitor {
    started_at: Instant,
    tick_count: AtomicU64,
    points: Mutex<BTreeMap<String, u64>>,
    errors: Mutex<BTreeMap<(String, String), u64>>,
    tick_durations: Mutex<DurationHist>,
    active_series: Mutex<BTreeMap<String, usize>>,
    queue_depth: Mutex<BTreeMap<String, usize>>,
}

impl SelfMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started_at: Instant::now(),
            tick_count: AtomicU64::new(0),
            points: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(BTreeMap::new()),
            tick_durations: Mutex::new(DurationHist {
                counts: vec![0; TICK_DURATION_BUCKETS.len() + 1],
                ..Default::default()
            }),
            active_series: Mutex::new(BTreeMap::new()),
            queue_depth: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn set_active_series(&self, metric: &str, count: usize) {
        self.active_series
            .lock()
            .expect("monitor lock poisoned")
            .insert(metric.to_string(), count);
    }

    pub fn record_points(&self, metric: &str, count: u64) {
        *self
            .points
            .lock()
            .expect("monitor lock poisoned")
            .entry(metric.to_string())
            .or_insert(0) += count;
    }

    pub fn record_export_error(&self, exporter: &str, metric: &str) {
        *self
            .errors
            .lock()
            .expect("monitor lock poisoned")
            .entry((exporter.to_string(), metric.to_string()))
            .or_insert(0) += 1;
    }

    pub fn set_queue_depth(&self, exporter: &str, depth: usize) {
        self.queue_depth
            .lock()
            .expect("monitor lock poisoned")
            .insert(exporter.to_string(), depth);
    }

    /// Consumes one tick's result.
    pub fn complete_tick(&self, result: &TickResult) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let seconds = result.duration.as_secs_f64();
        let mut hist = self.tick_durations.lock().expect("monitor lock poisoned");
        let idx = TICK_DURATION_BUCKETS.partition_point(|&b| b < seconds);
        hist.counts[idx] += 1;
        hist.sum += seconds;
        hist.count += 1;

        if result.tick_index % 60 == 0 {
            tracing::info!(
                tick = result.tick_index,
                series = result.series_updated,
                duration_ms = seconds * 1e3,
                errors = result.export_errors,
                "tick completed"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Builds the structured status for the control surface.
    pub fn status(&self) -> StatusSnapshot {
        let active = self.active_series.lock().expect("monitor lock poisoned");
        let points = self.points.lock().expect("monitor lock poisoned");
        let errors = self.errors.lock().expect("monitor lock poisoned");
        StatusSnapshot {
            uptime_s: self.uptime().as_secs_f64(),
            tick_count: self.tick_count(),
            active_metrics: active.len(),
            total_series: active.values().sum(),
            available_metrics: active.keys().cloned().collect(),
            points_total: points.values().sum(),
            export_errors_total: errors.values().sum(),
        }
    }

    /// Renders the monitor's state as ordinary observations, fed through
    /// the same exporter path as generated metrics.
    pub fn emit(&self, timestamp: DateTime<Utc>) -> Vec<Observation> {
        let mut out = Vec::new();

        for (metric, total) in self.points.lock().expect("monitor lock poisoned").iter() {
            out.push(observation(
                "gen_points_total",
                vec![("metric_name".to_string(), metric.clone())],
                MetricValue::Counter {
                    cumulative: *total as f64,
                },
                timestamp,
            ));
        }

        for ((exporter, metric), total) in self.errors.lock().expect("monitor lock poisoned").iter()
        {
            out.push(observation(
                "gen_export_errors_total",
                vec![
                    ("exporter".to_string(), exporter.clone()),
                    ("metric_name".to_string(), metric.clone()),
                ],
                MetricValue::Counter {
                    cumulative: *total as f64,
                },
                timestamp,
            ));
        }

        {
            let hist = self.tick_durations.lock().expect("monitor lock poisoned");
            if hist.count > 0 {
                out.push(observation(
                    "gen_tick_duration_seconds",
                    vec![],
                    MetricValue::Histogram {
                        bounds: Arc::new(TICK_DURATION_BUCKETS.to_vec()),
                        bucket_counts: hist.counts.clone(),
                        sum: hist.sum,
                        count: hist.count,
                    },
                    timestamp,
                ));
            }
        }

        for (metric, count) in self
            .active_series
            .lock()
            .expect("monitor lock poisoned")
            .iter()
        {
            out.push(observation(
                "gen_active_series",
                vec![("metric_name".to_string(), metric.clone())],
                MetricValue::Gauge {
                    value: *count as f64,
                },
                timestamp,
            ));
        }

        for (exporter, depth) in self.queue_depth.lock().expect("monitor lock poisoned").iter() {
            out.push(observation(
                "gen_export_queue_depth",
                vec![("exporter".to_string(), exporter.clone())],
                MetricValue::Gauge {
                    value: *depth as f64,
                },
                timestamp,
            ));
        }

        out
    }
}

fn observation(
    metric: &str,
    labels: Vec<(String, String)>,
    value: MetricValue,
    timestamp: DateTime<Utc>,
) -> Observation {
    Observation {
        metric: metric.to_string(),
        labels: Arc::new(labels),
        value,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(index: u64, millis: u64) -> TickResult {
        TickResult {
            tick_index: index,
            timestamp: Utc::now(),
            series_updated: 10,
            duration: Duration::from_millis(millis),
            export_errors: 0,
        }
    }

    #[test]
    fn test_status_aggregates_state() {
        let monitor = SelfMonitor::new();
        monitor.set_active_series("a", 3);
        monitor.set_active_series("b", 7);
        monitor.record_points("a", 3);
        monitor.record_points("a", 3);
        monitor.record_export_error("push", "b");
        monitor.complete_tick(&tick(0, 2));
        monitor.complete_tick(&tick(1, 2));

        let status = monitor.status();
        assert_eq!(status.tick_count, 2);
        assert_eq!(status.active_metrics, 2);
        assert_eq!(status.total_series, 10);
        assert_eq!(status.points_total, 6);
        assert_eq!(status.export_errors_total, 1);
        assert_eq!(status.available_metrics, vec!["a", "b"]);
    }

    #[test]
    fn test_emit_covers_all_self_metrics() {
        let monitor = SelfMonitor::new();
        monitor.set_active_series("a", 3);
        monitor.record_points("a", 3);
        monitor.record_export_error("push", "a");
        monitor.set_queue_depth("push", 2);
        monitor.complete_tick(&tick(0, 1));

        let observations = monitor.emit(Utc::now());
        let names: Vec<&str> = observations.iter().map(|o| o.metric.as_str()).collect();
        assert!(names.contains(&"gen_points_total"));
        assert!(names.contains(&"gen_export_errors_total"));
        assert!(names.contains(&"gen_tick_duration_seconds"));
        assert!(names.contains(&"gen_active_series"));
        assert!(names.contains(&"gen_export_queue_depth"));
    }

    #[test]
    fn test_tick_duration_histogram_consistent() {
        let monitor = SelfMonitor::new();
        for millis in [1, 3, 20, 700, 5000] {
            monitor.complete_tick(&tick(0, millis));
        }
        let observations = monitor.emit(Utc::now());
        let hist = observations
            .iter()
            .find(|o| o.metric == "gen_tick_duration_seconds")
            .unwrap();
        match &hist.value {
            MetricValue::Histogram {
                bucket_counts,
                count,
                ..
            } => {
                assert_eq!(*count, 5);
                assert_eq!(bucket_counts.iter().sum::<u64>(), 5);
                // 5s tick lands in the implicit +Inf bucket.
                assert_eq!(*bucket_counts.last().unwrap(), 1);
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }
}
