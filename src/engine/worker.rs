//! Per-exporter export workers.
//!
//! Each sink gets one worker thread behind a bounded channel. The tick
//! loop hands a whole tick's observations to each worker without
//! blocking; single-producer/single-consumer FIFO delivery preserves
//! per-series tick order at every sink. A full queue means the exporter
//! cannot keep up — the batch is dropped and counted as an export error
//! rather than stalling generation.

use crate::export::{ExportError, ExporterSink, Observation};
use crate::monitor::SelfMonitor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Metric label used when an error applies to a whole batch rather than
/// one observation.
const BATCH_METRIC: &str = "_batch";

/// Handle to one sink's worker thread.
pub struct ExportWorker {
    name: String,
    tx: Option<SyncSender<Vec<Observation>>>,
    depth: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl ExportWorker {
    /// Spawns the worker thread for a sink.
    pub fn spawn(
        sink: Box<dyn ExporterSink>,
        queue_capacity: usize,
        monitor: Arc<SelfMonitor>,
    ) -> Self {
        let name = sink.name().to_string();
        let depth = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = sync_channel::<Vec<Observation>>(queue_capacity);

        let thread_name = format!("export-{name}");
        let worker_name = name.clone();
        let worker_depth = Arc::clone(&depth);
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                while let Ok(batch) = rx.recv() {
                    worker_depth.fetch_sub(1, Ordering::Relaxed);
                    for observation in &batch {
                        if let Err(e) = sink.record(observation) {
                            tracing::warn!(
                                sink = %worker_name,
                                metric = %observation.metric,
                                error = %e,
                                "observation dropped"
                            );
                            monitor.record_export_error(&worker_name, &observation.metric);
                        }
                    }
                    if let Err(e) = sink.flush() {
                        tracing::warn!(sink = %worker_name, error = %e, "flush failed");
                        monitor.record_export_error(&worker_name, BATCH_METRIC);
                    }
                }
                tracing::debug!(sink = %worker_name, "export worker stopped");
            })
            .expect("failed to spawn export worker");

        Self {
            name,
            tx: Some(tx),
            depth,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Batches queued but not yet processed.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Queues one tick's observations without blocking.
    pub fn enqueue(&self, batch: Vec<Observation>) -> Result<(), ExportError> {
        let tx = self.tx.as_ref().ok_or_else(|| ExportError::Transport {
            sink: self.name.clone(),
            reason: "worker shut down".to_string(),
        })?;
        match tx.try_send(batch) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ExportError::QueueFull {
                sink: self.name.clone(),
            }),
            Err(TrySendError::Disconnected(_)) => Err(ExportError::Transport {
                sink: self.name.clone(),
                reason: "worker thread exited".to_string(),
            }),
        }
    }

    /// Drains the queue and joins the worker thread.
    pub fn shutdown(mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(sink = %self.name, "export worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::MetricValue;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Sink that records everything it sees.
    struct CapturingSink {
        seen: Arc<Mutex<Vec<Observation>>>,
    }

    impl ExporterSink for CapturingSink {
        fn name(&self) -> &str {
            "capture"
        }

        fn record(&self, observation: &Observation) -> Result<(), ExportError> {
            self.seen
                .lock()
                .expect("test lock poisoned")
                .push(observation.clone());
            Ok(())
        }
    }

    fn observation(metric: &str, value: f64) -> Observation {
        Observation {
            metric: metric.to_string(),
            labels: Arc::new(vec![]),
            value: MetricValue::Gauge { value },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_observations_delivered_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let monitor = SelfMonitor::new();
        let worker = ExportWorker::spawn(
            Box::new(CapturingSink {
                seen: Arc::clone(&seen),
            }),
            8,
            monitor,
        );

        for tick in 0..5 {
            worker
                .enqueue((0..3).map(|i| observation("m", (tick * 3 + i) as f64)).collect())
                .unwrap();
        }
        worker.shutdown();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 15);
        for (i, obs) in seen.iter().enumerate() {
            assert_eq!(obs.value, MetricValue::Gauge { value: i as f64 });
        }
    }

    #[test]
    fn test_failing_sink_counts_errors() {
        struct FailingSink;
        impl ExporterSink for FailingSink {
            fn name(&self) -> &str {
                "failing"
            }
            fn record(&self, _observation: &Observation) -> Result<(), ExportError> {
                Err(ExportError::Transport {
                    sink: "failing".to_string(),
                    reason: "backend down".to_string(),
                })
            }
        }

        let monitor = SelfMonitor::new();
        let worker = ExportWorker::spawn(Box::new(FailingSink), 8, Arc::clone(&monitor));
        worker.enqueue(vec![observation("m", 1.0)]).unwrap();
        worker.shutdown();

        assert_eq!(monitor.status().export_errors_total, 1);
    }
}
