//! The tick engine: scheduling loop and export fan-out.
//!
//! A single generation thread walks the series registry once per tick,
//! forwards the collected observations to every export worker, and records
//! the tick into the self-monitor. If a tick overruns the configured
//! interval the next tick fires immediately; there is no catch-up backlog.
//! A stop request is observed at the next tick boundary, so a tick in
//! flight always completes and no partial tick reaches an exporter.

mod clock;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use worker::ExportWorker;

use crate::export::{ExporterSink, Observation};
use crate::generators::TickContext;
use crate::monitor::{SelfMonitor, TickResult};
use crate::registry::SeriesRegistry;
use crate::spike::SpikeController;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on each exporter's batch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => EngineState::Idle,
            1 => EngineState::Running,
            2 => EngineState::Stopping,
            _ => EngineState::Stopped,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Cloneable handle for observing and stopping a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    state: Arc<AtomicU8>,
    stop: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Requests a stop. Takes effect at the next tick boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            EngineState::Running as u8,
            EngineState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        tracing::info!("engine stop requested");
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// The generation scheduler.
pub struct TickEngine {
    registry: SeriesRegistry,
    spikes: Arc<SpikeController>,
    monitor: Arc<SelfMonitor>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    tick_interval_s: f64,
    workers: Vec<ExportWorker>,
    state: Arc<AtomicU8>,
    stop: Arc<AtomicBool>,
    tick_index: u64,
}

impl TickEngine {
    pub fn new(
        registry: SeriesRegistry,
        spikes: Arc<SpikeController>,
        monitor: Arc<SelfMonitor>,
        clock: Arc<dyn Clock>,
        tick_interval_s: f64,
    ) -> Self {
        for metric in registry.metrics() {
            monitor.set_active_series(metric.name(), metric.series_count());
        }
        Self {
            registry,
            spikes,
            monitor,
            clock,
            interval: Duration::from_secs_f64(tick_interval_s),
            tick_interval_s,
            workers: Vec::new(),
            state: Arc::new(AtomicU8::new(EngineState::Idle as u8)),
            stop: Arc::new(AtomicBool::new(false)),
            tick_index: 0,
        }
    }

    /// Attaches a sink behind its own bounded-queue worker.
    pub fn add_sink(&mut self, sink: Box<dyn ExporterSink>, queue_capacity: usize) {
        let worker = ExportWorker::spawn(sink, queue_capacity, Arc::clone(&self.monitor));
        tracing::info!(sink = worker.name(), queue_capacity, "exporter attached");
        self.workers.push(worker);
    }

    /// Returns a handle for stopping the engine from another thread.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            state: Arc::clone(&self.state),
            stop: Arc::clone(&self.stop),
        }
    }

    /// Runs the tick loop until a stop is requested, then drains the
    /// export workers and returns.
    pub fn run(mut self) {
        self.state
            .store(EngineState::Running as u8, Ordering::SeqCst);
        tracing::info!(
            interval_s = self.tick_interval_s,
            series = self.registry.total_series(),
            exporters = self.workers.len(),
            "engine running"
        );

        while !self.stop.load(Ordering::SeqCst) {
            let tick_start = self.clock.now_instant();
            self.tick_once();
            let elapsed = self
                .clock
                .now_instant()
                .saturating_duration_since(tick_start);
            if elapsed >= self.interval {
                tracing::warn!(
                    tick = self.tick_index - 1,
                    elapsed_ms = elapsed.as_secs_f64() * 1e3,
                    interval_ms = self.interval.as_secs_f64() * 1e3,
                    "tick overran interval, firing next tick immediately"
                );
            } else {
                self.clock.sleep(self.interval - elapsed);
            }
        }

        self.state
            .store(EngineState::Stopping as u8, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            worker.shutdown();
        }
        self.state
            .store(EngineState::Stopped as u8, Ordering::SeqCst);
        tracing::info!(ticks = self.tick_index, "engine stopped");
    }

    /// Executes exactly one tick: generate, fan out, account.
    fn tick_once(&mut self) {
        let tick_start = self.clock.now_instant();
        let timestamp = self.clock.now_utc();
        let ctx = TickContext {
            tick_index: self.tick_index,
            t_s: self.clock.unix_seconds(),
            tick_interval_s: self.tick_interval_s,
        };

        let mut observations: Vec<Observation> = Vec::new();
        for metric in self.registry.metrics_mut() {
            let multiplier = self.spikes.active_multiplier(metric.name(), tick_start);
            if multiplier != 1.0 {
                tracing::debug!(
                    metric = metric.name(),
                    multiplier,
                    tick = ctx.tick_index,
                    "spike active"
                );
            }
            let points = metric.generate(&ctx, multiplier);
            self.monitor
                .record_points(metric.name(), points.len() as u64);
            let name = metric.name().to_string();
            observations.extend(points.into_iter().map(|(labels, value)| Observation {
                metric: name.clone(),
                labels,
                value,
                timestamp,
            }));
        }

        observations.extend(self.monitor.emit(timestamp));
        let series_updated = observations.len();

        let mut enqueue_errors = 0u64;
        for worker in &self.workers {
            if let Err(e) = worker.enqueue(observations.clone()) {
                enqueue_errors += 1;
                tracing::warn!(sink = worker.name(), error = %e, "tick batch dropped");
                self.monitor.record_export_error(worker.name(), "_batch");
            }
            self.monitor
                .set_queue_depth(worker.name(), worker.queue_depth());
        }

        let duration = self
            .clock
            .now_instant()
            .saturating_duration_since(tick_start);
        self.monitor.complete_tick(&TickResult {
            tick_index: self.tick_index,
            timestamp,
            series_updated,
            duration,
            export_errors: enqueue_errors,
        });
        self.tick_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::export::{ExportError, ExporterSink};
    use crate::generators::MetricValue;
    use std::sync::Mutex;

    const CONFIG: &str = r#"
[global]
tick_interval_s = 1.0
seed = 42
log_level = "info"
control_port = 8081

[profiles.small]
labels = [{ name = "region", values = ["us", "eu"] }]

[[metrics]]
name = "requests"
profile = "small"
kind = "counter"
algorithm = "constant"
increment = 1.0

[[metrics]]
name = "temperature"
profile = "small"
kind = "gauge"
algorithm = "sine"
offset = 10.0
amplitude = 5.0
period_s = 60.0
"#;

    struct CapturingSink {
        name: String,
        seen: Arc<Mutex<Vec<Observation>>>,
    }

    impl ExporterSink for CapturingSink {
        fn name(&self) -> &str {
            &self.name
        }
        fn record(&self, observation: &Observation) -> Result<(), ExportError> {
            self.seen
                .lock()
                .expect("test lock poisoned")
                .push(observation.clone());
            Ok(())
        }
    }

    fn engine_with_capture(
        clock: Arc<ManualClock>,
    ) -> (TickEngine, Arc<SpikeController>, Arc<Mutex<Vec<Observation>>>) {
        let config = Config::from_toml(CONFIG).unwrap();
        let registry = SeriesRegistry::build(&config).unwrap();
        let spikes = Arc::new(SpikeController::new());
        let monitor = SelfMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine = TickEngine::new(
            registry,
            Arc::clone(&spikes),
            monitor,
            clock,
            config.global.tick_interval_s,
        );
        engine.add_sink(
            Box::new(CapturingSink {
                name: "capture".to_string(),
                seen: Arc::clone(&seen),
            }),
            DEFAULT_QUEUE_CAPACITY,
        );
        (engine, spikes, seen)
    }

    fn run_ticks(engine: &mut TickEngine, clock: &ManualClock, n: usize) {
        for _ in 0..n {
            engine.tick_once();
            clock.advance(Duration::from_secs(1));
        }
    }

    fn drain(engine: TickEngine, seen: &Arc<Mutex<Vec<Observation>>>) -> Vec<Observation> {
        for worker in engine.workers.into_iter() {
            worker.shutdown();
        }
        seen.lock().unwrap().clone()
    }

    #[test]
    fn test_two_runs_are_identical() {
        let clock_a = Arc::new(ManualClock::new(1_700_000_000.0));
        let clock_b = Arc::new(ManualClock::new(1_700_000_000.0));
        let (mut a, _, seen_a) = engine_with_capture(Arc::clone(&clock_a));
        let (mut b, _, seen_b) = engine_with_capture(Arc::clone(&clock_b));

        run_ticks(&mut a, &clock_a, 10);
        run_ticks(&mut b, &clock_b, 10);
        let obs_a = drain(a, &seen_a);
        let obs_b = drain(b, &seen_b);

        assert!(!obs_a.is_empty());
        assert_eq!(obs_a.len(), obs_b.len());
        for (x, y) in obs_a.iter().zip(obs_b.iter()) {
            assert_eq!(x.metric, y.metric);
            assert_eq!(x.labels, y.labels);
            assert_eq!(x.timestamp, y.timestamp);
            // The queue-depth gauge samples a counter the worker thread
            // drains concurrently; its identity is stable, its sampled
            // value is not.
            if x.metric != "gen_export_queue_depth" {
                assert_eq!(x.value, y.value);
            }
        }
    }

    #[test]
    fn test_constant_counter_five_ticks() {
        let clock = Arc::new(ManualClock::new(1_700_000_000.0));
        let (mut engine, _, seen) = engine_with_capture(Arc::clone(&clock));
        run_ticks(&mut engine, &clock, 5);
        let observations = drain(engine, &seen);

        // After 5 ticks at increment 1, every counter series reads 5.
        let finals: Vec<&Observation> = observations
            .iter()
            .filter(|o| o.metric == "requests")
            .collect();
        assert_eq!(finals.len(), 10); // 2 series x 5 ticks
        for obs in finals.iter().rev().take(2) {
            assert_eq!(obs.value, MetricValue::Counter { cumulative: 5.0 });
        }
    }

    #[test]
    fn test_spike_window_scales_gauge_exactly() {
        let clock_a = Arc::new(ManualClock::new(1_700_000_000.0));
        let clock_b = Arc::new(ManualClock::new(1_700_000_000.0));
        let (mut spiked, spikes, seen_a) = engine_with_capture(Arc::clone(&clock_a));
        let (mut plain, _, seen_b) = engine_with_capture(Arc::clone(&clock_b));

        for i in 0..10 {
            if i == 3 {
                spikes.activate_at(
                    "temperature",
                    2.0,
                    Duration::from_secs(4),
                    clock_a.now_instant(),
                );
            }
            spiked.tick_once();
            plain.tick_once();
            clock_a.advance(Duration::from_secs(1));
            clock_b.advance(Duration::from_secs(1));
        }
        let obs_a: Vec<Observation> = drain(spiked, &seen_a)
            .into_iter()
            .filter(|o| o.metric == "temperature")
            .collect();
        let obs_b: Vec<Observation> = drain(plain, &seen_b)
            .into_iter()
            .filter(|o| o.metric == "temperature")
            .collect();
        assert_eq!(obs_a.len(), 20); // 2 series x 10 ticks

        for (i, (a, b)) in obs_a.iter().zip(obs_b.iter()).enumerate() {
            let tick = i / 2;
            let (va, vb) = match (&a.value, &b.value) {
                (MetricValue::Gauge { value: va }, MetricValue::Gauge { value: vb }) => (va, vb),
                other => panic!("unexpected values: {other:?}"),
            };
            if (3..7).contains(&tick) {
                assert!((va - vb * 2.0).abs() < 1e-9, "tick {tick} not scaled");
            } else {
                // Including tick 7, the exact expiry boundary.
                assert_eq!(va, vb, "tick {tick} should be unspiked");
            }
        }
    }

    #[test]
    fn test_self_metrics_flow_through_sink() {
        let clock = Arc::new(ManualClock::new(1_700_000_000.0));
        let (mut engine, _, seen) = engine_with_capture(Arc::clone(&clock));
        run_ticks(&mut engine, &clock, 2);
        let observations = drain(engine, &seen);

        assert!(observations.iter().any(|o| o.metric == "gen_points_total"));
        assert!(observations.iter().any(|o| o.metric == "gen_active_series"));
    }

    #[test]
    fn test_stop_is_observed_and_workers_drain() {
        let config = Config::from_toml(CONFIG).unwrap();
        let registry = SeriesRegistry::build(&config).unwrap();
        let monitor = SelfMonitor::new();
        let mut engine = TickEngine::new(
            registry,
            Arc::new(SpikeController::new()),
            Arc::clone(&monitor),
            Arc::new(SystemClock),
            0.001,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        engine.add_sink(
            Box::new(CapturingSink {
                name: "capture".to_string(),
                seen: Arc::clone(&seen),
            }),
            DEFAULT_QUEUE_CAPACITY,
        );
        let handle = engine.handle();
        assert_eq!(handle.state(), EngineState::Idle);

        let join = std::thread::spawn(move || engine.run());
        std::thread::sleep(Duration::from_millis(50));
        handle.stop();
        join.join().unwrap();

        assert_eq!(handle.state(), EngineState::Stopped);
        assert!(monitor.tick_count() > 0);
        assert!(!seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_full_queue_counts_as_export_error() {
        struct BlockingSink {
            gate: Arc<Mutex<()>>,
        }
        impl ExporterSink for BlockingSink {
            fn name(&self) -> &str {
                "blocking"
            }
            fn record(&self, _observation: &Observation) -> Result<(), ExportError> {
                let _guard = self.gate.lock().expect("test lock poisoned");
                Ok(())
            }
        }

        let gate = Arc::new(Mutex::new(()));
        let monitor = SelfMonitor::new();
        let worker = ExportWorker::spawn(
            Box::new(BlockingSink {
                gate: Arc::clone(&gate),
            }),
            1,
            Arc::clone(&monitor),
        );

        let observation = Observation {
            metric: "m".to_string(),
            labels: Arc::new(vec![]),
            value: MetricValue::Gauge { value: 1.0 },
            timestamp: chrono::Utc::now(),
        };

        let held = gate.lock().unwrap();
        let results: Vec<_> = (0..3)
            .map(|_| worker.enqueue(vec![observation.clone()]))
            .collect();
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(ExportError::QueueFull { .. }))),
            "bounded queue never filled"
        );
        drop(held);
        worker.shutdown();
    }
}
