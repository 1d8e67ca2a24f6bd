//! Synthetic Metrics Load Generator
//!
//! Generates deterministic, configurable streams of synthetic metrics
//! (counters, gauges, histograms, summaries) across expanded label
//! spaces, and exports them through pull and push sinks simultaneously.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! config → labelspace → registry → engine → export (pull + push)
//!                           ↓         ↑  ↓
//!                      generators   spike  monitor
//! ```
//!
//! # Design Principles
//!
//! - **Deterministic**: Same config and seed, same value stream, on any
//!   machine
//! - **Bounded cardinality**: Label spaces are expanded up front under an
//!   explicit series cap
//! - **Exporters agree**: Every sink receives the same observations; a
//!   failing sink is counted, never allowed to stall generation
//! - **Live control**: Spikes and log levels change at runtime without
//!   touching generator state
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synthload::{
//!     config::Config,
//!     engine::{SystemClock, TickEngine, DEFAULT_QUEUE_CAPACITY},
//!     export::PullRegistry,
//!     monitor::SelfMonitor,
//!     registry::SeriesRegistry,
//!     spike::SpikeController,
//! };
//!
//! let config = Config::from_file("synthload.toml").unwrap();
//! let registry = SeriesRegistry::build(&config).unwrap();
//!
//! let spikes = Arc::new(SpikeController::new());
//! let monitor = SelfMonitor::new();
//! let mut engine = TickEngine::new(
//!     registry,
//!     Arc::clone(&spikes),
//!     monitor,
//!     Arc::new(SystemClock),
//!     config.global.tick_interval_s,
//! );
//!
//! let pull = PullRegistry::new(&config.exporters.prometheus.prefix);
//! engine.add_sink(Box::new(Arc::clone(&pull)), DEFAULT_QUEUE_CAPACITY);
//!
//! let handle = engine.handle();
//! ctrlc::set_handler(move || handle.stop()).unwrap();
//! engine.run();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod control;
pub mod engine;
pub mod export;
pub mod generators;
pub mod labelspace;
pub mod monitor;
pub mod registry;
pub mod spike;

// Re-export commonly used types at crate root
pub use config::{Config, ConfigError};
pub use engine::{EngineHandle, EngineState, TickEngine};
pub use export::{ExporterSink, Observation, PullRegistry, PushSink};
pub use monitor::{SelfMonitor, StatusSnapshot};
pub use registry::SeriesRegistry;
pub use spike::SpikeController;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
