//! Exporter sink contract and implementations.
//!
//! The engine forwards every observation to each configured sink through
//! the [`ExporterSink`] trait. Both shipped sinks (the pull-style
//! exposition registry and the push-style batch poster) receive the exact
//! same (name, labels, value, timestamp) tuples; any name prefixing is a
//! sink-local concern.

mod prom;
mod push;
mod server;

pub use prom::PullRegistry;
pub use push::PushSink;
pub use server::{serve_metrics, MetricsServerConfig, ServerError};

use crate::generators::MetricValue;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Shared, immutable label pairs of one series.
pub type LabelSet = Arc<Vec<(String, String)>>;

/// Errors from a sink call. Always recovered: logged and counted, never
/// allowed to abort a tick.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("sink '{sink}' rejected observation: {reason}")]
    Rejected { sink: String, reason: String },
    #[error("sink '{sink}' transport failure: {reason}")]
    Transport { sink: String, reason: String },
    #[error("export queue for '{sink}' is full")]
    QueueFull { sink: String },
}

/// One generated data point, as handed to every sink.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Base metric name, unprefixed.
    pub metric: String,
    pub labels: LabelSet,
    pub value: MetricValue,
    pub timestamp: DateTime<Utc>,
}

/// Destination for generated observations.
///
/// Implementations must tolerate being retried with an identical
/// observation; the engine itself never retries within a tick.
pub trait ExporterSink: Send {
    /// Short identifier used in logs and self-metrics.
    fn name(&self) -> &str;

    /// Records one observation. Must return within a bounded time; a
    /// slow or failing backend becomes an [`ExportError`].
    fn record(&self, observation: &Observation) -> Result<(), ExportError>;

    /// Flushes any batching at the end of a tick.
    fn flush(&self) -> Result<(), ExportError> {
        Ok(())
    }
}
