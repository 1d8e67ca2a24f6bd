//! Live behavioral overrides ("spikes").
//!
//! A spike multiplies a metric's generated values for a bounded window.
//! The registry is read by every generator on every tick and written only
//! by the control surface, so it sits behind a single `RwLock` with short
//! critical sections. A new spike on a metric replaces any previous one
//! (last-write-wins); expired entries are evicted lazily on lookup.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest accepted spike duration, in seconds (one year). Bounds the
/// request domain well below where `Duration` and `Instant` arithmetic
/// stop being representable.
pub const MAX_SPIKE_DURATION_S: f64 = 31_536_000.0;

/// Errors reported to control-surface callers. These never affect
/// generation state.
#[derive(Debug, Clone, Error)]
pub enum SpikeRequestError {
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("multiplier must be a finite non-negative number, got {0}")]
    InvalidMultiplier(f64),
    #[error("duration must be positive and at most {max}s, got {0}s", max = MAX_SPIKE_DURATION_S)]
    InvalidDuration(f64),
}

/// One active override.
#[derive(Debug, Clone)]
struct SpikeState {
    multiplier: f64,
    activated_at: Instant,
    duration: Duration,
}

impl SpikeState {
    fn expiry(&self) -> Option<Instant> {
        self.activated_at.checked_add(self.duration)
    }

    /// Active on `[activated_at, activated_at + duration)`. A duration
    /// whose expiry is not representable never arrives.
    fn is_active(&self, now: Instant) -> bool {
        if now < self.activated_at {
            return false;
        }
        match self.expiry() {
            Some(expiry) => now < expiry,
            None => true,
        }
    }
}

/// A description of one non-expired spike, for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSpike {
    pub metric: String,
    pub multiplier: f64,
    pub remaining_s: f64,
}

/// Registry of active spikes keyed by base metric name.
#[derive(Debug, Default)]
pub struct SpikeController {
    spikes: RwLock<HashMap<String, SpikeState>>,
}

impl SpikeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the spike for a metric, activating it now.
    pub fn activate(&self, metric: &str, multiplier: f64, duration: Duration) {
        self.activate_at(metric, multiplier, duration, Instant::now());
    }

    /// Installs or replaces the spike with an explicit activation time.
    pub fn activate_at(&self, metric: &str, multiplier: f64, duration: Duration, now: Instant) {
        let mut spikes = self.spikes.write().expect("spike lock poisoned");
        let replaced = spikes
            .insert(
                metric.to_string(),
                SpikeState {
                    multiplier,
                    activated_at: now,
                    duration,
                },
            )
            .is_some();
        tracing::info!(
            metric,
            multiplier,
            duration_s = duration.as_secs_f64(),
            replaced,
            "spike activated"
        );
    }

    /// Returns the active multiplier for a metric, or 1 if none.
    ///
    /// An expired entry is removed on the way out so the map does not
    /// accumulate dead spikes between control requests.
    pub fn active_multiplier(&self, metric: &str, now: Instant) -> f64 {
        {
            let spikes = self.spikes.read().expect("spike lock poisoned");
            match spikes.get(metric) {
                Some(state) if state.is_active(now) => return state.multiplier,
                Some(_) => {}
                None => return 1.0,
            }
        }

        // Expired: re-check under the write lock before evicting, the
        // control surface may have replaced the entry in between.
        let mut spikes = self.spikes.write().expect("spike lock poisoned");
        if let Some(state) = spikes.get(metric) {
            if state.is_active(now) {
                return state.multiplier;
            }
            spikes.remove(metric);
            tracing::debug!(metric, "expired spike evicted");
        }
        1.0
    }

    /// Describes all non-expired spikes.
    pub fn snapshot(&self, now: Instant) -> Vec<ActiveSpike> {
        let spikes = self.spikes.read().expect("spike lock poisoned");
        let mut out: Vec<ActiveSpike> = spikes
            .iter()
            .filter(|(_, state)| state.is_active(now))
            .map(|(metric, state)| ActiveSpike {
                metric: metric.clone(),
                multiplier: state.multiplier,
                remaining_s: match state.expiry() {
                    Some(expiry) => expiry.saturating_duration_since(now).as_secs_f64(),
                    None => f64::INFINITY,
                },
            })
            .collect();
        out.sort_by(|a, b| a.metric.cmp(&b.metric));
        out
    }
}

/// Validates a spike request from the control surface.
pub fn validate_request(multiplier: f64, duration_s: f64) -> Result<Duration, SpikeRequestError> {
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(SpikeRequestError::InvalidMultiplier(multiplier));
    }
    // The negation also rejects NaN.
    if !(duration_s > 0.0 && duration_s <= MAX_SPIKE_DURATION_S) {
        return Err(SpikeRequestError::InvalidDuration(duration_s));
    }
    Ok(Duration::from_secs_f64(duration_s))
}
