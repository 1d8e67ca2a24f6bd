//! Cartesian expansion and cap sampling.

use super::values::resolve_values;
use crate::config::{LabelSpec, Profile, SamplingStrategy};
use thiserror::Error;

/// Domain separator for sampling hashes.
/// Keeps tuple ranks distinct from generator seed derivation.
const SAMPLING_DOMAIN: &[u8] = b"synthload-sampling-v1";

/// Separator between tuple values inside the sampling hash input.
/// A control character cannot appear in exposition-safe label values.
const TUPLE_SEPARATOR: u8 = 0x1f;

/// Errors in label space construction. Fatal at startup.
#[derive(Debug, Clone, Error)]
pub enum CardinalityError {
    #[error("label '{0}' resolves to zero values")]
    EmptyLabel(String),
    #[error("label '{label}' has invalid range [{start}, {end}]")]
    InvalidRange { label: String, start: i64, end: i64 },
    #[error("label '{label}' has unsupported format rule '{fmt}'")]
    InvalidFormat { label: String, fmt: String },
}

/// The resolved series identity space for one metric.
///
/// Label names are shared across all tuples; `tuples[i]` holds the value
/// for `names[j]` at position `j`.
#[derive(Debug, Clone)]
pub struct LabelSpace {
    names: Vec<String>,
    tuples: Vec<Vec<String>>,
    full_cardinality: usize,
}

impl LabelSpace {
    /// Label names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Selected label-value tuples, in enumeration order.
    pub fn tuples(&self) -> &[Vec<String>] {
        &self.tuples
    }

    /// Number of selected series.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// True if no series were selected (only possible for an empty space).
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Cardinality of the uncapped space.
    pub fn full_cardinality(&self) -> usize {
        self.full_cardinality
    }

    /// Pairs names with the values of one tuple.
    pub fn labels_for(&self, index: usize) -> Vec<(String, String)> {
        self.names
            .iter()
            .cloned()
            .zip(self.tuples[index].iter().cloned())
            .collect()
    }
}

/// Builds the label space for one metric.
///
/// The profile's labels come first, followed by the metric's extra labels;
/// an extra label with the same name as a profile label replaces it in
/// place. Enumeration is odometer order: the last label varies fastest.
pub fn build_label_space(
    profile: &Profile,
    extra: &[LabelSpec],
    seed: u64,
    metric: &str,
) -> Result<LabelSpace, CardinalityError> {
    let mut specs: Vec<LabelSpec> = profile.labels.clone();
    for spec in extra {
        match specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec.clone(),
            None => specs.push(spec.clone()),
        }
    }

    let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
    let value_lists: Vec<Vec<String>> = specs
        .iter()
        .map(resolve_values)
        .collect::<Result<_, _>>()?;

    let full_cardinality = value_lists
        .iter()
        .map(|v| v.len())
        .try_fold(1usize, |acc, n| acc.checked_mul(n))
        .unwrap_or(usize::MAX);

    let cap = profile.series_cap.unwrap_or(usize::MAX);
    let tuples = match profile.sampling_strategy {
        SamplingStrategy::FirstN => enumerate(&value_lists, cap.min(full_cardinality)),
        SamplingStrategy::Hash if full_cardinality > cap => {
            sample_by_hash(&value_lists, cap, seed, metric)
        }
        SamplingStrategy::Hash => enumerate(&value_lists, full_cardinality),
    };

    tracing::debug!(
        metric,
        selected = tuples.len(),
        full_cardinality,
        "label space built"
    );

    Ok(LabelSpace {
        names,
        tuples,
        full_cardinality,
    })
}

/// Enumerates up to `limit` tuples in odometer order.
fn enumerate(value_lists: &[Vec<String>], limit: usize) -> Vec<Vec<String>> {
    if value_lists.is_empty() {
        // A label-free metric still has exactly one series.
        return vec![vec![]];
    }

    let mut out = Vec::with_capacity(limit.min(1024));
    let mut indices = vec![0usize; value_lists.len()];
    loop {
        if out.len() >= limit {
            break;
        }
        out.push(
            indices
                .iter()
                .zip(value_lists)
                .map(|(&i, values)| values[i].clone())
                .collect(),
        );
        // Advance the odometer, last position fastest.
        let mut pos = value_lists.len();
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < value_lists[pos].len() {
                break;
            }
            indices[pos] = 0;
        }
    }
    out
}

/// Keeps the `cap` tuples with the lowest seeded hash rank, then restores
/// enumeration order. Ranks are stable for a fixed seed, and raising the
/// cap can only add tuples to the selection.
fn sample_by_hash(
    value_lists: &[Vec<String>],
    cap: usize,
    seed: u64,
    metric: &str,
) -> Vec<Vec<String>> {
    let full = enumerate(value_lists, usize::MAX);
    let mut ranked: Vec<(u64, usize)> = full
        .iter()
        .enumerate()
        .map(|(i, tuple)| (tuple_rank(tuple, seed, metric), i))
        .collect();
    ranked.sort_unstable();
    ranked.truncate(cap);
    ranked.sort_unstable_by_key(|&(_, i)| i);
    ranked.into_iter().map(|(_, i)| full[i].clone()).collect()
}

/// 64-bit rank of one tuple under the sampling hash.
fn tuple_rank(tuple: &[String], seed: u64, metric: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SAMPLING_DOMAIN);
    hasher.update(&seed.to_le_bytes());
    hasher.update(metric.as_bytes());
    hasher.update(&[TUPLE_SEPARATOR]);
    for value in tuple {
        hasher.update(value.as_bytes());
        hasher.update(&[TUPLE_SEPARATOR]);
    }
    let mut out = [0u8; 8];
    hasher.finalize_xof().fill(&mut out);
    u64::from_le_bytes(out)
}
