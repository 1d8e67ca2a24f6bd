//! Label space expansion and cardinality control.
//!
//! A metric's series set is the Cartesian product of its label value
//! sequences, enumerated in declaration order with the last label varying
//! fastest (odometer order). When the product exceeds a profile's
//! `series_cap`, a sampling strategy selects a deterministic subset of
//! exactly `series_cap` tuples. The selection is stable across runs for a
//! fixed seed, which is what makes generated load reproducible.

mod space;
mod values;

pub use space::{build_label_space, CardinalityError, LabelSpace};
pub use values::resolve_values;
