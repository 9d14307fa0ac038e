//! Conversion between runtime objects and container groups.
//!
//! Each persistable type writes itself into a [`Group`] tagged with its
//! `repr` attribute and reads itself back from one.
//!
//! # Histogram layout
//!
//! | child        | kind    | contents                                      |
//! |--------------|---------|-----------------------------------------------|
//! | `bins`       | f64     | internal-space edges (or centres), rank 1 or 2 |
//! | `counts`     | i64     | `[n_bins]`, or `[n_repeats, n_bins]`          |
//! | `log`        | f64     | scalar log base, absent when not logged       |
//! | `relativeTo` | f64     | scalar offset, absent means `0.0`             |

use super::native::{DeserializeError, ObjectTag};
use super::schema::{Attr, Dataset, Group, SchemaError};
use super::Persist;
use crate::distribution::{LogNormal, Normal};
use crate::histogram::{edges_from_centres, BinAxis, Histogram1D, LogBase};

fn check_repr(group: &Group, expected: ObjectTag) -> Result<(), DeserializeError> {
    let repr = group.repr().ok_or(DeserializeError::MissingRepr)?;
    let actual = ObjectTag::from_repr(repr).ok_or_else(|| DeserializeError::UnknownObject(repr.to_owned()))?;
    if actual != expected {
        return Err(DeserializeError::TypeMismatch { expected, actual });
    }
    Ok(())
}

fn scalar(group: &Group, name: &str) -> Result<f64, SchemaError> {
    group.dataset(name)?.first_f64()
}

fn optional_scalar(group: &Group, name: &str) -> Result<Option<f64>, SchemaError> {
    group
        .optional_dataset(name)?
        .map(Dataset::first_f64)
        .transpose()
}

// =============================================================================
// Histogram1D
// =============================================================================

impl Histogram1D {
    fn static_group(&self) -> Group {
        let mut group = Group::with_repr(ObjectTag::Histogram1D.repr());
        group.insert_dataset("bins", Dataset::vector_f64(self.bins().to_vec()));
        if let Some(log) = self.log() {
            group.insert_dataset("log", Dataset::scalar_f64(log.base()));
        }
        group.insert_dataset("relativeTo", Dataset::scalar_f64(self.relative_to()));
        group
    }

    /// Group with room for `n_repeats` histograms sharing these bins.
    ///
    /// Every count row starts out as `fill`; slots are written with
    /// [`write_group`](Self::write_group).
    pub fn create_group(&self, n_repeats: usize, fill: i64) -> Group {
        let mut group = self.static_group();
        group.insert_dataset("counts", Dataset::repeated_i64(n_repeats, self.n_bins(), fill));
        group
    }

    /// Write this histogram's counts into slot `index` of a group made by
    /// [`create_group`](Self::create_group).
    pub fn write_group(&self, group: &mut Group, index: usize) -> Result<(), SchemaError> {
        group.dataset_mut("counts")?.write_row_i64(index, self.counts())
    }

    /// Read the histogram in slot `index` of a repeated group.
    pub fn from_group_row(group: &Group, index: usize) -> Result<Self, DeserializeError> {
        read_histogram(group, Some(index))
    }
}

fn read_histogram(group: &Group, index: Option<usize>) -> Result<Histogram1D, DeserializeError> {
    check_repr(group, ObjectTag::Histogram1D)?;

    let bins = group.dataset("bins")?;
    let bins = match bins.rank() {
        1 => bins.as_f64()?,
        _ => bins.row_f64(0)?,
    };

    let counts = group.dataset("counts")?;
    let counts = match index {
        Some(i) => counts.row_i64(i)?,
        None if counts.rank() == 1 => counts.as_i64()?,
        None => {
            return Err(SchemaError::RankMismatch {
                expected: 1,
                actual: counts.rank(),
            }
            .into())
        }
    };

    let log = optional_scalar(group, "log")?.map(LogBase::from_base);
    let relative_to = optional_scalar(group, "relativeTo")?.unwrap_or(0.0);

    let edges = if bins.len() == counts.len() {
        edges_from_centres(bins)?
    } else {
        bins.to_vec()
    };
    let axis = BinAxis::from_internal_edges(edges, log, relative_to)?;
    Ok(Histogram1D::from_parts(axis, counts.to_vec())?)
}

impl Persist for Histogram1D {
    const TAG: ObjectTag = ObjectTag::Histogram1D;

    fn to_group(&self) -> Group {
        let mut group = self.static_group();
        group.insert_dataset("counts", Dataset::vector_i64(self.counts().to_vec()));
        group
    }

    fn from_group(group: &Group) -> Result<Self, DeserializeError> {
        read_histogram(group, None)
    }
}

// =============================================================================
// Distributions
// =============================================================================

impl Persist for Normal {
    const TAG: ObjectTag = ObjectTag::Normal;

    fn to_group(&self) -> Group {
        let mut group = Group::with_repr(Self::TAG.repr());
        group.insert_dataset("mean", Dataset::scalar_f64(self.mean()));
        group.insert_dataset("std", Dataset::scalar_f64(self.std()));
        group
    }

    fn from_group(group: &Group) -> Result<Self, DeserializeError> {
        check_repr(group, Self::TAG)?;
        Ok(Normal::new(scalar(group, "mean")?, scalar(group, "std")?)?)
    }
}

impl Persist for LogNormal {
    const TAG: ObjectTag = ObjectTag::LogNormal;

    fn to_group(&self) -> Group {
        let mut group = Group::with_repr(Self::TAG.repr());
        group.set_attr("linearSpace", i64::from(self.linear_space()));
        group.insert_dataset("mean", Dataset::scalar_f64(self.log_mean()));
        group.insert_dataset("variance", Dataset::scalar_f64(self.variance()));
        group
    }

    fn from_group(group: &Group) -> Result<Self, DeserializeError> {
        check_repr(group, Self::TAG)?;
        let linear_space = match group.attr("linearSpace") {
            None => false,
            Some(Attr::I64(v)) => *v != 0,
            Some(other) => {
                return Err(DeserializeError::CorruptPayload(format!(
                    "linearSpace must be an integer, got {other:?}"
                )))
            }
        };
        Ok(LogNormal::from_log_mean(
            scalar(group, "mean")?,
            scalar(group, "variance")?,
            linear_space,
        )?)
    }
}
