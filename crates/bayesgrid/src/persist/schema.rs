//! Hierarchical container types: groups, datasets and attributes.
//!
//! A [`Group`] holds string attributes and named children, each either a
//! nested group or a [`Dataset`]. Datasets are typed arrays with an
//! explicit shape. A dataset whose leading dimension counts repeated slots
//! (for example one histogram per inversion chain) can be pre-allocated
//! with a fill value and then written and read one row at a time.
//!
//! All maps are `BTreeMap` so the serialized form is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Errors raised navigating or editing a container tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("no child named '{0}'")]
    Missing(String),

    #[error("'{0}' is not a group")]
    NotAGroup(String),

    #[error("'{0}' is not a dataset")]
    NotADataset(String),

    #[error("dataset holds {actual} values but shape {shape:?} needs {expected}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("expected {expected} data, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("expected a dataset of rank {expected}, found rank {actual}")]
    RankMismatch { expected: usize, actual: usize },

    #[error("row {index} out of bounds for {n_rows} rows")]
    RowOutOfBounds { index: usize, n_rows: usize },

    #[error("row holds {actual} values, expected {expected}")]
    RowLength { expected: usize, actual: usize },
}

// =============================================================================
// Attributes
// =============================================================================

/// Scalar metadata attached to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attr {
    Str(String),
    F64(f64),
    I64(i64),
}

impl From<&str> for Attr {
    fn from(value: &str) -> Self {
        Attr::Str(value.to_owned())
    }
}

impl From<f64> for Attr {
    fn from(value: f64) -> Self {
        Attr::F64(value)
    }
}

impl From<i64> for Attr {
    fn from(value: i64) -> Self {
        Attr::I64(value)
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// Typed flat storage of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Data {
    F64(Vec<f64>),
    I64(Vec<i64>),
}

impl Data {
    fn len(&self) -> usize {
        match self {
            Data::F64(v) => v.len(),
            Data::I64(v) => v.len(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Data::F64(_) => "f64",
            Data::I64(_) => "i64",
        }
    }
}

/// Row-major n-dimensional array.
///
/// Deserialization goes through [`Dataset::new`], so a loaded dataset always
/// holds exactly as many values as its shape describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    shape: Vec<usize>,
    data: Data,
}

/// Wire form of a [`Dataset`] before the shape is checked.
#[derive(Deserialize)]
struct RawDataset {
    shape: Vec<usize>,
    data: Data,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = SchemaError;

    fn try_from(raw: RawDataset) -> Result<Self, Self::Error> {
        Dataset::new(raw.shape, raw.data)
    }
}

impl Dataset {
    /// Dataset with an explicit shape; an empty shape is a scalar.
    pub fn new(shape: Vec<usize>, data: Data) -> Result<Self, SchemaError> {
        let actual = data.len();
        let expected = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        match expected {
            Some(expected) if expected == actual => Ok(Self { shape, data }),
            Some(expected) => Err(SchemaError::ShapeMismatch {
                shape,
                expected,
                actual,
            }),
            None => Err(SchemaError::ShapeMismatch {
                shape,
                expected: usize::MAX,
                actual,
            }),
        }
    }

    pub fn scalar_f64(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: Data::F64(vec![value]),
        }
    }

    pub fn vector_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: Data::F64(values),
        }
    }

    pub fn vector_i64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: Data::I64(values),
        }
    }

    /// `[n_repeats, row_len]` f64 dataset filled with `fill`.
    pub fn repeated_f64(n_repeats: usize, row_len: usize, fill: f64) -> Self {
        Self {
            shape: vec![n_repeats, row_len],
            data: Data::F64(vec![fill; n_repeats * row_len]),
        }
    }

    /// `[n_repeats, row_len]` i64 dataset filled with `fill`.
    pub fn repeated_i64(n_repeats: usize, row_len: usize, fill: i64) -> Self {
        Self {
            shape: vec![n_repeats, row_len],
            data: Data::I64(vec![fill; n_repeats * row_len]),
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Values per row along the leading axis.
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Length of the leading axis; 1 for scalars.
    pub fn n_rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    pub fn as_f64(&self) -> Result<&[f64], SchemaError> {
        match &self.data {
            Data::F64(v) => Ok(v),
            other => Err(SchemaError::TypeMismatch {
                expected: "f64",
                actual: other.kind(),
            }),
        }
    }

    pub fn as_i64(&self) -> Result<&[i64], SchemaError> {
        match &self.data {
            Data::I64(v) => Ok(v),
            other => Err(SchemaError::TypeMismatch {
                expected: "i64",
                actual: other.kind(),
            }),
        }
    }

    /// First value of an f64 dataset (the value of a scalar).
    pub fn first_f64(&self) -> Result<f64, SchemaError> {
        self.as_f64()?
            .first()
            .copied()
            .ok_or(SchemaError::ShapeMismatch {
                shape: self.shape.clone(),
                expected: 1,
                actual: 0,
            })
    }

    fn row_range(&self, index: usize) -> Result<std::ops::Range<usize>, SchemaError> {
        if self.rank() < 2 {
            return Err(SchemaError::RankMismatch {
                expected: 2,
                actual: self.rank(),
            });
        }
        let n_rows = self.n_rows();
        if index >= n_rows {
            return Err(SchemaError::RowOutOfBounds { index, n_rows });
        }
        let len = self.row_len();
        Ok(index * len..(index + 1) * len)
    }

    pub fn row_f64(&self, index: usize) -> Result<&[f64], SchemaError> {
        let range = self.row_range(index)?;
        Ok(&self.as_f64()?[range])
    }

    pub fn row_i64(&self, index: usize) -> Result<&[i64], SchemaError> {
        let range = self.row_range(index)?;
        Ok(&self.as_i64()?[range])
    }

    pub fn write_row_f64(&mut self, index: usize, values: &[f64]) -> Result<(), SchemaError> {
        let range = self.row_range(index)?;
        check_row_len(range.len(), values.len())?;
        match &mut self.data {
            Data::F64(v) => {
                v[range].copy_from_slice(values);
                Ok(())
            }
            other => Err(SchemaError::TypeMismatch {
                expected: "f64",
                actual: other.kind(),
            }),
        }
    }

    pub fn write_row_i64(&mut self, index: usize, values: &[i64]) -> Result<(), SchemaError> {
        let range = self.row_range(index)?;
        check_row_len(range.len(), values.len())?;
        match &mut self.data {
            Data::I64(v) => {
                v[range].copy_from_slice(values);
                Ok(())
            }
            other => Err(SchemaError::TypeMismatch {
                expected: "i64",
                actual: other.kind(),
            }),
        }
    }
}

fn check_row_len(expected: usize, actual: usize) -> Result<(), SchemaError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SchemaError::RowLength { expected, actual })
    }
}

// =============================================================================
// Group
// =============================================================================

/// Child of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Group(Group),
    Dataset(Dataset),
}

/// Named collection of attributes, datasets and nested groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    attrs: BTreeMap<String, Attr>,
    children: BTreeMap<String, Node>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty group tagged with a `repr` attribute.
    pub fn with_repr(repr: &str) -> Self {
        let mut group = Self::new();
        group.set_attr("repr", repr);
        group
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<Attr>) {
        self.attrs.insert(name.to_owned(), value.into());
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.get(name)
    }

    /// String attribute, `None` if absent or not a string.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name) {
            Some(Attr::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The `repr` tag naming the object stored in this group.
    pub fn repr(&self) -> Option<&str> {
        self.attr_str("repr")
    }

    /// Insert or replace a nested group, returning the previous child.
    pub fn insert_group(&mut self, name: &str, group: Group) -> Option<Node> {
        self.children.insert(name.to_owned(), Node::Group(group))
    }

    /// Insert or replace a dataset, returning the previous child.
    pub fn insert_dataset(&mut self, name: &str, dataset: Dataset) -> Option<Node> {
        self.children.insert(name.to_owned(), Node::Dataset(dataset))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn group(&self, name: &str) -> Result<&Group, SchemaError> {
        match self.children.get(name) {
            Some(Node::Group(g)) => Ok(g),
            Some(Node::Dataset(_)) => Err(SchemaError::NotAGroup(name.to_owned())),
            None => Err(SchemaError::Missing(name.to_owned())),
        }
    }

    pub fn group_mut(&mut self, name: &str) -> Result<&mut Group, SchemaError> {
        match self.children.get_mut(name) {
            Some(Node::Group(g)) => Ok(g),
            Some(Node::Dataset(_)) => Err(SchemaError::NotAGroup(name.to_owned())),
            None => Err(SchemaError::Missing(name.to_owned())),
        }
    }

    pub fn dataset(&self, name: &str) -> Result<&Dataset, SchemaError> {
        self.optional_dataset(name)?
            .ok_or_else(|| SchemaError::Missing(name.to_owned()))
    }

    pub fn dataset_mut(&mut self, name: &str) -> Result<&mut Dataset, SchemaError> {
        match self.children.get_mut(name) {
            Some(Node::Dataset(d)) => Ok(d),
            Some(Node::Group(_)) => Err(SchemaError::NotADataset(name.to_owned())),
            None => Err(SchemaError::Missing(name.to_owned())),
        }
    }

    /// Dataset that may legitimately be absent.
    ///
    /// A child of the wrong kind is still an error.
    pub fn optional_dataset(&self, name: &str) -> Result<Option<&Dataset>, SchemaError> {
        match self.children.get(name) {
            Some(Node::Dataset(d)) => Ok(Some(d)),
            Some(Node::Group(_)) => Err(SchemaError::NotADataset(name.to_owned())),
            None => Ok(None),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
