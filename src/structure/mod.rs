//! Structuring of flat named-array messages into axis-indexed datasets.
//!
//! A data array and the axis arrays it references are zipped positionally:
//! position `i` across the referenced axes forms one coordinate tuple, and
//! position `i` of the data array is its value. The result is kept in an
//! ordered map keyed by coordinate tuple, compared lexicographically over
//! the declared axis order.

pub mod grid;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::scalar::Scalar;
use crate::wire::{ArrayDescriptor, WireMessage};

pub use grid::{DenseGrid, GridAxis, DEFAULT_MAX_GRID_CELLS};

/// One value per referenced axis, in declared axis order.
pub type CoordTuple = Vec<Scalar>;

/// Axis metadata: name and number of distinct coordinate values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisInfo {
    /// Axis name.
    pub name: String,
    /// Number of distinct coordinate values.
    pub len: usize,
}

/// Shape summary of one structured dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayShape {
    /// Data array name.
    pub name: String,
    /// Number of stored (coordinate tuple, value) pairs.
    pub points: usize,
    /// Axis metadata in declared order.
    pub axes: Vec<AxisInfo>,
}

/// Coordinate-tuple-keyed values of one data array.
///
/// Invariants: every key has exactly one entry per axis; keys are unique;
/// `levels[k]` is exactly the set of values seen at position `k` of the
/// stored keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredDataset {
    name: String,
    axes: Vec<String>,
    levels: Vec<BTreeSet<Scalar>>,
    points: BTreeMap<CoordTuple, Scalar>,
}

impl StructuredDataset {
    /// Creates an empty dataset with a fixed axis order.
    pub fn new(name: impl Into<String>, axes: Vec<String>) -> Self {
        let levels = vec![BTreeSet::new(); axes.len()];
        Self {
            name: name.into(),
            axes,
            levels,
            points: BTreeMap::new(),
        }
    }

    /// Data array name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Axis names in declared order.
    #[must_use]
    pub fn axis_names(&self) -> &[String] {
        &self.axes
    }

    /// Axis metadata: (name, distinct values) per axis.
    #[must_use]
    pub fn axis_info(&self) -> Vec<AxisInfo> {
        self.axes
            .iter()
            .zip(&self.levels)
            .map(|(name, lvl)| AxisInfo {
                name: name.clone(),
                len: lvl.len(),
            })
            .collect()
    }

    /// Sorted distinct coordinate values of an axis.
    #[must_use]
    pub fn levels(&self, axis: &str) -> Option<&BTreeSet<Scalar>> {
        let idx = self.axes.iter().position(|a| a == axis)?;
        self.levels.get(idx)
    }

    pub(crate) fn all_levels(&self) -> &[BTreeSet<Scalar>] {
        &self.levels
    }

    /// Number of stored points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// True when no points are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value at a coordinate tuple.
    #[must_use]
    pub fn get(&self, coords: &[Scalar]) -> Option<&Scalar> {
        self.points.get(coords)
    }

    /// Points in ascending coordinate-tuple order.
    pub fn iter(&self) -> impl Iterator<Item = (&[Scalar], &Scalar)> {
        self.points.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Shape summary for change notifications.
    #[must_use]
    pub fn shape(&self) -> ArrayShape {
        ArrayShape {
            name: self.name.clone(),
            points: self.points.len(),
            axes: self.axis_info(),
        }
    }

    /// Insert one point; a repeated coordinate tuple overwrites the value.
    ///
    /// Returns the previous value, if any.
    pub(crate) fn insert_point(&mut self, coords: CoordTuple, value: Scalar) -> Option<Scalar> {
        debug_assert_eq!(coords.len(), self.axes.len());
        for (lvl, c) in self.levels.iter_mut().zip(&coords) {
            if !lvl.contains(c) {
                lvl.insert(c.clone());
            }
        }
        self.points.insert(coords, value)
    }

    pub(crate) fn into_parts(self) -> (Vec<BTreeSet<Scalar>>, BTreeMap<CoordTuple, Scalar>) {
        (self.levels, self.points)
    }
}

impl<'a> IntoIterator for &'a StructuredDataset {
    type Item = (&'a CoordTuple, &'a Scalar);
    type IntoIter = std::collections::btree_map::Iter<'a, CoordTuple, Scalar>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Structure every data array of a message.
///
/// A message without `datasets` yields no datasets.
///
/// # Errors
/// `SchemaError` if any data array is inconsistent; nothing is returned for
/// the other arrays in that case.
pub fn structure(message: &WireMessage) -> Result<Vec<StructuredDataset>, SchemaError> {
    match &message.datasets {
        Some(arrays) => structure_arrays(arrays),
        None => Ok(Vec::new()),
    }
}

/// Structure every data array in a name → descriptor map.
///
/// Axis arrays are only used as references and are not emitted.
pub fn structure_arrays(
    arrays: &BTreeMap<String, ArrayDescriptor>,
) -> Result<Vec<StructuredDataset>, SchemaError> {
    let mut out = Vec::new();
    for (name, desc) in arrays {
        if let ArrayDescriptor::Data { values, axes } = desc {
            out.push(structure_one(name, values, axes, arrays)?);
        }
    }
    Ok(out)
}

fn structure_one(
    name: &str,
    values: &[Scalar],
    axes: &[String],
    arrays: &BTreeMap<String, ArrayDescriptor>,
) -> Result<StructuredDataset, SchemaError> {
    if axes.is_empty() {
        return Err(SchemaError::EmptyAxisList {
            array: name.to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(axes.len());
    let mut columns: Vec<&[Scalar]> = Vec::with_capacity(axes.len());
    for axis in axes {
        if !seen.insert(axis.as_str()) {
            return Err(SchemaError::DuplicateAxis {
                array: name.to_string(),
                axis: axis.clone(),
            });
        }

        match arrays.get(axis) {
            None => {
                return Err(SchemaError::UnknownAxis {
                    array: name.to_string(),
                    axis: axis.clone(),
                })
            }
            Some(ArrayDescriptor::Data { .. }) => {
                return Err(SchemaError::NotAnAxis {
                    array: name.to_string(),
                    axis: axis.clone(),
                })
            }
            Some(ArrayDescriptor::Axis { values }) => columns.push(values),
        }
    }

    let expected = columns[0].len();
    for (axis, col) in axes.iter().zip(&columns).skip(1) {
        if col.len() != expected {
            return Err(SchemaError::AxisLengthMismatch {
                array: name.to_string(),
                axis: axis.clone(),
                expected,
                actual: col.len(),
            });
        }
    }
    if values.len() != expected {
        return Err(SchemaError::ValueLengthMismatch {
            array: name.to_string(),
            expected,
            actual: values.len(),
        });
    }

    let mut dataset = StructuredDataset::new(name, axes.to_vec());
    for (i, value) in values.iter().enumerate() {
        let coords: CoordTuple = columns.iter().map(|col| col[i].clone()).collect();
        // Repeated tuples within one message: last occurrence wins.
        dataset.insert_point(coords, value.clone());
    }
    Ok(dataset)
}
