//! Dense N-d view of a structured dataset.
//!
//! Unstacks the coordinate-tuple map onto the full Cartesian product of the
//! axis levels. Cells without a received value are `None`. Layout is
//! row-major over the declared axis order (last axis varies fastest).

use crate::error::SchemaError;
use crate::scalar::Scalar;

use super::StructuredDataset;

/// Cell limit used by [`StructuredDataset::to_grid`].
pub const DEFAULT_MAX_GRID_CELLS: usize = 1 << 26;

/// One dimension of a dense grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAxis {
    /// Axis name.
    pub name: String,
    /// Sorted coordinate values along this dimension.
    pub coords: Vec<Scalar>,
}

/// Dense row-major grid of optional values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseGrid {
    name: String,
    axes: Vec<GridAxis>,
    values: Vec<Option<Scalar>>,
}

impl DenseGrid {
    /// Data array name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimensions in declared axis order.
    #[must_use]
    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    /// Length of each dimension.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.coords.len()).collect()
    }

    /// Flat row-major cells.
    #[must_use]
    pub fn values(&self) -> &[Option<Scalar>] {
        &self.values
    }

    /// Number of cells holding a value.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Cell at an N-d index; `None` when out of range or unfilled.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<&Scalar> {
        self.flat_index(index).and_then(|i| self.values[i].as_ref())
    }

    /// Numeric view with `NaN` for missing and non-numeric cells.
    #[must_use]
    pub fn to_f64(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|v| v.as_ref().and_then(Scalar::as_f64).unwrap_or(f64::NAN))
            .collect()
    }

    /// Drop dimensions of length one.
    ///
    /// The row-major layout is unaffected, only the axis list shrinks.
    #[must_use]
    pub fn squeeze(mut self) -> Self {
        self.axes.retain(|a| a.coords.len() != 1);
        self
    }

    fn flat_index(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.axes.len() {
            return None;
        }
        let mut flat = 0usize;
        for (axis, &i) in self.axes.iter().zip(index) {
            if i >= axis.coords.len() {
                return None;
            }
            flat = flat * axis.coords.len() + i;
        }
        Some(flat)
    }
}

impl StructuredDataset {
    /// Unstack into a dense grid over the axis levels.
    ///
    /// # Errors
    /// `SchemaError::GridTooLarge` if the grid would exceed
    /// [`DEFAULT_MAX_GRID_CELLS`] cells.
    pub fn to_grid(&self) -> Result<DenseGrid, SchemaError> {
        self.to_grid_with_limit(DEFAULT_MAX_GRID_CELLS)
    }

    /// Unstack into a dense grid of at most `max_cells` cells.
    ///
    /// Sparse sweeps can have far more level combinations than points, so
    /// the size is checked before anything is allocated.
    ///
    /// # Errors
    /// `SchemaError::GridTooLarge` if the cell count overflows or exceeds
    /// `max_cells`.
    pub fn to_grid_with_limit(&self, max_cells: usize) -> Result<DenseGrid, SchemaError> {
        let too_large = || SchemaError::GridTooLarge {
            array: self.name().to_string(),
            max_cells,
        };

        let cells = self
            .all_levels()
            .iter()
            .try_fold(1usize, |acc, lvl| acc.checked_mul(lvl.len()))
            .filter(|&n| n <= max_cells)
            .ok_or_else(too_large)?;

        let axes: Vec<GridAxis> = self
            .axis_names()
            .iter()
            .zip(self.all_levels())
            .map(|(name, lvl)| GridAxis {
                name: name.clone(),
                coords: lvl.iter().cloned().collect(),
            })
            .collect();

        let mut values = vec![None; cells];
        for (coords, value) in self {
            let mut flat = 0usize;
            for (axis, c) in axes.iter().zip(coords) {
                // Levels contain every stored coordinate.
                let pos = axis.coords.binary_search(c).unwrap_or_default();
                flat = flat * axis.coords.len() + pos;
            }
            values[flat] = Some(value.clone());
        }

        Ok(DenseGrid {
            name: self.name().to_string(),
            axes,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::structure::structure_arrays;
    use crate::wire::ArrayDescriptor;

    fn dataset(x: Vec<i64>, y: Vec<i64>, v: Vec<f64>) -> StructuredDataset {
        let arrays: BTreeMap<String, ArrayDescriptor> = [
            ("x".to_string(), ArrayDescriptor::axis(x)),
            ("y".to_string(), ArrayDescriptor::axis(y)),
            ("v".to_string(), ArrayDescriptor::data(v, ["x", "y"])),
        ]
        .into_iter()
        .collect();
        structure_arrays(&arrays).unwrap().remove(0)
    }

    #[test]
    fn full_grid_is_row_major() {
        let ds = dataset(vec![0, 0, 1, 1], vec![5, 6, 5, 6], vec![1.0, 2.0, 3.0, 4.0]);
        let grid = ds.to_grid().unwrap();
        assert_eq!(grid.shape(), vec![2, 2]);
        assert_eq!(grid.filled(), 4);
        assert_eq!(grid.to_f64(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(grid.get(&[1, 0]), Some(&Scalar::Float(3.0)));
    }

    #[test]
    fn sparse_grid_has_holes() {
        let ds = dataset(vec![0, 1], vec![5, 6], vec![1.0, 4.0]);
        let grid = ds.to_grid().unwrap();
        assert_eq!(grid.shape(), vec![2, 2]);
        assert_eq!(grid.filled(), 2);
        assert!(grid.get(&[0, 1]).is_none());
        assert!(grid.to_f64()[1].is_nan());
    }

    #[test]
    fn out_of_range_index_is_none() {
        let ds = dataset(vec![0], vec![5], vec![1.0]);
        let grid = ds.to_grid().unwrap();
        assert!(grid.get(&[1, 0]).is_none());
        assert!(grid.get(&[0]).is_none());
    }

    #[test]
    fn squeeze_drops_singleton_axes() {
        let ds = dataset(vec![7, 7, 7], vec![1, 2, 3], vec![0.1, 0.2, 0.3]);
        let grid = ds.to_grid().unwrap().squeeze();
        assert_eq!(grid.shape(), vec![3]);
        assert_eq!(grid.axes()[0].name, "y");
        assert_eq!(grid.get(&[2]), Some(&Scalar::Float(0.3)));
    }

    #[test]
    fn sparse_diagonal_sweep_is_rejected_not_allocated() {
        // Every point adds a new level on every axis: 10_000^5 cells overflows usize.
        let axes: Vec<String> = (0..5).map(|k| format!("a{k}")).collect();
        let mut ds = StructuredDataset::new("diag", axes);
        for i in 0..10_000i64 {
            ds.insert_point(vec![Scalar::Int(i); 5], Scalar::Float(0.0));
        }

        let err = ds.to_grid().unwrap_err();
        assert_eq!(
            err,
            SchemaError::GridTooLarge {
                array: "diag".to_string(),
                max_cells: DEFAULT_MAX_GRID_CELLS,
            }
        );
    }

    #[test]
    fn cell_limit_is_enforced() {
        let ds = dataset(vec![0, 1, 2], vec![5, 6, 7], vec![1.0, 2.0, 3.0]);
        assert!(ds.to_grid_with_limit(8).is_err());
        assert_eq!(ds.to_grid_with_limit(9).unwrap().shape(), vec![3, 3]);
    }
}
