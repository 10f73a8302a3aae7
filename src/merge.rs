//! Merging of incremental updates into an existing structured dataset.
//!
//! Incoming points are inserted into the existing ordered map. A repeated
//! coordinate tuple overwrites the stored value (last write wins). Axis
//! levels become the union of both sides. The axis order of a dataset is
//! fixed at creation: an incoming dataset with a different axis sequence is
//! rejected before anything is touched.

use crate::error::SchemaError;
use crate::structure::StructuredDataset;

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Points at coordinate tuples not seen before.
    pub inserted: usize,
    /// Points that replaced an existing value.
    pub overwritten: usize,
}

impl StructuredDataset {
    /// Check that `incoming` can be merged into `self`.
    ///
    /// # Errors
    /// `SchemaError::AxisMismatch` if the axis name sequences differ.
    pub fn check_mergeable(&self, incoming: &StructuredDataset) -> Result<(), SchemaError> {
        if self.axis_names() == incoming.axis_names() {
            Ok(())
        } else {
            Err(SchemaError::AxisMismatch {
                array: self.name().to_string(),
                existing: self.axis_names().to_vec(),
                incoming: incoming.axis_names().to_vec(),
            })
        }
    }

    /// Merge `incoming` into `self` in place.
    ///
    /// On error `self` is left unchanged.
    pub fn merge_from(&mut self, incoming: StructuredDataset) -> Result<MergeStats, SchemaError> {
        self.check_mergeable(&incoming)?;

        let mut stats = MergeStats::default();
        let (_, points) = incoming.into_parts();
        for (coords, value) in points {
            match self.insert_point(coords, value) {
                Some(_) => stats.overwritten += 1,
                None => stats.inserted += 1,
            }
        }
        Ok(stats)
    }
}

/// Combine an optional existing dataset with an incoming one.
///
/// With no existing dataset the incoming one is returned as-is. Otherwise
/// a merged copy is returned and `existing` is not modified.
///
/// # Errors
/// `SchemaError::AxisMismatch` on conflicting axis order.
pub fn merge(
    existing: Option<&StructuredDataset>,
    incoming: StructuredDataset,
) -> Result<StructuredDataset, SchemaError> {
    match existing {
        None => Ok(incoming),
        Some(current) => {
            current.check_mergeable(&incoming)?;
            let mut merged = current.clone();
            merged.merge_from(incoming)?;
            Ok(merged)
        }
    }
}
