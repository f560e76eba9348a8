//! # Input Validation Module
//!
//! This module is the exclusive entry point for user-provided numerical data.
//! A session is built from a design matrix, a response vector, and a partition
//! marking which columns are synthetic dummies; everything is validated here,
//! once, so that the path-construction core never has to re-check shapes.
//!
//! - Strict shapes: the design matrix row count must match the response
//!   length, and every dummy index must fall inside the column range.
//! - User-centric errors: failures are assumed to be caller mistakes. The
//!   `DataError` enum is designed to give clear, actionable feedback.
//! - Finite data only: NaN and infinity are rejected up front rather than
//!   letting them poison the incremental factorization.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A comprehensive error type for all input validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error(
        "The design matrix has {rows} rows but the response vector has {len} entries. Both must describe the same observations."
    )]
    DimensionMismatch { rows: usize, len: usize },

    #[error(
        "The column partition describes {partition} columns but the design matrix has {columns}."
    )]
    PartitionColumnMismatch { partition: usize, columns: usize },

    #[error("Dummy column index {index} is out of range for a design matrix with {columns} columns.")]
    DummyIndexOutOfRange { index: usize, columns: usize },

    #[error("The number of dummy columns ({dummies}) cannot exceed the total column count ({columns}).")]
    TooManyDummies { dummies: usize, columns: usize },

    #[error("The design matrix must have at least one row and one column. Got {rows}x{columns}.")]
    EmptyDesign { rows: usize, columns: usize },

    #[error(
        "Non-finite value (NaN or infinity) found in the {source_name} at flat index {index}. All inputs must be finite."
    )]
    NonFiniteValue {
        source_name: &'static str,
        index: usize,
    },
}

/// Marks which design-matrix columns are synthetic dummies.
///
/// The partition is a value, not a column type: the path treats real and
/// dummy columns identically, and only the stop bookkeeping consults it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPartition {
    /// `true` marks a dummy column, indexed by design-matrix column.
    mask: Vec<bool>,
}

impl ColumnPartition {
    /// Partition with `num_dummies` dummy columns appended after the real
    /// ones, the usual layout when dummies are generated and stacked onto an
    /// existing design.
    pub fn trailing(columns: usize, num_dummies: usize) -> Result<Self, DataError> {
        if num_dummies > columns {
            return Err(DataError::TooManyDummies {
                dummies: num_dummies,
                columns,
            });
        }
        let mut mask = vec![false; columns];
        for flag in mask.iter_mut().skip(columns - num_dummies) {
            *flag = true;
        }
        Ok(Self { mask })
    }

    /// Partition from an explicit set of dummy column indices.
    pub fn from_indices(columns: usize, dummies: &[usize]) -> Result<Self, DataError> {
        let mut mask = vec![false; columns];
        for &index in dummies {
            if index >= columns {
                return Err(DataError::DummyIndexOutOfRange { index, columns });
            }
            mask[index] = true;
        }
        Ok(Self { mask })
    }

    pub fn columns(&self) -> usize {
        self.mask.len()
    }

    pub fn is_dummy(&self, column: usize) -> bool {
        self.mask[column]
    }

    pub fn num_dummies(&self) -> usize {
        self.mask.iter().filter(|&&d| d).count()
    }

    pub fn num_real(&self) -> usize {
        self.columns() - self.num_dummies()
    }
}

/// Validated, immutable inputs for one selection session.
#[derive(Clone, Debug)]
pub struct ModelData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub partition: ColumnPartition,
}

impl ModelData {
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        partition: ColumnPartition,
    ) -> Result<Self, DataError> {
        let (rows, columns) = x.dim();
        if rows == 0 || columns == 0 {
            return Err(DataError::EmptyDesign { rows, columns });
        }
        if y.len() != rows {
            return Err(DataError::DimensionMismatch {
                rows,
                len: y.len(),
            });
        }
        if partition.columns() != columns {
            return Err(DataError::PartitionColumnMismatch {
                partition: partition.columns(),
                columns,
            });
        }
        if let Some(index) = x.iter().position(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValue {
                source_name: "design matrix",
                index,
            });
        }
        if let Some(index) = y.iter().position(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValue {
                source_name: "response vector",
                index,
            });
        }
        Ok(Self { x, y, partition })
    }

    pub fn num_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.x.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn trailing_partition_marks_last_columns() {
        let partition = ColumnPartition::trailing(5, 2).unwrap();
        assert_eq!(partition.num_real(), 3);
        assert_eq!(partition.num_dummies(), 2);
        assert!(!partition.is_dummy(2));
        assert!(partition.is_dummy(3));
        assert!(partition.is_dummy(4));
    }

    #[test]
    fn explicit_partition_rejects_out_of_range_index() {
        let err = ColumnPartition::from_indices(3, &[1, 3]).unwrap_err();
        assert_eq!(
            err,
            DataError::DummyIndexOutOfRange {
                index: 3,
                columns: 3
            }
        );
    }

    #[test]
    fn too_many_dummies_is_rejected() {
        let err = ColumnPartition::trailing(2, 3).unwrap_err();
        assert_eq!(
            err,
            DataError::TooManyDummies {
                dummies: 3,
                columns: 2
            }
        );
    }

    #[test]
    fn row_count_must_match_response_length() {
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let y = array![1.0, 2.0, 3.0];
        let partition = ColumnPartition::trailing(2, 0).unwrap();
        let err = ModelData::new(x, y, partition).unwrap_err();
        assert_eq!(err, DataError::DimensionMismatch { rows: 2, len: 3 });
    }

    #[test]
    fn non_finite_design_entry_is_fatal() {
        let x = array![[1.0, f64::NAN], [0.0, 1.0]];
        let y = array![1.0, 2.0];
        let partition = ColumnPartition::trailing(2, 0).unwrap();
        let err = ModelData::new(x, y, partition).unwrap_err();
        assert!(matches!(err, DataError::NonFiniteValue { index: 1, .. }));
    }

    #[test]
    fn empty_design_is_fatal() {
        let x = Array2::<f64>::zeros((0, 0));
        let y = Array1::<f64>::zeros(0);
        let partition = ColumnPartition::trailing(0, 0).unwrap();
        let err = ModelData::new(x, y, partition).unwrap_err();
        assert_eq!(err, DataError::EmptyDesign { rows: 0, columns: 0 });
    }
}
