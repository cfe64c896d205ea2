//! Kernel matrix inputs and their per-kernel retention options.

use std::collections::HashSet;

use faer::Mat;

use crate::utils::{matrix_is_finite, max_asymmetry};

use super::InputError;

const SYMMETRY_TOLERANCE: f64 = 1.0e-8;

/// Eigen-direction retention requested for one kernel.
///
/// `dim` wins when both are set. Invalid values are not rejected here; they
/// degrade to the default percentage with a warning when the kernel is built.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetentionOptions {
    /// Explicit number of eigenvectors to keep.
    pub dim: Option<i64>,
    /// Percentage (0, 100] of positive eigenvalue mass to keep.
    pub dimp: Option<f64>,
}

impl RetentionOptions {
    #[must_use]
    pub const fn with_dim(dim: i64) -> Self {
        Self {
            dim: Some(dim),
            dimp: None,
        }
    }

    #[must_use]
    pub const fn with_dimp(dimp: f64) -> Self {
        Self {
            dim: None,
            dimp: Some(dimp),
        }
    }
}

/// A named symmetric relationship matrix between entities.
#[derive(Debug, Clone)]
pub struct KernelInput {
    pub name: String,
    pub matrix: Mat<f64>,
    /// Entity identifiers, one per matrix row. Required.
    pub row_labels: Option<Vec<String>>,
    pub retention: RetentionOptions,
}

impl KernelInput {
    #[must_use]
    pub fn new(name: impl Into<String>, matrix: Mat<f64>, row_labels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            matrix,
            row_labels: Some(row_labels),
            retention: RetentionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: RetentionOptions) -> Self {
        self.retention = retention;
        self
    }

    /// Validate shape, symmetry, and row labels.
    ///
    /// # Errors
    ///
    /// Returns `InputError` for non-square, empty, non-finite, or asymmetric
    /// matrices and for missing, mis-sized, or duplicated row labels.
    pub fn validate(&self) -> Result<(), InputError> {
        let rows = self.matrix.nrows();
        let cols = self.matrix.ncols();
        if rows != cols {
            return Err(InputError::NonSquareKernel {
                kernel: self.name.clone(),
                rows,
                cols,
            });
        }
        if rows == 0 {
            return Err(InputError::EmptyKernel {
                kernel: self.name.clone(),
            });
        }
        if !matrix_is_finite(&self.matrix) {
            return Err(InputError::NonFiniteKernel {
                kernel: self.name.clone(),
            });
        }
        let scale = largest_magnitude(&self.matrix).max(1.0);
        let max_deviation = max_asymmetry(&self.matrix);
        if max_deviation > SYMMETRY_TOLERANCE * scale {
            return Err(InputError::NonSymmetricKernel {
                kernel: self.name.clone(),
                max_deviation,
            });
        }

        let labels = self.labels()?;
        if labels.len() != rows {
            return Err(InputError::RowLabelLengthMismatch {
                kernel: self.name.clone(),
                labels: labels.len(),
                rows,
            });
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in labels {
            if !seen.insert(label.as_str()) {
                return Err(InputError::DuplicateRowLabel {
                    kernel: self.name.clone(),
                    label: label.clone(),
                });
            }
        }
        Ok(())
    }

    /// Row labels, or `MissingRowLabels` when the kernel carries none.
    ///
    /// # Errors
    ///
    /// Returns `InputError::MissingRowLabels` if no labels are attached.
    pub fn labels(&self) -> Result<&[String], InputError> {
        self.row_labels
            .as_deref()
            .ok_or_else(|| InputError::MissingRowLabels {
                kernel: self.name.clone(),
            })
    }
}

fn largest_magnitude(matrix: &Mat<f64>) -> f64 {
    let mut max = 0.0_f64;
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            max = max.max(matrix[(i, j)].abs());
        }
    }
    max
}
