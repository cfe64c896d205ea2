//! Eigen-decomposed kernel matrices with truncation to the leading directions.

use std::cmp::Ordering;

use faer::{Mat, Side};

use crate::input::{KernelInput, RetentionOptions};
use crate::utils::generate_labels;

use super::types::{BuildLog, ModelError};

/// Retention percentage used when options are absent or invalid.
pub const DEFAULT_DIMP: f64 = 90.0;

/// Leading eigen-directions of a symmetric kernel.
///
/// `eigenvectors` is `nrow x ncol`; column `k` has variance `eigenvalues[k]`
/// and columns are ordered by descending eigenvalue.
#[derive(Debug, Clone)]
pub struct KernelMatrix {
    pub name: String,
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub eigenvalues: Vec<f64>,
    pub eigenvectors: Mat<f64>,
    /// Sum of the leading positive eigenvalues of the full decomposition.
    pub sum_positive: f64,
    /// Number of leading positive eigenvalues of the full decomposition.
    pub count_positive: usize,
    /// Percentage of positive eigenvalue mass retained.
    pub dimp: f64,
}

/// Resolved retention for one kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retention {
    pub dim: usize,
    pub dimp: f64,
}

impl KernelMatrix {
    /// Decompose `input` and keep the directions selected by its retention
    /// options, using `default_dimp` when neither `dim` nor `dimp` is set.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidInput` for invalid kernels (including
    /// missing row labels), `ModelError::EigenDecompositionFailed` if faer
    /// fails, and `ModelError::NoPositiveEigenvalues` if nothing can be kept.
    pub fn from_input(
        input: &KernelInput,
        default_dimp: f64,
        log: &mut BuildLog,
    ) -> Result<Self, ModelError> {
        input.validate()?;
        let row_labels = input.labels()?.to_vec();
        let (values, vectors) = sorted_eigenpairs(&input.matrix)?;

        let (sum_positive, count_positive) = positive_mass(&values);
        if count_positive == 0 {
            return Err(ModelError::NoPositiveEigenvalues {
                kernel: input.name.clone(),
            });
        }
        let retention = resolve_retention(
            &values,
            input.retention,
            default_dimp,
            &input.name,
            log,
        );
        log.note(format!(
            "kernel {}: dimp={:.2}, dim={}",
            input.name, retention.dimp, retention.dim
        ));

        let n = vectors.nrows();
        let eigenvectors = Mat::from_fn(n, retention.dim, |row, col| vectors[(row, col)]);
        Ok(Self {
            name: input.name.clone(),
            row_labels,
            column_labels: generate_labels("col", retention.dim),
            eigenvalues: values[..retention.dim].to_vec(),
            eigenvectors,
            sum_positive,
            count_positive,
            dimp: retention.dimp,
        })
    }

    #[must_use]
    pub fn nrow(&self) -> usize {
        self.eigenvectors.nrows()
    }

    #[must_use]
    pub fn ncol(&self) -> usize {
        self.eigenvectors.ncols()
    }

    /// Map coefficients on the eigen-directions back to one value per kernel row.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::DiagonalLengthMismatch` if `coefficients` does not
    /// have one entry per retained direction.
    pub fn project(&self, coefficients: &[f64]) -> Result<Vec<f64>, ModelError> {
        if coefficients.len() != self.ncol() {
            return Err(ModelError::DiagonalLengthMismatch {
                diag: self.ncol(),
                coefficients: coefficients.len(),
            });
        }
        Ok((0..self.nrow())
            .map(|row| {
                coefficients
                    .iter()
                    .enumerate()
                    .map(|(col, coef)| self.eigenvectors[(row, col)] * coef)
                    .sum()
            })
            .collect())
    }
}

/// Eigenpairs of a symmetric matrix, by descending eigenvalue.
fn sorted_eigenpairs(matrix: &Mat<f64>) -> Result<(Vec<f64>, Mat<f64>), ModelError> {
    let eig = matrix
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|err| ModelError::EigenDecompositionFailed(format!("{err:?}")))?;
    let diag = eig.S();
    let basis = eig.U();
    let n = diag.dim();

    let mut ordering: Vec<(usize, f64)> = (0..n).map(|idx| (idx, diag[idx])).collect();
    ordering.sort_by(|lhs, rhs| rhs.1.partial_cmp(&lhs.1).unwrap_or(Ordering::Equal));

    let values = ordering.iter().map(|(_, value)| *value).collect();
    let vectors = Mat::from_fn(basis.nrows(), n, |row, col| basis[(row, ordering[col].0)]);
    Ok((values, vectors))
}

/// Sum and count of the leading strictly positive eigenvalues.
///
/// Accumulation stops at the first non-positive value.
#[must_use]
pub fn positive_mass(eigenvalues: &[f64]) -> (f64, usize) {
    let mut sum = 0.0;
    let mut count = 0;
    for value in eigenvalues.iter().take_while(|value| **value > 0.0) {
        sum += value;
        count += 1;
    }
    (sum, count)
}

/// Number of directions to keep for descending `eigenvalues`.
///
/// An explicit `dim` wins and is clamped to the positive eigenvalues.
/// Otherwise directions are added until their running sum exceeds `dimp`
/// percent of the positive mass; a running sum that lands exactly on the
/// target keeps one more direction. Out-of-range options warn and fall back
/// to [`DEFAULT_DIMP`].
pub fn resolve_retention(
    eigenvalues: &[f64],
    options: RetentionOptions,
    default_dimp: f64,
    kernel: &str,
    log: &mut BuildLog,
) -> Retention {
    let (sum_positive, count_positive) = positive_mass(eigenvalues);
    let available = i64::try_from(eigenvalues.len()).unwrap_or(i64::MAX);

    let dimp = match (options.dim, options.dimp) {
        (Some(dim), _) if (1..=available).contains(&dim) => {
            let dim = usize::try_from(dim)
                .unwrap_or(count_positive)
                .min(count_positive);
            let kept: f64 = eigenvalues[..dim].iter().sum();
            return Retention {
                dim,
                dimp: 100.0 * kept / sum_positive,
            };
        }
        (Some(dim), _) => {
            log.warn(format!(
                "kernel {kernel}: dim={dim} is outside 1..={available}; using dimp={DEFAULT_DIMP}"
            ));
            DEFAULT_DIMP
        }
        (None, Some(dimp)) if dimp > 0.0 && dimp <= 100.0 => dimp,
        (None, Some(dimp)) => {
            log.warn(format!(
                "kernel {kernel}: dimp={dimp} is outside (0, 100]; using dimp={DEFAULT_DIMP}"
            ));
            DEFAULT_DIMP
        }
        (None, None) => default_dimp,
    };

    let cutoff = dimp / 100.0 * sum_positive;
    let mut sum = 0.0;
    let mut dim = 0;
    while sum <= cutoff && dim < count_positive {
        sum += eigenvalues[dim];
        dim += 1;
    }
    Retention { dim, dimp }
}
