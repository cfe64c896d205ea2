//! # Utilities
//!
//! Shared helpers for label generation, label pasting, and working with
//! faer matrices.

use faer::Mat;

/// Separator used when pasting interacting labels into one combined label.
pub const LABEL_SEPARATOR: &str = ".";

/// Separator used when reconstructing the name of an interaction term.
pub const NAME_SEPARATOR: &str = ":";

/// Generate `prefix1`, `prefix2`, ..., `prefixN`.
#[must_use]
pub fn generate_labels(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|index| format!("{prefix}{index}")).collect()
}

/// Row-wise paste of several equally long label columns with `separator`.
///
/// Columns are joined in the given order; an empty input yields an empty vector.
#[must_use]
pub fn paste_columns(columns: &[Vec<String>], separator: &str) -> Vec<String> {
    let Some(first) = columns.first() else {
        return Vec::new();
    };
    let mut pasted = first.clone();
    for column in &columns[1..] {
        for (combined, next) in pasted.iter_mut().zip(column.iter()) {
            combined.push_str(separator);
            combined.push_str(next);
        }
    }
    pasted
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

/// Largest absolute difference between a square matrix and its transpose.
#[must_use]
pub fn max_asymmetry(matrix: &Mat<f64>) -> f64 {
    let mut max = 0.0;
    for i in 0..matrix.nrows() {
        for j in 0..i {
            let diff = (matrix[(i, j)] - matrix[(j, i)]).abs();
            if diff > max {
                max = diff;
            }
        }
    }
    max
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}
