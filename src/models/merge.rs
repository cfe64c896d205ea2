//! Kronecker-product merging of eigen-decomposed kernels.
//!
//! The merged kernel keeps every combination of retained directions, so its
//! size is the product of the input sizes. The memory footprint is checked
//! against the configured budget before anything is allocated.

use std::collections::HashSet;

use faer::Mat;

use crate::input::InputError;
use crate::utils::{LABEL_SEPARATOR, NAME_SEPARATOR};

use super::kernel::KernelMatrix;
use super::types::{BuildLog, CorrelatedTermOptions, ModelError};

const BYTES_PER_ENTRY: u128 = 8;

/// Size of a merged kernel before it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeFootprint {
    pub rows: u128,
    pub cols: u128,
    /// Eigenvector buffer size; `None` when the product overflows.
    pub bytes: Option<u128>,
}

impl MergeFootprint {
    #[must_use]
    pub fn of(kernels: &[KernelMatrix]) -> Self {
        let rows = checked_product(kernels.iter().map(KernelMatrix::nrow));
        let cols = checked_product(kernels.iter().map(KernelMatrix::ncol));
        let bytes = rows
            .zip(cols)
            .and_then(|(rows, cols)| rows.checked_mul(cols))
            .and_then(|entries| entries.checked_mul(BYTES_PER_ENTRY));
        Self {
            rows: rows.unwrap_or(u128::MAX),
            cols: cols.unwrap_or(u128::MAX),
            bytes,
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::MemoryBudgetExceeded` if the buffer would exceed
    /// `budget_bytes` or its size overflows.
    pub fn check(self, budget_bytes: u64) -> Result<(), ModelError> {
        match self.bytes {
            Some(needed) if needed <= u128::from(budget_bytes) => Ok(()),
            needed => Err(ModelError::MemoryBudgetExceeded {
                needed_bytes: needed.unwrap_or(u128::MAX),
                budget_bytes,
            }),
        }
    }
}

fn checked_product(mut sizes: impl Iterator<Item = usize>) -> Option<u128> {
    sizes.try_fold(1_u128, |acc, size| {
        u128::try_from(size).ok().and_then(|size| acc.checked_mul(size))
    })
}

/// Merge two or more kernels into their Kronecker product.
///
/// Row labels combine with `.` and the first kernel varies slowest; column
/// `i * ncol_2 + j` of a two-kernel merge has eigenvalue `e1[i] * e2[j]`.
///
/// # Errors
///
/// Returns `ModelError::StructuralMisuse` for fewer than two kernels and
/// `ModelError::MemoryBudgetExceeded` if the merged eigenvectors would not fit
/// in `options.max_mem_bytes`. Labels that already contain `.` can paste to
/// the same merged label; that is reported as `InputError::DuplicateRowLabel`.
pub fn merge_kernels(
    kernels: Vec<KernelMatrix>,
    options: CorrelatedTermOptions,
    log: &mut BuildLog,
) -> Result<KernelMatrix, ModelError> {
    if kernels.len() < 2 {
        return Err(ModelError::StructuralMisuse(format!(
            "merging needs at least two kernels, got {}",
            kernels.len()
        )));
    }
    let footprint = MergeFootprint::of(&kernels);
    if footprint.cols > u128::try_from(options.large_regression_warning).unwrap_or(u128::MAX) {
        log.warn(format!(
            "merged kernel has {} regressions; this will be slow",
            footprint.cols
        ));
    }
    footprint.check(options.max_mem_bytes)?;

    let merged = kernels
        .into_iter()
        .reduce(kronecker)
        .ok_or_else(|| ModelError::StructuralMisuse("no kernels to merge".to_string()))?;
    ensure_unique_rows(&merged)?;
    log.note(format!(
        "merged kernel {}: {} rows, dim={}, dimp={:.2}",
        merged.name,
        merged.nrow(),
        merged.ncol(),
        merged.dimp
    ));
    Ok(merged)
}

/// Kronecker product of two kernels, consuming both.
#[must_use]
pub fn kronecker(first: KernelMatrix, second: KernelMatrix) -> KernelMatrix {
    let (r2, c2) = (second.nrow(), second.ncol());
    let eigenvectors = Mat::from_fn(first.nrow() * r2, first.ncol() * c2, |row, col| {
        first.eigenvectors[(row / r2, col / c2)] * second.eigenvectors[(row % r2, col % c2)]
    });
    let eigenvalues = first
        .eigenvalues
        .iter()
        .flat_map(|left| second.eigenvalues.iter().map(move |right| left * right))
        .collect();

    KernelMatrix {
        name: format!("{}{NAME_SEPARATOR}{}", first.name, second.name),
        row_labels: cross_labels(&first.row_labels, &second.row_labels),
        column_labels: cross_labels(&first.column_labels, &second.column_labels),
        eigenvalues,
        eigenvectors,
        sum_positive: first.sum_positive * second.sum_positive,
        count_positive: first.count_positive * second.count_positive,
        dimp: first.dimp * second.dimp / 100.0,
    }
}

fn ensure_unique_rows(kernel: &KernelMatrix) -> Result<(), ModelError> {
    let mut seen = HashSet::with_capacity(kernel.row_labels.len());
    for label in &kernel.row_labels {
        if !seen.insert(label.as_str()) {
            return Err(InputError::DuplicateRowLabel {
                kernel: kernel.name.clone(),
                label: label.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn cross_labels(outer: &[String], inner: &[String]) -> Vec<String> {
    outer
        .iter()
        .flat_map(|left| {
            inner
                .iter()
                .map(move |right| format!("{left}{LABEL_SEPARATOR}{right}"))
        })
        .collect()
}
