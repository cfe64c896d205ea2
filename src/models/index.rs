//! Mapping of observations onto kernel rows.

use std::collections::HashSet;

use super::factor::FactorEncoding;
use super::kernel::KernelMatrix;
use super::types::{ModelError, UnmatchedLevels};

/// Sorted `(label, position)` table for binary-search lookups.
#[derive(Debug, Clone)]
pub struct LabelLookup<'a> {
    table: Vec<(&'a str, usize)>,
}

impl<'a> LabelLookup<'a> {
    #[must_use]
    pub fn new(labels: &'a [String]) -> Self {
        let mut table: Vec<(&str, usize)> = labels
            .iter()
            .enumerate()
            .map(|(position, label)| (label.as_str(), position))
            .collect();
        table.sort_unstable();
        Self { table }
    }

    /// Original position of `label`.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.table
            .binary_search_by(|(candidate, _)| (*candidate).cmp(label))
            .ok()
            .map(|found| self.table[found].1)
    }

    /// Positions of all `labels`, or every distinct missing label.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnmatchedLevels` listing missing labels in
    /// first-seen order.
    pub fn locate_all<'b>(
        &self,
        labels: impl IntoIterator<Item = &'b str>,
        context: &str,
    ) -> Result<Vec<usize>, ModelError> {
        let mut positions = Vec::new();
        let mut unmatched = Vec::new();
        let mut reported = HashSet::new();
        for label in labels {
            match self.position(label) {
                Some(position) => positions.push(position),
                None => {
                    if reported.insert(label) {
                        unmatched.push(label.to_string());
                    }
                }
            }
        }
        if unmatched.is_empty() {
            Ok(positions)
        } else {
            Err(ModelError::UnmatchedLevels(UnmatchedLevels::from_distinct(
                context, unmatched,
            )))
        }
    }
}

/// Kernel row of every observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationIndex {
    pub rows: Vec<usize>,
}

impl ObservationIndex {
    /// Look up each observation's level label among the kernel row labels.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnmatchedLevels` if any observation label is not
    /// a kernel row; no partial index is produced.
    pub fn build(encoding: &FactorEncoding, kernel: &KernelMatrix) -> Result<Self, ModelError> {
        let lookup = LabelLookup::new(&kernel.row_labels);
        let rows = lookup.locate_all(
            (0..encoding.nelem()).map(|obs| encoding.label_of(obs)),
            &kernel.name,
        )?;
        Ok(Self { rows })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::FactorColumn;
    use crate::utils::generate_labels;
    use faer::Mat;

    fn kernel(rows: &[&str]) -> KernelMatrix {
        KernelMatrix {
            name: "grm".to_string(),
            row_labels: rows.iter().map(ToString::to_string).collect(),
            column_labels: generate_labels("col", 1),
            eigenvalues: vec![1.0],
            eigenvectors: Mat::from_fn(rows.len(), 1, |_, _| 1.0),
            sum_positive: 1.0,
            count_positive: 1,
            dimp: 100.0,
        }
    }

    fn encoding(values: &[&str]) -> FactorEncoding {
        FactorEncoding::from_columns(&["animal".to_string()], &[FactorColumn::from_strs(values)])
            .expect("valid column")
    }

    #[test]
    fn every_observation_maps_to_its_kernel_row() {
        let kernel = kernel(&["z", "x", "y"]);
        let index = ObservationIndex::build(&encoding(&["x", "y", "x", "z"]), &kernel)
            .expect("all labels present");
        assert_eq!(index.rows, vec![1, 2, 1, 0]);
        assert!(index.rows.iter().all(|row| *row < kernel.row_labels.len()));
    }

    #[test]
    fn unmatched_labels_fail_the_whole_index() {
        let err = ObservationIndex::build(&encoding(&["x", "q", "w", "q"]), &kernel(&["x"]))
            .expect_err("q and w are unknown");
        let ModelError::UnmatchedLevels(report) = &err else {
            panic!("expected unmatched levels, got {err:?}");
        };
        assert_eq!(report.preview, vec!["q", "w"]);
        assert_eq!(report.context, "grm");
    }

    #[test]
    fn unmatched_preview_is_capped() {
        let values: Vec<String> = (0..15).map(|i| format!("u{i}")).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let err = ObservationIndex::build(&encoding(&refs), &kernel(&["x"]))
            .expect_err("none match");
        let ModelError::UnmatchedLevels(report) = &err else {
            panic!("expected unmatched levels, got {err:?}");
        };
        assert_eq!(report.preview.len(), 10);
        assert_eq!(report.remaining, 5);
    }

    #[test]
    fn lookup_returns_original_positions() {
        let labels = generate_labels("id", 12);
        let lookup = LabelLookup::new(&labels);
        assert_eq!(lookup.position("id10"), Some(9));
        assert_eq!(lookup.position("id2"), Some(1));
        assert_eq!(lookup.position("id13"), None);
    }
}
