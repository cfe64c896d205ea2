//! Level coding of single and interacting categorical variables.
//!
//! A [`FactorEncoding`] maps every observation to a dense 0-based level code
//! with a label per level. Interactions are coded by pasting the per-variable
//! labels with `.` and numbering the sorted distinct results, so the coding
//! never depends on the order in which rows are encountered.

use std::collections::BTreeSet;

use crate::input::{FactorColumn, MISSING_LABEL};
use crate::utils::{LABEL_SEPARATOR, NAME_SEPARATOR, paste_columns};

use super::index::LabelLookup;
use super::types::ModelError;

/// One categorical variable coded against its own level set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleFactor {
    pub name: String,
    pub codes: Vec<usize>,
    pub labels: Vec<String>,
}

impl SimpleFactor {
    /// Code a data column.
    ///
    /// Text levels sort lexicographically, integer levels numerically, logical
    /// levels as `FALSE`, `TRUE`. Pre-coded columns keep their level order.
    /// Missing values map to a single `NA` level: a trailing one for text,
    /// integer, and logical columns, and the existing `NA` entry of a
    /// pre-coded level set if it has one. A literal `"NA"` text value is
    /// treated as missing.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidInput` for empty columns or out-of-range codes.
    pub fn from_column(name: &str, column: &FactorColumn) -> Result<Self, ModelError> {
        column.validate(name)?;
        let (codes, labels) = match column {
            FactorColumn::Text(values) => {
                let present: Vec<Option<&str>> = values
                    .iter()
                    .map(|v| v.as_deref().filter(|v| *v != MISSING_LABEL))
                    .collect();
                let levels: Vec<&str> = present
                    .iter()
                    .flatten()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let codes = code_sorted(present.into_iter(), &levels);
                let labels = levels.iter().map(ToString::to_string).collect();
                (codes, labels)
            }
            FactorColumn::Integer(values) => {
                let levels: Vec<i64> = values
                    .iter()
                    .flatten()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let codes = code_sorted(values.iter().copied(), &levels);
                let labels = levels.iter().map(ToString::to_string).collect();
                (codes, labels)
            }
            FactorColumn::Logical(values) => {
                let codes = values
                    .iter()
                    .map(|value| value.map_or(2, usize::from))
                    .collect();
                (codes, vec!["FALSE".to_string(), "TRUE".to_string()])
            }
            FactorColumn::Coded { codes, levels } => {
                let missing = levels
                    .iter()
                    .position(|level| level == MISSING_LABEL)
                    .unwrap_or(levels.len());
                let codes = codes.iter().map(|code| code.unwrap_or(missing)).collect();
                (codes, levels.clone())
            }
        };
        let mut factor = Self {
            name: name.to_string(),
            codes,
            labels,
        };
        if factor.codes.iter().any(|code| *code >= factor.labels.len()) {
            factor.labels.push(MISSING_LABEL.to_string());
        }
        Ok(factor)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[must_use]
    pub const fn nlevels(&self) -> usize {
        self.labels.len()
    }

    /// Label of every observation, in row order.
    #[must_use]
    pub fn back_to_strings(&self) -> Vec<String> {
        self.codes
            .iter()
            .map(|code| self.labels[*code].clone())
            .collect()
    }
}

/// Codes present values by binary search into sorted `levels`; missing
/// values get `levels.len()`.
fn code_sorted<T: Ord>(values: impl Iterator<Item = Option<T>>, levels: &[T]) -> Vec<usize> {
    values
        .map(|value| {
            value
                .and_then(|value| levels.binary_search(&value).ok())
                .unwrap_or(levels.len())
        })
        .collect()
}

/// Level codes of one or more interacting variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorEncoding {
    /// Variable name; interactions join names with `:`.
    pub name: String,
    /// Level code of every observation.
    pub level_codes: Vec<usize>,
    /// Label of every level.
    pub labels: Vec<String>,
}

impl FactorEncoding {
    /// Code one variable, or the interaction of several.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::DimensionMismatch` when the columns differ in
    /// length, `ModelError::StructuralMisuse` for an empty column list, and
    /// `ModelError::InvalidInput` for invalid columns.
    pub fn from_columns(names: &[String], columns: &[FactorColumn]) -> Result<Self, ModelError> {
        let factors = code_each(names, columns)?;
        if let [factor] = factors.as_slice() {
            return Ok(Self::from_simple(factor));
        }
        Ok(Self::interact(&factors))
    }

    /// Code a single variable in the order of `kernel_labels`.
    ///
    /// Level `k` is the kernel's row `k`, so levels without data keep their
    /// kernel position.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnmatchedLevels` if any data label is absent from
    /// `kernel_labels`, and `ModelError::InvalidInput` for an invalid column.
    pub fn from_kernel_levels(
        column: &FactorColumn,
        name: &str,
        kernel_labels: &[String],
        kernel_name: &str,
    ) -> Result<Self, ModelError> {
        column.validate(name)?;
        let values = column.to_strings();
        let level_codes = LabelLookup::new(kernel_labels)
            .locate_all(values.iter().map(String::as_str), kernel_name)?;
        Ok(Self {
            name: name.to_string(),
            level_codes,
            labels: kernel_labels.to_vec(),
        })
    }

    fn from_simple(factor: &SimpleFactor) -> Self {
        Self {
            name: factor.name.clone(),
            level_codes: factor.codes.clone(),
            labels: factor.labels.clone(),
        }
    }

    fn interact(factors: &[SimpleFactor]) -> Self {
        let strings: Vec<Vec<String>> = factors.iter().map(SimpleFactor::back_to_strings).collect();
        let pasted = paste_columns(&strings, LABEL_SEPARATOR);
        let mut labels = pasted.clone();
        labels.sort_unstable();
        labels.dedup();
        let level_codes = pasted
            .iter()
            .map(|value| labels.binary_search(value).unwrap_or_default())
            .collect();
        Self {
            name: interaction_name(factors),
            level_codes,
            labels,
        }
    }

    /// Number of observations.
    #[must_use]
    pub const fn nelem(&self) -> usize {
        self.level_codes.len()
    }

    #[must_use]
    pub const fn nlevels(&self) -> usize {
        self.labels.len()
    }

    /// Label of observation `row`.
    #[must_use]
    pub fn label_of(&self, row: usize) -> &str {
        &self.labels[self.level_codes[row]]
    }
}

/// Interaction coding that also keeps every variable's own coding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonCollapsedEncoding {
    pub encoding: FactorEncoding,
    pub factors: Vec<SimpleFactor>,
    /// `true` on the first observation of each level, in row order.
    pub first_occurrence: Vec<bool>,
}

impl NonCollapsedEncoding {
    /// # Errors
    ///
    /// Returns `ModelError::StructuralMisuse` for fewer than two variables,
    /// plus the errors of [`FactorEncoding::from_columns`].
    pub fn from_columns(names: &[String], columns: &[FactorColumn]) -> Result<Self, ModelError> {
        if columns.len() < 2 {
            return Err(ModelError::StructuralMisuse(format!(
                "non-collapsed coding needs at least two variables, got {}",
                columns.len()
            )));
        }
        let factors = code_each(names, columns)?;
        let encoding = FactorEncoding::interact(&factors);
        let mut seen = vec![false; encoding.nlevels()];
        let first_occurrence = encoding
            .level_codes
            .iter()
            .map(|code| !std::mem::replace(&mut seen[*code], true))
            .collect();
        Ok(Self {
            encoding,
            factors,
            first_occurrence,
        })
    }
}

fn code_each(names: &[String], columns: &[FactorColumn]) -> Result<Vec<SimpleFactor>, ModelError> {
    if columns.is_empty() {
        return Err(ModelError::StructuralMisuse(
            "level coding needs at least one variable".to_string(),
        ));
    }
    if names.len() != columns.len() {
        return Err(ModelError::StructuralMisuse(format!(
            "{} variable names for {} columns",
            names.len(),
            columns.len()
        )));
    }
    let first_len = columns[0].len();
    if columns.iter().any(|column| column.len() != first_len) {
        return Err(ModelError::DimensionMismatch {
            columns: names
                .iter()
                .cloned()
                .zip(columns.iter().map(FactorColumn::len))
                .collect(),
        });
    }
    names
        .iter()
        .zip(columns)
        .map(|(name, column)| SimpleFactor::from_column(name, column))
        .collect()
}

fn interaction_name(factors: &[SimpleFactor]) -> String {
    factors
        .iter()
        .map(|factor| factor.name.as_str())
        .collect::<Vec<_>>()
        .join(NAME_SEPARATOR)
}
