//! # Model inputs
//!
//! Defines light-weight containers for categorical data columns, kernel
//! matrices, and the residual state shared by coefficient models.
//!
//! # Examples
//!
//! ```
//! use correlated_effects::FactorColumn;
//!
//! let column = FactorColumn::from_strs(&["b", "a", "b"]);
//! assert_eq!(column.len(), 3);
//! assert!(column.validate("animal").is_ok());
//! ```
//!
//! ```
//! use correlated_effects::Residuals;
//!
//! let residuals = Residuals::new(vec![0.5, -0.5], vec![1.0]);
//! assert!(residuals.is_err());
//! ```

use thiserror::Error;

pub mod kernel;

pub use kernel::{KernelInput, RetentionOptions};

/// Errors returned when validating model inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("data column {column} is empty")]
    EmptyColumn { column: String },
    #[error("factor column {column} has code {code} but only {levels} levels")]
    InvalidFactorCode {
        column: String,
        code: usize,
        levels: usize,
    },
    #[error("kernel {kernel} must be square; found {rows} x {cols}")]
    NonSquareKernel {
        kernel: String,
        rows: usize,
        cols: usize,
    },
    #[error("kernel {kernel} is empty")]
    EmptyKernel { kernel: String },
    #[error("kernel {kernel} contains non-finite values")]
    NonFiniteKernel { kernel: String },
    #[error("kernel {kernel} is not symmetric (max deviation {max_deviation:e})")]
    NonSymmetricKernel { kernel: String, max_deviation: f64 },
    #[error("there are no row labels on kernel {kernel}")]
    MissingRowLabels { kernel: String },
    #[error("row labels of kernel {kernel} have length {labels} but the matrix has {rows} rows")]
    RowLabelLengthMismatch {
        kernel: String,
        labels: usize,
        rows: usize,
    },
    #[error("row label {label} appears more than once in kernel {kernel}")]
    DuplicateRowLabel { kernel: String, label: String },
    #[error("residual values ({values}) and precisions ({precision}) must have equal length")]
    ResidualLengthMismatch { values: usize, precision: usize },
    #[error("residual precisions must be finite and non-negative")]
    InvalidResidualPrecision,
}

/// One categorical data column, convertible to a simple factor.
///
/// Missing entries are `None` and become a trailing `"NA"` level.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorColumn {
    /// Free text categories, levels sorted lexicographically.
    Text(Vec<Option<String>>),
    /// Integer categories, levels sorted numerically.
    Integer(Vec<Option<i64>>),
    /// Boolean categories with levels `FALSE` and `TRUE`.
    Logical(Vec<Option<bool>>),
    /// Already coded factor with 0-based codes into `levels`.
    Coded {
        codes: Vec<Option<usize>>,
        levels: Vec<String>,
    },
}

impl FactorColumn {
    /// Text column without missing values.
    #[must_use]
    pub fn from_strs(values: &[&str]) -> Self {
        Self::Text(values.iter().map(|value| Some((*value).to_string())).collect())
    }

    /// Integer column without missing values.
    #[must_use]
    pub fn from_ints(values: &[i64]) -> Self {
        Self::Integer(values.iter().copied().map(Some).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(values) => values.len(),
            Self::Integer(values) => values.len(),
            Self::Logical(values) => values.len(),
            Self::Coded { codes, .. } => codes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row values as strings, with missing entries rendered as `"NA"`.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::Text(values) => values
                .iter()
                .map(|value| value.clone().unwrap_or_else(|| MISSING_LABEL.to_string()))
                .collect(),
            Self::Integer(values) => values
                .iter()
                .map(|value| value.map_or_else(|| MISSING_LABEL.to_string(), |v| v.to_string()))
                .collect(),
            Self::Logical(values) => values
                .iter()
                .map(|value| match value {
                    Some(false) => "FALSE".to_string(),
                    Some(true) => "TRUE".to_string(),
                    None => MISSING_LABEL.to_string(),
                })
                .collect(),
            Self::Coded { codes, levels } => codes
                .iter()
                .map(|code| {
                    code.and_then(|code| levels.get(code).cloned())
                        .unwrap_or_else(|| MISSING_LABEL.to_string())
                })
                .collect(),
        }
    }

    /// Validate the column contents.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the column is empty or holds out-of-range codes.
    pub fn validate(&self, name: &str) -> Result<(), InputError> {
        if self.is_empty() {
            return Err(InputError::EmptyColumn {
                column: name.to_string(),
            });
        }
        if let Self::Coded { codes, levels } = self
            && let Some(code) = codes.iter().flatten().find(|code| **code >= levels.len())
        {
            return Err(InputError::InvalidFactorCode {
                column: name.to_string(),
                code: *code,
                levels: levels.len(),
            });
        }
        Ok(())
    }
}

/// Label used for missing categories.
pub const MISSING_LABEL: &str = "NA";

/// Residuals and per-observation residual precisions of the response model.
///
/// Coefficient models borrow this mutably for the duration of one update.
#[derive(Debug, Clone)]
pub struct Residuals {
    pub values: Vec<f64>,
    pub precision: Vec<f64>,
}

impl Residuals {
    /// # Errors
    ///
    /// Returns `InputError` if lengths differ or precisions are invalid.
    pub fn new(values: Vec<f64>, precision: Vec<f64>) -> Result<Self, InputError> {
        if values.len() != precision.len() {
            return Err(InputError::ResidualLengthMismatch {
                values: values.len(),
                precision: precision.len(),
            });
        }
        if precision.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(InputError::InvalidResidualPrecision);
        }
        Ok(Self { values, precision })
    }

    /// Residuals with a common precision for every observation.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the precision is invalid.
    pub fn with_common_precision(values: Vec<f64>, precision: f64) -> Result<Self, InputError> {
        let n = values.len();
        Self::new(values, vec![precision; n])
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
