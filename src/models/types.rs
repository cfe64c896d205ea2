//! Core public types shared by the correlated-effect model components.

use std::fmt;

use thiserror::Error;

use crate::inference::InferenceError;
use crate::input::InputError;

/// Number of offending labels listed in an unmatched-level report.
pub const UNMATCHED_PREVIEW: usize = 10;

/// Errors returned while building or updating a model term.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("interacting variables have unequal lengths: {}", format_lengths(.columns))]
    DimensionMismatch { columns: Vec<(String, usize)> },
    #[error("{0}")]
    UnmatchedLevels(UnmatchedLevels),
    #[error(
        "merged kernel needs {needed_bytes} bytes, exceeding the memory budget of {budget_bytes} bytes"
    )]
    MemoryBudgetExceeded { needed_bytes: u128, budget_bytes: u64 },
    #[error("structural misuse: {0}")]
    StructuralMisuse(String),
    #[error("eigen-decomposition failed: {0}")]
    EigenDecompositionFailed(String),
    #[error("kernel {kernel} has no positive eigenvalues")]
    NoPositiveEigenvalues { kernel: String },
    #[error("{factors} interacting variables but {kernels} kernels were supplied")]
    KernelCountMismatch { factors: usize, kernels: usize },
    #[error("vdimp must lie between 10 and 100, got {value}")]
    InvalidVarianceRetention { value: f64 },
    #[error("diagonal variance has {diag} entries but the coefficient vector has {coefficients}")]
    DiagonalLengthMismatch { diag: usize, coefficients: usize },
    #[error("factor covers {factor} observations but residuals hold {residuals}")]
    ObservationCountMismatch { factor: usize, residuals: usize },
    #[error("variance prior shape and scale must be positive and finite")]
    InvalidPrior,
}

fn format_lengths(columns: &[(String, usize)]) -> String {
    columns
        .iter()
        .map(|(name, len)| format!("{name} ({len})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Observation labels that have no matching kernel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedLevels {
    /// Where the lookup took place, e.g. a kernel name.
    pub context: String,
    /// Up to [`UNMATCHED_PREVIEW`] distinct labels, in first-seen order.
    pub preview: Vec<String>,
    /// Number of distinct unmatched labels not shown in `preview`.
    pub remaining: usize,
}

impl UnmatchedLevels {
    /// Build a report from distinct labels in first-seen order.
    #[must_use]
    pub fn from_distinct(context: impl Into<String>, mut labels: Vec<String>) -> Self {
        let remaining = labels.len().saturating_sub(UNMATCHED_PREVIEW);
        labels.truncate(UNMATCHED_PREVIEW);
        Self {
            context: context.into(),
            preview: labels,
            remaining,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.preview.len() + self.remaining
    }
}

impl fmt::Display for UnmatchedLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data has levels not present in {}: {}",
            self.context,
            self.preview.join(" ")
        )?;
        if self.remaining > 0 {
            write!(f, " ... and {} more", self.remaining)?;
        }
        Ok(())
    }
}

/// Severity of a [`BuildMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Note,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMessage {
    pub level: MessageLevel,
    pub text: String,
}

/// Human-readable notes and recoverable warnings collected during a model build.
///
/// Every entry is also forwarded to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct BuildLog {
    messages: Vec<BuildMessage>,
}

impl BuildLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn note(&mut self, text: impl Into<String>) {
        let text = text.into();
        log::info!("{text}");
        self.messages.push(BuildMessage {
            level: MessageLevel::Note,
            text,
        });
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        log::warn!("{text}");
        self.messages.push(BuildMessage {
            level: MessageLevel::Warning,
            text,
        });
    }

    #[must_use]
    pub fn messages(&self) -> &[BuildMessage] {
        &self.messages
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|message| message.level == MessageLevel::Warning)
            .map(|message| message.text.as_str())
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }
}

/// Options for a correlated random-effect term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelatedTermOptions {
    /// Total variance percentage to retain across merged kernels (10 to 100).
    pub vdimp: Option<f64>,
    /// Combine several kernels into one Kronecker product kernel.
    pub merge_kernels: bool,
    /// Ceiling on the merged eigenvector buffer, in bytes.
    pub max_mem_bytes: u64,
    /// Merged column count above which a warning is logged.
    pub large_regression_warning: usize,
}

impl Default for CorrelatedTermOptions {
    fn default() -> Self {
        Self {
            vdimp: None,
            merge_kernels: false,
            max_mem_bytes: 4_000_000_000,
            large_regression_warning: 100_000,
        }
    }
}

impl CorrelatedTermOptions {
    /// # Errors
    ///
    /// Returns `ModelError::InvalidVarianceRetention` if `vdimp` is outside `[10, 100]`.
    pub fn validate(self) -> Result<(), ModelError> {
        if let Some(value) = self.vdimp
            && !(10.0..=100.0).contains(&value)
        {
            return Err(ModelError::InvalidVarianceRetention { value });
        }
        Ok(())
    }

    /// Default per-kernel retention percentage when `n_kernels` kernels are merged.
    ///
    /// The per-kernel fractions multiply back to `vdimp` (or 90%).
    #[must_use]
    pub fn per_kernel_dimp(self, n_kernels: usize) -> f64 {
        let total = self.vdimp.unwrap_or(90.0) / 100.0;
        let n = i32::try_from(n_kernels.max(1)).unwrap_or(i32::MAX);
        100.0 * total.powf(1.0 / f64::from(n))
    }
}
