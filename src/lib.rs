#![forbid(unsafe_code)]

//! # `correlated_effects`
//!
//! Kernel-based correlated random effects for Bayesian mixed models.
//!
//! A term couples one or more categorical variables with relationship
//! kernels between their levels (for example a genomic relationship matrix).
//! Each kernel is eigen-decomposed and truncated to its leading directions;
//! several kernels can be merged into their Kronecker product for
//! interaction effects. The observations are regressed on the retained
//! eigenvectors with one single-site Gibbs sweep per MCMC cycle.
//!
//! Building a term never installs a logger; notes and warnings go to a
//! [`BuildLog`] and the `log` facade.

pub mod inference;
pub mod input;
pub mod models;
pub mod utils;

pub use inference::{GaussianSampler, InferenceError, McmcConfig};
pub use input::{FactorColumn, InputError, KernelInput, Residuals, RetentionOptions};

pub use models::coefficients::{CoefficientSummary, CoefficientVector};
pub use models::correlated::{CorrelatedEffect, CorrelatedTermSpec};
pub use models::factor::{FactorEncoding, NonCollapsedEncoding, SimpleFactor};
pub use models::index::{LabelLookup, ObservationIndex};
pub use models::kernel::{DEFAULT_DIMP, KernelMatrix, Retention, positive_mass, resolve_retention};
pub use models::merge::{MergeFootprint, kronecker, merge_kernels};
pub use models::types::{
    BuildLog, BuildMessage, CorrelatedTermOptions, MessageLevel, ModelError, UnmatchedLevels,
};
pub use models::variance::{
    IndependentVariance, VarianceKind, VariancePrior, log_inverse_gamma_density,
};
