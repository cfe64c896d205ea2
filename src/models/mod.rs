//! # Models
//!
//! Correlated random-effect terms for Bayesian mixed models: level coding of
//! interacting factors, eigen-truncated kernels, Kronecker merging of
//! kernels, observation indexing, and the single-site Gibbs sampler.

pub mod coefficients;
pub mod correlated;
pub mod factor;
pub mod index;
pub mod kernel;
pub mod merge;
pub mod types;
pub mod variance;
