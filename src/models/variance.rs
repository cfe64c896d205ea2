//! Independent variance structures for coefficient vectors.
//!
//! A variance structure owns one scalar variance with an inverse-gamma prior
//! and exposes per-coefficient prior precisions ("weights") to the
//! coefficient sampler.

use statrs::function::gamma::ln_gamma;

use crate::inference::GaussianSampler;
use crate::utils::usize_to_f64;

use super::types::ModelError;

/// Inverse-gamma prior on a variance parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariancePrior {
    pub shape: f64,
    pub scale: f64,
}

impl Default for VariancePrior {
    fn default() -> Self {
        Self {
            shape: 0.001,
            scale: 0.001,
        }
    }
}

impl VariancePrior {
    /// Whether both hyperparameters are positive and finite.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.shape > 0.0 && self.scale > 0.0 && self.shape.is_finite() && self.scale.is_finite()
    }
}

/// Log-density for an inverse-gamma distribution.
#[must_use]
pub fn log_inverse_gamma_density(value: f64, shape: f64, scale: f64) -> f64 {
    if !(value > 0.0 && shape > 0.0 && scale > 0.0) {
        return f64::NEG_INFINITY;
    }

    shape.mul_add(scale.ln(), -ln_gamma(shape)) - (shape + 1.0).mul_add(value.ln(), scale / value)
}

/// Shape of the prior covariance.
#[derive(Debug, Clone, PartialEq)]
pub enum VarianceKind {
    /// Every coefficient has variance `variance`.
    Iden,
    /// Coefficient `k` has variance `variance * diag[k]`.
    Diag(Vec<f64>),
}

/// Scalar variance with identity or fixed-diagonal scaling.
#[derive(Debug, Clone)]
pub struct IndependentVariance {
    kind: VarianceKind,
    prior: VariancePrior,
    variance: f64,
    weights: Vec<f64>,
}

impl IndependentVariance {
    /// Identity structure for `n` coefficients.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidPrior` for an invalid prior.
    pub fn iden(n: usize, prior: VariancePrior) -> Result<Self, ModelError> {
        Self::with_kind(VarianceKind::Iden, n, prior)
    }

    /// Diagonal structure scaled by `diag`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidPrior` for an invalid prior.
    pub fn diag(diag: Vec<f64>, prior: VariancePrior) -> Result<Self, ModelError> {
        let n = diag.len();
        Self::with_kind(VarianceKind::Diag(diag), n, prior)
    }

    fn with_kind(kind: VarianceKind, n: usize, prior: VariancePrior) -> Result<Self, ModelError> {
        if !prior.is_valid() {
            return Err(ModelError::InvalidPrior);
        }
        let mut structure = Self {
            kind,
            prior,
            variance: 1.0,
            weights: vec![0.0; n],
        };
        structure.restart();
        Ok(structure)
    }

    /// Prior precision of each coefficient.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[must_use]
    pub const fn variance(&self) -> f64 {
        self.variance
    }

    #[must_use]
    pub const fn kind(&self) -> &VarianceKind {
        &self.kind
    }

    /// Set the variance and recompute weights.
    pub fn set_variance(&mut self, variance: f64) {
        self.variance = variance;
        self.restart();
    }

    /// Recompute weights from the current variance.
    pub fn restart(&mut self) {
        let inv_variance = 1.0 / self.variance;
        match &self.kind {
            VarianceKind::Iden => self.weights.fill(inv_variance),
            VarianceKind::Diag(diag) => {
                for (weight, scale) in self.weights.iter_mut().zip(diag) {
                    *weight = inv_variance / scale;
                }
            }
        }
    }

    /// Draw the variance from its conditional posterior given `coefficients`,
    /// then recompute weights.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::DiagonalLengthMismatch` if `coefficients` has the
    /// wrong length and `ModelError::Inference` if the draw fails.
    pub fn sample(
        &mut self,
        coefficients: &[f64],
        rng: &mut impl GaussianSampler,
    ) -> Result<(), ModelError> {
        if coefficients.len() != self.weights.len() {
            return Err(ModelError::DiagonalLengthMismatch {
                diag: self.weights.len(),
                coefficients: coefficients.len(),
            });
        }
        let ssq: f64 = match &self.kind {
            VarianceKind::Iden => coefficients.iter().map(|c| c * c).sum(),
            VarianceKind::Diag(diag) => coefficients
                .iter()
                .zip(diag)
                .map(|(c, scale)| c * c / scale)
                .sum(),
        };
        let shape = 0.5f64.mul_add(usize_to_f64(coefficients.len()), self.prior.shape);
        let scale = 0.5f64.mul_add(ssq, self.prior.scale);
        self.variance = rng.inverse_gamma(shape, scale)?;
        self.restart();
        Ok(())
    }

    /// Log prior density of the current variance.
    #[must_use]
    pub fn log_prior_density(&self) -> f64 {
        log_inverse_gamma_density(self.variance, self.prior.shape, self.prior.scale)
    }
}
