//! Reusable inference and MCMC utility types.
//!
//! The Gibbs updates in this crate draw their random variates through
//! [`GaussianSampler`], so tests can substitute a deterministic source.

use rand::rngs::StdRng;
use rand::RngExt;
use thiserror::Error;

/// Errors for generic MCMC configuration and random variate generation.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum InferenceError {
    #[error("iterations must be positive")]
    InvalidIterations,
    #[error("burn-in ({burn_in}) must be smaller than iterations ({iterations})")]
    InvalidBurnIn { burn_in: usize, iterations: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error("gamma parameters must be positive and finite (shape {shape}, scale {scale})")]
    InvalidGammaParameters { shape: f64, scale: f64 },
    #[error("normal standard deviation must be non-negative and finite, got {sd}")]
    InvalidStandardDeviation { sd: f64 },
}

/// Generic MCMC schedule.
#[derive(Debug, Clone, Copy)]
pub struct McmcConfig {
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub seed: u64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            iterations: 4_000,
            burn_in: 1_000,
            thin: 4,
            seed: 42,
        }
    }
}

impl McmcConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.iterations == 0 {
            return Err(InferenceError::InvalidIterations);
        }
        if self.burn_in >= self.iterations {
            return Err(InferenceError::InvalidBurnIn {
                burn_in: self.burn_in,
                iterations: self.iterations,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        Ok(())
    }

    /// Number of retained draws implied by this configuration.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        (self.iterations - self.burn_in) / self.thin
    }

    /// Whether the zero-based `cycle` is past burn-in and on the thinning grid.
    #[must_use]
    pub const fn is_output_cycle(self, cycle: usize) -> bool {
        cycle >= self.burn_in && (cycle - self.burn_in) % self.thin == 0
    }
}

/// Source of the random variates needed by conjugate Gibbs updates.
pub trait GaussianSampler {
    /// Uniform draw on `[0, 1)`.
    fn uniform(&mut self) -> f64;

    fn standard_normal(&mut self) -> f64 {
        let u1 = (1.0_f64 - self.uniform()).max(f64::MIN_POSITIVE);
        let u2 = self.uniform();
        (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Normal draw with the given mean and standard deviation.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError::InvalidStandardDeviation` for negative or
    /// non-finite `sd`.
    fn normal(&mut self, mean: f64, sd: f64) -> Result<f64, InferenceError> {
        if !(sd.is_finite() && sd >= 0.0) {
            return Err(InferenceError::InvalidStandardDeviation { sd });
        }
        Ok(sd.mul_add(self.standard_normal(), mean))
    }

    /// Gamma draw with `shape` and `scale` (mean `shape * scale`).
    ///
    /// # Errors
    ///
    /// Returns `InferenceError::InvalidGammaParameters` unless both
    /// parameters are positive and finite.
    fn gamma(&mut self, shape: f64, scale: f64) -> Result<f64, InferenceError> {
        if !(shape > 0.0 && scale > 0.0 && shape.is_finite() && scale.is_finite()) {
            return Err(InferenceError::InvalidGammaParameters { shape, scale });
        }
        if shape < 1.0 {
            let u = (1.0_f64 - self.uniform()).max(f64::MIN_POSITIVE);
            return Ok(self.gamma(shape + 1.0, scale)? * u.powf(1.0 / shape));
        }

        let shape_minus_third = shape - (1.0 / 3.0);
        let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
        loop {
            let standard_normal = self.standard_normal();
            let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
            if one_plus_coeff_noise <= 0.0 {
                continue;
            }
            let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
            let uniform = self.uniform();
            if uniform
                < (0.0331 * standard_normal * standard_normal * standard_normal)
                    .mul_add(-standard_normal, 1.0)
            {
                return Ok(scale * shape_minus_third * cubic_term);
            }
            let log_uniform = uniform.max(f64::MIN_POSITIVE).ln();
            let acceptance = (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            );
            if log_uniform < acceptance {
                return Ok(scale * shape_minus_third * cubic_term);
            }
        }
    }

    /// Inverse-gamma draw: the reciprocal of a gamma draw with
    /// `shape` and scale `1 / scale`.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError::InvalidGammaParameters` for invalid parameters.
    fn inverse_gamma(&mut self, shape: f64, scale: f64) -> Result<f64, InferenceError> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(InferenceError::InvalidGammaParameters { shape, scale });
        }
        let draw = self.gamma(shape, 1.0 / scale)?;
        Ok(1.0 / draw.max(f64::MIN_POSITIVE))
    }
}

impl GaussianSampler for StdRng {
    fn uniform(&mut self) -> f64 {
        self.random::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn config_validation_rejects_zero_iterations() {
        let config = McmcConfig {
            iterations: 0,
            ..McmcConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidIterations));
    }

    #[test]
    fn output_cycles_follow_burn_in_and_thinning() {
        let config = McmcConfig {
            iterations: 20,
            burn_in: 10,
            thin: 5,
            seed: 1,
        };
        assert!(!config.is_output_cycle(5));
        assert!(config.is_output_cycle(10));
        assert!(!config.is_output_cycle(12));
        assert!(config.is_output_cycle(15));
        assert_eq!(config.retained_draws(), 2);
    }

    #[test]
    fn normal_draws_have_expected_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| rng.normal(2.0, 0.5).expect("valid sd"))
            .collect();
        let n = f64::from(u32::try_from(draws.len()).expect("small sample"));
        let mean = draws.iter().sum::<f64>() / n;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert_relative_eq!(mean, 2.0, epsilon = 0.02);
        assert_relative_eq!(var, 0.25, epsilon = 0.02);
    }

    #[test]
    fn gamma_draws_match_mean_for_small_and_large_shape() {
        let mut rng = StdRng::seed_from_u64(11);
        for (shape, scale) in [(0.5, 2.0), (3.0, 0.5)] {
            let total: f64 = (0..20_000)
                .map(|_| rng.gamma(shape, scale).expect("valid parameters"))
                .sum();
            assert_relative_eq!(total / 20_000.0, shape * scale, epsilon = 0.05);
        }
    }

    #[test]
    fn inverse_gamma_draws_are_positive() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let draw = rng.inverse_gamma(2.5, 1.5).expect("valid parameters");
            assert!(draw > 0.0);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            rng.gamma(0.0, 1.0),
            Err(InferenceError::InvalidGammaParameters { .. })
        ));
        assert!(matches!(
            rng.normal(0.0, -1.0),
            Err(InferenceError::InvalidStandardDeviation { .. })
        ));
    }
}
