//! Correlated random effects regressed on kernel eigenvectors.
//!
//! A term with kernel `K ~ V diag(e) V'` is written as `u = V alpha` with
//! `alpha[k] ~ N(0, variance * e[k])`. Each Gibbs sweep draws every `alpha[k]`
//! from its conditional posterior, visiting the directions in order.

use crate::inference::GaussianSampler;
use crate::input::{FactorColumn, KernelInput, Residuals};
use crate::utils::{LABEL_SEPARATOR, NAME_SEPARATOR};

use super::coefficients::CoefficientVector;
use super::factor::FactorEncoding;
use super::index::ObservationIndex;
use super::kernel::KernelMatrix;
use super::merge::merge_kernels;
use super::types::{BuildLog, CorrelatedTermOptions, ModelError};
use super::variance::{IndependentVariance, VariancePrior};

/// Everything needed to build one correlated random-effect term.
#[derive(Debug, Clone)]
pub struct CorrelatedTermSpec {
    /// Names of the interacting variables, one per column.
    pub variable_names: Vec<String>,
    pub columns: Vec<FactorColumn>,
    /// One kernel per variable, in the same order.
    pub kernels: Vec<KernelInput>,
    pub options: CorrelatedTermOptions,
    pub prior: VariancePrior,
}

impl CorrelatedTermSpec {
    /// Single-variable term with default options.
    #[must_use]
    pub fn single(name: impl Into<String>, column: FactorColumn, kernel: KernelInput) -> Self {
        Self {
            variable_names: vec![name.into()],
            columns: vec![column],
            kernels: vec![kernel],
            options: CorrelatedTermOptions::default(),
            prior: VariancePrior::default(),
        }
    }
}

/// A correlated random-effect term ready for Gibbs sampling.
#[derive(Debug, Clone)]
pub struct CorrelatedEffect {
    name: String,
    kernel: KernelMatrix,
    encoding: FactorEncoding,
    index: ObservationIndex,
    alpha: CoefficientVector,
    effects: CoefficientVector,
    variance: IndependentVariance,
    fit: Vec<f64>,
}

impl CorrelatedEffect {
    /// Build the term: decompose (and optionally merge) the kernels, code the
    /// data, and map every observation to a kernel row.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::KernelCountMismatch` when kernels and variables
    /// differ in number, `ModelError::StructuralMisuse` for several kernels
    /// without `merge_kernels`, `ModelError::MemoryBudgetExceeded` when the
    /// merged kernel is too large, and `ModelError::UnmatchedLevels` when data
    /// levels are missing from the kernel. Kernel and column validation errors
    /// are propagated.
    pub fn build(spec: CorrelatedTermSpec, log: &mut BuildLog) -> Result<Self, ModelError> {
        let CorrelatedTermSpec {
            variable_names,
            columns,
            kernels,
            options,
            prior,
        } = spec;
        options.validate()?;
        if kernels.is_empty() {
            return Err(ModelError::StructuralMisuse(
                "a correlated term needs at least one kernel".to_string(),
            ));
        }
        if kernels.len() != columns.len() {
            return Err(ModelError::KernelCountMismatch {
                factors: columns.len(),
                kernels: kernels.len(),
            });
        }
        if kernels.len() > 1 && !options.merge_kernels {
            return Err(ModelError::StructuralMisuse(format!(
                "{} kernels were given without merging; unmerged kernel products are not supported",
                kernels.len()
            )));
        }

        let default_dimp = options.per_kernel_dimp(kernels.len());
        let mut decomposed = kernels
            .iter()
            .map(|input| KernelMatrix::from_input(input, default_dimp, log))
            .collect::<Result<Vec<_>, _>>()?;
        let kernel = if decomposed.len() == 1 {
            decomposed.pop().ok_or_else(|| {
                ModelError::StructuralMisuse("kernel list emptied unexpectedly".to_string())
            })?
        } else {
            merge_kernels(decomposed, options, log)?
        };

        let encoding = FactorEncoding::from_columns(&variable_names, &columns)?;
        let index = ObservationIndex::build(&encoding, &kernel)?;

        let name = variable_names.join(NAME_SEPARATOR);
        let parameter = variable_names.join(LABEL_SEPARATOR);
        let alpha = CoefficientVector::new(
            format!("{parameter}.alpha"),
            kernel.column_labels.clone(),
        );
        let effects = CoefficientVector::new(parameter, kernel.row_labels.clone());
        let variance = IndependentVariance::diag(kernel.eigenvalues.clone(), prior)?;
        let fit = vec![0.0; index.len()];
        log.note(format!(
            "correlated term {name}: {} observations, {} kernel rows, {} regressions",
            index.len(),
            kernel.nrow(),
            kernel.ncol()
        ));

        Ok(Self {
            name,
            kernel,
            encoding,
            index,
            alpha,
            effects,
            variance,
            fit,
        })
    }

    /// One Gibbs sweep over all eigen-directions.
    ///
    /// On return `resid` holds the residuals with the new fit removed.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ObservationCountMismatch` if `resid` does not
    /// cover the term's observations, and `ModelError::Inference` if a draw fails.
    pub fn sample(
        &mut self,
        resid: &mut Residuals,
        rng: &mut impl GaussianSampler,
    ) -> Result<(), ModelError> {
        if resid.len() != self.index.len() {
            return Err(ModelError::ObservationCountMismatch {
                factor: self.index.len(),
                residuals: resid.len(),
            });
        }
        let rows = &self.index.rows;
        let vectors = &self.kernel.eigenvectors;
        let weights = self.variance.weights();

        self.fit.fill(0.0);
        // fit only holds directions already drawn in this sweep
        for (col, alpha) in self.alpha.values.iter_mut().enumerate() {
            let mut lhs = 0.0;
            let mut rhs = 0.0;
            for (obs, row) in rows.iter().enumerate() {
                let x = vectors[(*row, col)];
                resid.values[obs] += *alpha * x;
                let weighted = x * resid.precision[obs];
                lhs += weighted * x;
                rhs += weighted * (resid.values[obs] - self.fit[obs]);
            }
            lhs += weights[col];
            *alpha = rng.normal(rhs / lhs, (1.0 / lhs).sqrt())?;
            for (obs, row) in rows.iter().enumerate() {
                self.fit[obs] += *alpha * vectors[(*row, col)];
            }
        }
        for (value, fitted) in resid.values.iter_mut().zip(&self.fit) {
            *value -= fitted;
        }
        Ok(())
    }

    /// Draw the variance given the current coefficients.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Inference` if the draw fails.
    pub fn sample_hpars(&mut self, rng: &mut impl GaussianSampler) -> Result<(), ModelError> {
        self.variance.sample(&self.alpha.values, rng)
    }

    /// Refresh the variance weights from the current (or loaded) variance.
    ///
    /// Coefficients and fit are left alone: the shared residuals still have
    /// the current fit removed, and the next sweep adds it back.
    pub fn restart(&mut self) {
        self.variance.restart();
    }

    /// Clear the running posterior statistics, e.g. after burn-in.
    pub fn reset_stats(&mut self) {
        self.alpha.reset_stats();
        self.effects.reset_stats();
    }

    /// Project the coefficients onto the kernel rows.
    ///
    /// This gives one effect per kernel entity, including entities without
    /// observations.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::DiagonalLengthMismatch` if the coefficient vector
    /// no longer matches the kernel.
    pub fn prep_for_output(&mut self) -> Result<(), ModelError> {
        self.effects.values = self.kernel.project(&self.alpha.values)?;
        Ok(())
    }

    /// Fold the current coefficients and projected effects into the
    /// running posterior statistics.
    pub fn collect_stats(&mut self) {
        self.alpha.collect_stats();
        self.effects.collect_stats();
    }

    /// Fitted values are produced by [`Self::sample`]; nothing to do here.
    pub const fn fill_fit(&mut self) {}

    /// Fitted values of the last sweep, one per observation.
    #[must_use]
    pub fn fit(&self) -> &[f64] {
        &self.fit
    }

    /// Fitted values recomputed from the current coefficients.
    #[must_use]
    pub fn recompute_fit(&self) -> Vec<f64> {
        self.index
            .rows
            .iter()
            .map(|row| {
                self.alpha
                    .values
                    .iter()
                    .enumerate()
                    .map(|(col, alpha)| alpha * self.kernel.eigenvectors[(*row, col)])
                    .sum()
            })
            .collect()
    }

    /// Term name; interacting variables are joined with `:`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kernel(&self) -> &KernelMatrix {
        &self.kernel
    }

    #[must_use]
    pub const fn encoding(&self) -> &FactorEncoding {
        &self.encoding
    }

    #[must_use]
    pub const fn index(&self) -> &ObservationIndex {
        &self.index
    }

    /// Coefficients on the retained eigen-directions.
    #[must_use]
    pub const fn alpha(&self) -> &CoefficientVector {
        &self.alpha
    }

    /// Per-entity effects, filled by [`Self::prep_for_output`].
    #[must_use]
    pub const fn effects(&self) -> &CoefficientVector {
        &self.effects
    }

    #[must_use]
    pub const fn variance(&self) -> &IndependentVariance {
        &self.variance
    }

    /// Mutable access to the variance structure, e.g. to set a starting value.
    pub const fn variance_mut(&mut self) -> &mut IndependentVariance {
        &mut self.variance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RetentionOptions;
    use crate::utils::generate_labels;
    use approx::assert_relative_eq;
    use faer::Mat;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Draws every normal at its mean.
    struct NoNoise;

    impl GaussianSampler for NoNoise {
        fn uniform(&mut self) -> f64 {
            0.5
        }

        fn standard_normal(&mut self) -> f64 {
            0.0
        }
    }

    fn diagonal_kernel(name: &str, values: &[f64], labels: Vec<String>) -> KernelInput {
        let n = values.len();
        let matrix = Mat::from_fn(n, n, |i, j| if i == j { values[i] } else { 0.0 });
        KernelInput::new(name, matrix, labels)
    }

    fn dense_kernel(name: &str, n: usize, labels: Vec<String>) -> KernelInput {
        let matrix = Mat::from_fn(n, n, |i, j| {
            let distance = f64::from(u32::try_from(i.abs_diff(j)).unwrap_or(u32::MAX));
            0.6_f64.powf(distance)
        });
        KernelInput::new(name, matrix, labels)
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn one_direction_term() -> CorrelatedEffect {
        let kernel = diagonal_kernel("grm", &[4.0, 1.0], strings(&["id1", "id2"]))
            .with_retention(RetentionOptions::with_dim(1));
        let spec = CorrelatedTermSpec::single(
            "animal",
            FactorColumn::from_strs(&["id1", "id1", "id2"]),
            kernel,
        );
        CorrelatedEffect::build(spec, &mut BuildLog::new()).expect("valid term")
    }

    #[test]
    fn single_direction_draw_is_conditional_mean() {
        let mut term = one_direction_term();
        let mut resid = Residuals::new(vec![1.0, 2.0, 3.0], vec![1.0; 3]).expect("valid");
        term.sample(&mut resid, &mut NoNoise).expect("sweep");

        // weight = 1 / (variance 1 * eigenvalue 4)
        let expected = 3.0 / 2.25;
        assert_relative_eq!(term.alpha().values[0].abs(), expected, epsilon = 1.0e-12);
        assert_relative_eq!(term.fit()[0], expected, epsilon = 1.0e-12);
        assert_relative_eq!(term.fit()[2], 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(resid.values[0], 1.0 - expected, epsilon = 1.0e-12);
        assert_relative_eq!(resid.values[1], 2.0 - expected, epsilon = 1.0e-12);
        assert_relative_eq!(resid.values[2], 3.0, epsilon = 1.0e-12);
    }

    #[test]
    fn repeated_sweep_removes_previous_contribution_first() {
        let mut term = one_direction_term();
        let mut resid = Residuals::new(vec![1.0, 2.0, 3.0], vec![2.0, 1.0, 1.0]).expect("valid");
        term.sample(&mut resid, &mut NoNoise).expect("first sweep");
        let after_first = resid.values.clone();
        let alpha_first = term.alpha().values[0];
        term.sample(&mut resid, &mut NoNoise).expect("second sweep");
        assert_relative_eq!(term.alpha().values[0], alpha_first, epsilon = 1.0e-12);
        for (a, b) in after_first.iter().zip(&resid.values) {
            assert_relative_eq!(a, b, epsilon = 1.0e-12);
        }
    }

    #[test]
    fn sweep_subtracts_recomputed_fit_from_residuals() {
        let labels = generate_labels("id", 6);
        let kernel = dense_kernel("grm", 6, labels)
            .with_retention(RetentionOptions::with_dimp(95.0));
        let column = FactorColumn::from_strs(&["id1", "id3", "id3", "id6", "id2", "id5", "id1"]);
        let mut term = CorrelatedEffect::build(
            CorrelatedTermSpec::single("animal", column, kernel),
            &mut BuildLog::new(),
        )
        .expect("valid term");
        assert!(term.kernel().ncol() > 1);

        let mut rng = StdRng::seed_from_u64(21);
        let original = vec![0.3, -1.2, 0.8, 2.0, -0.4, 0.1, 1.5];
        let mut resid =
            Residuals::with_common_precision(original.clone(), 1.5).expect("valid residuals");
        term.sample(&mut resid, &mut rng).expect("sweep");

        let recomputed = term.recompute_fit();
        for obs in 0..original.len() {
            assert_relative_eq!(
                resid.values[obs],
                original[obs] - recomputed[obs],
                epsilon = 1.0e-10
            );
            assert_relative_eq!(term.fit()[obs], recomputed[obs], epsilon = 1.0e-10);
        }
    }

    #[test]
    fn prep_for_output_projects_onto_every_kernel_row() {
        let labels = generate_labels("id", 4);
        let kernel = dense_kernel("grm", 4, labels.clone());
        let column = FactorColumn::from_strs(&["id1", "id2"]);
        let mut term = CorrelatedEffect::build(
            CorrelatedTermSpec::single("animal", column, kernel),
            &mut BuildLog::new(),
        )
        .expect("valid term");
        let mut resid = Residuals::with_common_precision(vec![1.0, -1.0], 1.0).expect("valid");
        term.sample(&mut resid, &mut StdRng::seed_from_u64(2))
            .expect("sweep");
        term.prep_for_output().expect("projection");

        assert_eq!(term.effects().labels, labels);
        let expected = term.kernel().project(&term.alpha().values).expect("projection");
        assert_eq!(term.effects().values, expected);
        let fitted = term.recompute_fit();
        assert_relative_eq!(term.effects().values[0], fitted[0], epsilon = 1.0e-12);
        assert_relative_eq!(term.effects().values[1], fitted[1], epsilon = 1.0e-12);
    }

    #[test]
    fn hyperparameter_draw_refreshes_weights() {
        let mut term = one_direction_term();
        let mut rng = StdRng::seed_from_u64(9);
        let mut resid = Residuals::with_common_precision(vec![1.0, 2.0, 3.0], 1.0).expect("valid");
        term.sample(&mut resid, &mut rng).expect("sweep");
        term.sample_hpars(&mut rng).expect("variance draw");
        let variance = term.variance().variance();
        assert!(variance > 0.0);
        assert_relative_eq!(
            term.variance().weights()[0],
            1.0 / (variance * 4.0),
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn restart_refreshes_weights_and_keeps_coefficients() {
        let mut term = one_direction_term();
        let mut resid = Residuals::with_common_precision(vec![1.0, 2.0, 3.0], 1.0).expect("valid");
        term.sample(&mut resid, &mut NoNoise).expect("sweep");
        term.collect_stats();
        let alpha = term.alpha().values.clone();
        let fit = term.fit().to_vec();

        term.variance_mut().set_variance(2.0);
        term.restart();
        assert_eq!(term.alpha().values, alpha);
        assert_eq!(term.fit(), fit.as_slice());
        assert_eq!(term.alpha().draws(), 1);
        assert_relative_eq!(term.variance().weights()[0], 1.0 / 8.0, epsilon = 1.0e-12);

        term.reset_stats();
        assert_eq!(term.alpha().draws(), 0);
        assert_eq!(term.alpha().values, alpha);
    }

    #[test]
    fn residuals_stay_consistent_across_restart() {
        let kernel = dense_kernel("grm", 3, generate_labels("id", 3))
            .with_retention(RetentionOptions::with_dim(3));
        let column = FactorColumn::from_strs(&["id1", "id2", "id3", "id1"]);
        let mut term = CorrelatedEffect::build(
            CorrelatedTermSpec::single("animal", column, kernel),
            &mut BuildLog::new(),
        )
        .expect("valid term");

        let mut rng = StdRng::seed_from_u64(5);
        let y = vec![2.5, -1.0, 2.0, 3.5];
        let mut resid = Residuals::with_common_precision(y.clone(), 1.0).expect("valid");
        term.sample(&mut resid, &mut rng).expect("first sweep");
        term.restart();
        term.sample(&mut resid, &mut rng).expect("second sweep");

        let fitted = term.recompute_fit();
        for obs in 0..y.len() {
            assert_relative_eq!(resid.values[obs], y[obs] - fitted[obs], epsilon = 1.0e-10);
        }
    }

    #[test]
    fn residual_length_must_match_observations() {
        let mut term = one_direction_term();
        let mut resid = Residuals::with_common_precision(vec![1.0], 1.0).expect("valid");
        let err = term
            .sample(&mut resid, &mut NoNoise)
            .expect_err("length mismatch");
        assert_eq!(
            err,
            ModelError::ObservationCountMismatch {
                factor: 3,
                residuals: 1
            }
        );
    }

    #[test]
    fn merged_term_indexes_pasted_levels() {
        let spec = CorrelatedTermSpec {
            variable_names: strings(&["A", "B"]),
            columns: vec![
                FactorColumn::from_strs(&["a1", "a1", "a2", "a2"]),
                FactorColumn::from_strs(&["b1", "b2", "b1", "b2"]),
            ],
            kernels: vec![
                diagonal_kernel("ka", &[2.0, 1.0], strings(&["a1", "a2"])),
                diagonal_kernel("kb", &[3.0, 1.0], strings(&["b1", "b2"])),
            ],
            options: CorrelatedTermOptions {
                vdimp: Some(100.0),
                merge_kernels: true,
                ..CorrelatedTermOptions::default()
            },
            prior: VariancePrior::default(),
        };
        let term = CorrelatedEffect::build(spec, &mut BuildLog::new()).expect("valid term");
        assert_eq!(term.name(), "A:B");
        assert_eq!(term.alpha().name, "A.B.alpha");
        assert_eq!(term.effects().name, "A.B");
        assert_eq!(term.encoding().level_codes, vec![0, 1, 2, 3]);
        assert_eq!(
            term.kernel().row_labels,
            strings(&["a1.b1", "a1.b2", "a2.b1", "a2.b2"])
        );
        assert_eq!(term.index().rows, vec![0, 1, 2, 3]);
        assert_eq!(term.kernel().ncol(), 4);
        assert_relative_eq!(term.kernel().eigenvalues[0], 6.0, epsilon = 1.0e-10);
    }

    #[test]
    fn several_kernels_require_merging() {
        let spec = CorrelatedTermSpec {
            variable_names: strings(&["A", "B"]),
            columns: vec![
                FactorColumn::from_strs(&["a1"]),
                FactorColumn::from_strs(&["b1"]),
            ],
            kernels: vec![
                diagonal_kernel("ka", &[1.0], strings(&["a1"])),
                diagonal_kernel("kb", &[1.0], strings(&["b1"])),
            ],
            options: CorrelatedTermOptions::default(),
            prior: VariancePrior::default(),
        };
        let err = CorrelatedEffect::build(spec, &mut BuildLog::new()).expect_err("not merged");
        assert!(matches!(err, ModelError::StructuralMisuse(_)));
    }

    #[test]
    fn kernel_count_must_match_variables() {
        let spec = CorrelatedTermSpec {
            variable_names: strings(&["A", "B"]),
            columns: vec![
                FactorColumn::from_strs(&["a1"]),
                FactorColumn::from_strs(&["b1"]),
            ],
            kernels: vec![diagonal_kernel("ka", &[1.0], strings(&["a1"]))],
            options: CorrelatedTermOptions::default(),
            prior: VariancePrior::default(),
        };
        let err = CorrelatedEffect::build(spec, &mut BuildLog::new()).expect_err("1 kernel, 2 vars");
        assert_eq!(
            err,
            ModelError::KernelCountMismatch {
                factors: 2,
                kernels: 1
            }
        );
    }

    #[test]
    fn unknown_levels_fail_the_build() {
        let spec = CorrelatedTermSpec::single(
            "animal",
            FactorColumn::from_strs(&["id1", "ghost"]),
            diagonal_kernel("grm", &[1.0, 1.0], strings(&["id1", "id2"])),
        );
        let err = CorrelatedEffect::build(spec, &mut BuildLog::new()).expect_err("unmatched");
        assert!(matches!(err, ModelError::UnmatchedLevels(_)));
    }
}
