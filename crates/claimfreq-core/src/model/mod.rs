// =============================================================================
// Fitted Model
// =============================================================================
//
// `FittedModel` is what a fit hands back. It is immutable: everything is
// computed once by the solver, and the accessors below only read or derive
// from it.
//
// Aliased coefficients are carried through every view:
//   - `coefficients()`       -> `Coefficient::Aliased`
//   - `params()`             -> NaN
//   - `coefficient_table()`  -> `None` statistics
//   - `predict()`            -> zero contribution
//
// Degrees of freedom count only estimable columns: df_resid = n - rank.
//
// =============================================================================

mod coefficient;

pub use coefficient::{Coefficient, CoefficientSummary, FitWarning};

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::diagnostics::{
    aic, bic, estimate_dispersion_pearson, pearson_chi2, randomized_quantile_residuals,
    resid_deviance, resid_pearson, resid_response, resid_working, QuantileResiduals,
    ResidualFallback,
};
use crate::error::{ClaimFreqError, Result};
use crate::families::FamilyKind;
use crate::inference::{
    confidence_interval_t, confidence_interval_z, pvalue_t, pvalue_z, significance_stars,
};
use crate::links::LinkFunction;

/// Result of fitting a Poisson-type GLM.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub(crate) coefficients: Vec<Coefficient>,
    pub(crate) column_names: Vec<String>,
    pub(crate) family: FamilyKind,
    pub(crate) link: LinkFunction,
    pub(crate) y: Array1<f64>,
    pub(crate) fitted_values: Array1<f64>,
    pub(crate) linear_predictor: Array1<f64>,
    pub(crate) prior_weights: Array1<f64>,
    pub(crate) offset: Array1<f64>,
    pub(crate) irls_weights: Array1<f64>,
    pub(crate) covariance_unscaled: Array2<f64>,
    pub(crate) deviance: f64,
    pub(crate) null_deviance: f64,
    pub(crate) iterations: usize,
    pub(crate) converged: bool,
    pub(crate) rank: usize,
    pub(crate) has_intercept: bool,
    pub(crate) warnings: Vec<FitWarning>,
}

impl FittedModel {
    // =========================================================================
    // Coefficients
    // =========================================================================

    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Attach design column names (defaults are `x0`, `x1`, ...).
    pub fn with_column_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.coefficients.len() {
            return Err(ClaimFreqError::DimensionMismatch(format!(
                "{} column names for {} coefficients",
                names.len(),
                self.coefficients.len()
            )));
        }
        self.column_names = names;
        Ok(self)
    }

    /// Coefficients as numbers, NaN where aliased.
    pub fn params(&self) -> Array1<f64> {
        self.coefficients.iter().map(|c| c.value().unwrap_or(f64::NAN)).collect()
    }

    /// Indices of aliased design columns.
    pub fn aliased_columns(&self) -> Vec<usize> {
        (0..self.coefficients.len())
            .filter(|&j| self.coefficients[j].is_aliased())
            .collect()
    }

    // =========================================================================
    // Fit state
    // =========================================================================

    pub fn family(&self) -> FamilyKind {
        self.family
    }

    pub fn link(&self) -> LinkFunction {
        self.link
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn fitted_values(&self) -> &Array1<f64> {
        &self.fitted_values
    }

    /// η = Xβ + offset on the training data.
    pub fn linear_predictor(&self) -> &Array1<f64> {
        &self.linear_predictor
    }

    pub fn prior_weights(&self) -> &Array1<f64> {
        &self.prior_weights
    }

    pub fn offset(&self) -> &Array1<f64> {
        &self.offset
    }

    pub fn irls_weights(&self) -> &Array1<f64> {
        &self.irls_weights
    }

    /// (X'WX)⁻¹ from the final iteration, NaN in aliased rows and columns.
    pub fn covariance_unscaled(&self) -> &Array2<f64> {
        &self.covariance_unscaled
    }

    pub fn deviance(&self) -> f64 {
        self.deviance
    }

    /// Deviance of the intercept-only model with the same offset and weights.
    pub fn null_deviance(&self) -> f64 {
        self.null_deviance
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Number of estimable (non-aliased) coefficients.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn has_intercept(&self) -> bool {
        self.has_intercept
    }

    pub fn warnings(&self) -> &[FitWarning] {
        &self.warnings
    }

    pub fn nobs(&self) -> usize {
        self.y.len()
    }

    pub fn n_params(&self) -> usize {
        self.coefficients.len()
    }

    pub fn df_resid(&self) -> usize {
        self.nobs().saturating_sub(self.rank)
    }

    pub fn df_model(&self) -> usize {
        self.rank.saturating_sub(usize::from(self.has_intercept))
    }

    // =========================================================================
    // Dispersion, likelihood, information criteria
    // =========================================================================

    /// Dispersion φ: 1 for Poisson, Pearson X² / df_resid for quasi-Poisson.
    pub fn scale(&self) -> f64 {
        let family = self.family.as_family();
        if family.fixed_dispersion() {
            1.0
        } else {
            estimate_dispersion_pearson(
                &self.y,
                &self.fitted_values,
                family,
                self.df_resid(),
                Some(&self.prior_weights),
            )
        }
    }

    pub fn pearson_chi2(&self) -> f64 {
        pearson_chi2(&self.y, &self.fitted_values, self.family.as_family(), Some(&self.prior_weights))
    }

    /// Log-likelihood (NaN for quasi-Poisson).
    pub fn llf(&self) -> f64 {
        self.family
            .as_family()
            .log_likelihood(&self.y, &self.fitted_values, Some(&self.prior_weights))
    }

    pub fn aic(&self) -> f64 {
        aic(self.llf(), self.rank)
    }

    pub fn bic(&self) -> f64 {
        bic(self.llf(), self.rank, self.nobs())
    }

    // =========================================================================
    // Inference
    // =========================================================================

    /// Standard errors √(φ · diag((X'WX)⁻¹)); `None` for aliased columns.
    pub fn bse(&self) -> Vec<Option<f64>> {
        let scale = self.scale();
        (0..self.n_params())
            .map(|j| {
                let v = scale * self.covariance_unscaled[[j, j]];
                if self.coefficients[j].is_aliased() || !v.is_finite() {
                    None
                } else {
                    Some(v.max(0.0).sqrt())
                }
            })
            .collect()
    }

    /// Coefficient table with standard errors, tests and confidence intervals.
    ///
    /// Poisson uses z statistics; quasi-Poisson uses t with df_resid degrees
    /// of freedom, the way R's `summary.glm` does.
    pub fn coefficient_table(&self, confidence: f64) -> Vec<CoefficientSummary> {
        let use_t = !self.family.as_family().fixed_dispersion();
        let df = self.df_resid() as f64;
        let bse = self.bse();

        self.coefficients
            .iter()
            .zip(bse)
            .zip(self.column_names.iter())
            .map(|((coef, se), name)| {
                let estimate = coef.value();
                let (statistic, p_value, ci) = match (estimate, se) {
                    (Some(b), Some(se)) if se > 0.0 => {
                        let stat = b / se;
                        if use_t {
                            (Some(stat), Some(pvalue_t(stat, df)), confidence_interval_t(b, se, df, confidence))
                        } else {
                            (Some(stat), Some(pvalue_z(stat)), confidence_interval_z(b, se, confidence))
                        }
                    }
                    _ => (None, None, (f64::NAN, f64::NAN)),
                };

                CoefficientSummary {
                    name: name.clone(),
                    estimate,
                    std_error: se,
                    statistic,
                    p_value,
                    ci_lower: ci.0.is_finite().then_some(ci.0),
                    ci_upper: ci.1.is_finite().then_some(ci.1),
                    relativity: estimate.map(f64::exp),
                    significance: p_value.map_or("", significance_stars).to_string(),
                }
            })
            .collect()
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// η = X_new·β + offset, treating aliased coefficients as 0.
    pub fn predict_linear(&self, x_new: &Array2<f64>, offset: Option<&Array1<f64>>) -> Result<Array1<f64>> {
        if x_new.ncols() != self.coefficients.len() {
            return Err(ClaimFreqError::DimensionMismatch(format!(
                "X_new has {} columns but the model has {} coefficients",
                x_new.ncols(),
                self.coefficients.len()
            )));
        }
        let beta: Array1<f64> = self.coefficients.iter().map(Coefficient::value_or_zero).collect();
        let mut eta = x_new.dot(&beta);

        if let Some(o) = offset {
            if o.len() != x_new.nrows() {
                return Err(ClaimFreqError::DimensionMismatch(format!(
                    "offset has {} elements but X_new has {} rows",
                    o.len(),
                    x_new.nrows()
                )));
            }
            eta += o;
        }
        Ok(eta)
    }

    /// Expected claim counts μ = g⁻¹(X_new·β + offset).
    pub fn predict(&self, x_new: &Array2<f64>, offset: Option<&Array1<f64>>) -> Result<Array1<f64>> {
        let eta = self.predict_linear(x_new, offset)?;
        Ok(self.link.as_link().inverse(&eta))
    }

    // =========================================================================
    // Residuals
    // =========================================================================

    pub fn resid_response(&self) -> Array1<f64> {
        resid_response(&self.y, &self.fitted_values)
    }

    pub fn resid_pearson(&self) -> Array1<f64> {
        resid_pearson(&self.y, &self.fitted_values, self.family.as_family(), Some(&self.prior_weights))
    }

    pub fn resid_deviance(&self) -> Array1<f64> {
        resid_deviance(&self.y, &self.fitted_values, self.family.as_family(), Some(&self.prior_weights))
    }

    pub fn resid_working(&self) -> Array1<f64> {
        resid_working(&self.y, &self.fitted_values, self.link.as_link())
    }

    /// Randomized quantile residuals on the training data.
    ///
    /// Observations whose residual would be infinite fall back to this
    /// model's own deviance (or Pearson) residual. Prior weights are not
    /// applied to either.
    pub fn quantile_residuals<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        fallback: ResidualFallback,
    ) -> QuantileResiduals {
        randomized_quantile_residuals(&self.y, &self.fitted_values, fallback, rng)
    }

    /// Randomized quantile residuals for (X, y, offset), e.g. a held-out set.
    pub fn quantile_residuals_for<R: Rng + ?Sized>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        offset: Option<&Array1<f64>>,
        rng: &mut R,
        fallback: ResidualFallback,
    ) -> Result<QuantileResiduals> {
        if y.len() != x.nrows() {
            return Err(ClaimFreqError::DimensionMismatch(format!(
                "y has {} elements but X has {} rows",
                y.len(),
                x.nrows()
            )));
        }
        self.family.as_family().validate_response(y)?;
        let mu = self.predict(x, offset)?;
        Ok(randomized_quantile_residuals(y, &mu, fallback, rng))
    }
}
