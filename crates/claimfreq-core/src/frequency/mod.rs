// =============================================================================
// Claim Frequency Models
// =============================================================================
//
// The formula-level entry point. A `FrequencyModel` keeps the fitted GLM
// together with the design specification that produced it, so new data goes
// through exactly the same encoding:
//
//     let model = FrequencyModel::fit(
//         "claims ~ C(agecat) + area + offset(log(exposure))",
//         &train,
//         &IRLSConfig::default(),
//         FamilyKind::Poisson,
//     )?;
//     let mu = model.predict(&test)?;
//     let rq = model.quantile_residuals(&test, &mut rng, ResidualFallback::Deviance)?;
//
// =============================================================================

use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::design_matrix::{Dataset, DesignSpec};
use crate::diagnostics::{mae, mean_poisson_deviance, mse, rmse, QuantileResiduals, ResidualFallback};
use crate::error::{ClaimFreqError, Result};
use crate::families::FamilyKind;
use crate::formula::parse_formula;
use crate::links::LinkFunction;
use crate::model::{CoefficientSummary, FittedModel};
use crate::solvers::{fit_glm_full, IRLSConfig};

/// Prediction quality on data the model was not fitted to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mean_poisson_deviance: f64,
    pub observed_claims: f64,
    pub predicted_claims: f64,
}

/// A GLM fitted from a formula and a `Dataset`.
#[derive(Debug, Clone)]
pub struct FrequencyModel {
    design: DesignSpec,
    weights_column: Option<String>,
    model: FittedModel,
}

impl FrequencyModel {
    /// Parse `formula`, encode `data`, and fit with the log link.
    pub fn fit(formula: &str, data: &Dataset, config: &IRLSConfig, family: FamilyKind) -> Result<Self> {
        Self::fit_inner(formula, data, None, config, family)
    }

    /// As `fit`, with prior weights read from the numeric column `weights`.
    pub fn fit_weighted(
        formula: &str,
        data: &Dataset,
        weights: &str,
        config: &IRLSConfig,
        family: FamilyKind,
    ) -> Result<Self> {
        Self::fit_inner(formula, data, Some(weights), config, family)
    }

    fn fit_inner(
        formula: &str,
        data: &Dataset,
        weights: Option<&str>,
        config: &IRLSConfig,
        family: FamilyKind,
    ) -> Result<Self> {
        let parsed = parse_formula(formula)?;
        let design = DesignSpec::from_formula(&parsed, data)?;
        let dm = design.build(data)?;
        let y = design.response(data)?;
        let offset = design.offset(data)?;
        let prior = weights.map(|w| data.numeric(w).cloned()).transpose()?;

        log::info!(
            "fitting '{}' ({}, {} rows, {} columns)",
            formula,
            family.as_family().name(),
            dm.matrix.nrows(),
            dm.matrix.ncols()
        );

        let model = fit_glm_full(
            &y,
            &dm.matrix,
            family,
            LinkFunction::Log,
            config,
            offset.as_ref(),
            prior.as_ref(),
        )?
        .with_column_names(dm.column_names)?;

        Ok(Self {
            design,
            weights_column: weights.map(str::to_string),
            model,
        })
    }

    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    pub fn design(&self) -> &DesignSpec {
        &self.design
    }

    pub fn weights_column(&self) -> Option<&str> {
        self.weights_column.as_deref()
    }

    pub fn coefficient_table(&self, confidence: f64) -> Vec<CoefficientSummary> {
        self.model.coefficient_table(confidence)
    }

    /// Expected claim counts for each row of `data`, including its exposure.
    pub fn predict(&self, data: &Dataset) -> Result<Array1<f64>> {
        let dm = self.design.build(data)?;
        let offset = self.design.offset(data)?;
        self.model.predict(&dm.matrix, offset.as_ref())
    }

    /// Randomized quantile residuals of this model on `data`.
    pub fn quantile_residuals<R: Rng + ?Sized>(
        &self,
        data: &Dataset,
        rng: &mut R,
        fallback: ResidualFallback,
    ) -> Result<QuantileResiduals> {
        let dm = self.design.build(data)?;
        let y = self.design.response(data)?;
        let offset = self.design.offset(data)?;
        self.model.quantile_residuals_for(&dm.matrix, &y, offset.as_ref(), rng, fallback)
    }

    /// Loss metrics of the predictions on `data` against its observed claims.
    pub fn holdout_metrics(&self, data: &Dataset) -> Result<HoldoutMetrics> {
        let y = self.design.response(data)?;
        let mu = self.predict(data)?;
        Ok(HoldoutMetrics {
            mse: mse(&y, &mu),
            rmse: rmse(&y, &mu),
            mae: mae(&y, &mu),
            mean_poisson_deviance: mean_poisson_deviance(&y, &mu, None),
            observed_claims: y.sum(),
            predicted_claims: mu.sum(),
        })
    }
}

/// Random disjoint (train, test) row indices, each sorted ascending.
///
/// The test set has round(n × test_fraction) rows.
pub fn train_test_split<R: Rng + ?Sized>(
    n: usize,
    test_fraction: f64,
    rng: &mut R,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ClaimFreqError::InvalidInput(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    let mut rows: Vec<usize> = (0..n).collect();
    rows.shuffle(rng);

    let n_test = (n as f64 * test_fraction).round() as usize;
    let mut test = rows.split_off(n - n_test);
    rows.sort_unstable();
    test.sort_unstable();
    Ok((rows, test))
}
