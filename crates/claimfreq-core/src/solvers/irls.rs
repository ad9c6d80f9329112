// =============================================================================
// IRLS: Iteratively Reweighted Least Squares
// =============================================================================
//
// THE BIG PICTURE
// ---------------
//     Start with initial means μ⁰ (halfway between each y and the mean of y)
//     Repeat:
//         1. Working weights   wᵢ = priorᵢ / (V(μᵢ) · g'(μᵢ)²)
//         2. Working response  zᵢ = ηᵢ - offsetᵢ + (yᵢ - μᵢ) · g'(μᵢ)
//         3. Solve weighted least squares (X'WX)β = X'Wz
//         4. η = Xβ + offset,  μ = g⁻¹(η)
//         5. Stop when the relative change in deviance < tolerance
//
// For Poisson with the log link V(μ) = μ and g'(μ) = 1/μ, so the weights are
// simply prior × μ and z = η + (y - μ)/μ - offset.
//
// THE OFFSET (for Actuaries)
// --------------------------
// A policy observed for half a year should expect half the claims. With
//
//     log(μ) = Xβ + log(exposure)
//
// log(exposure) enters η with a coefficient fixed at 1. It is subtracted from
// the working response so that only Xβ is estimated.
//
// NON-CONVERGENCE AND BAD STEPS
// -----------------------------
// Hitting `max_iterations` is not an error: the last iterate is returned with
// a `DidNotConverge` warning. If a step produces a non-finite deviance (η
// overflowing, say) the step is halved back towards the previous β.
//
// =============================================================================

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::initialize_mu_safe;
use super::wls::solve_weighted_least_squares;
use crate::constants::{DEVIANCE_ZERO, MAX_IRLS_WEIGHT};
use crate::diagnostics::null_deviance;
use crate::error::{ClaimFreqError, Result};
use crate::families::{Family, FamilyKind};
use crate::links::{Link, LinkFunction};
use crate::model::{Coefficient, FitWarning, FittedModel};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration options for the IRLS algorithm.
///
/// Deserializable with missing fields falling back to the defaults, so it
/// can sit inside a caller's own configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IRLSConfig {
    /// Maximum number of iterations. Default: 25
    pub max_iterations: usize,

    /// Convergence tolerance on the relative deviance change:
    /// |D_old - D_new| / |D_old| < tolerance. Default: 1e-8
    pub tolerance: f64,

    /// Floor for working weights. Default: 1e-10
    pub min_weight: f64,

    /// Relative residual norm below which a design column is aliased.
    /// Default: 1e-11
    pub rank_tolerance: f64,

    /// How many times a step may be halved when the deviance is not finite.
    /// Default: 10
    pub max_step_halvings: usize,

    /// Log every iteration at info level instead of debug.
    pub verbose: bool,
}

impl Default for IRLSConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
            min_weight: 1e-10,
            rank_tolerance: 1e-11,
            max_step_halvings: 10,
            verbose: false,
        }
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Fit a Poisson GLM with log link: the claim-frequency workhorse.
///
/// # Arguments
/// * `x` - Design matrix (n × p), including the intercept column
/// * `y` - Claim counts (n)
/// * `offset` - Optional log(exposure) (n)
/// * `weights` - Optional positive prior weights (n)
/// * `config` - Iteration cap, tolerance and numeric guards
///
/// # Example
/// ```ignore
/// let offset = exposure.mapv(f64::ln);
/// let model = fit_poisson(&x, &claims, Some(&offset), None, &IRLSConfig::default())?;
/// let mu = model.predict(&x_test, Some(&offset_test))?;
/// ```
pub fn fit_poisson(
    x: &Array2<f64>,
    y: &Array1<f64>,
    offset: Option<&Array1<f64>>,
    weights: Option<&Array1<f64>>,
    config: &IRLSConfig,
) -> Result<FittedModel> {
    fit_glm_full(y, x, FamilyKind::Poisson, LinkFunction::Log, config, offset, weights)
}

/// Fit a GLM with no offset and unit weights.
pub fn fit_glm(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: FamilyKind,
    link: LinkFunction,
    config: &IRLSConfig,
) -> Result<FittedModel> {
    fit_glm_full(y, x, family, link, config, None, None)
}

/// Fit a GLM by IRLS with optional offset and prior weights.
///
/// Inputs are validated before the first iteration: dimension mismatches,
/// empty inputs, negative or non-finite responses, non-positive weights and
/// non-finite offsets are all fatal.
pub fn fit_glm_full(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: FamilyKind,
    link: LinkFunction,
    config: &IRLSConfig,
    offset: Option<&Array1<f64>>,
    weights: Option<&Array1<f64>>,
) -> Result<FittedModel> {
    let (offset_vec, prior_weights) = validate_inputs(y, x, offset, weights)?;
    let fam = family.as_family();
    let lnk = link.as_link();
    fam.validate_response(y)?;

    let state = run_irls(y, x, fam, lnk, config, &offset_vec, &prior_weights)?;

    let has_intercept = x.column(0).iter().all(|&v| v == 1.0);
    let null_dev = null_deviance(y, fam, link, &offset_vec, Some(&prior_weights), has_intercept);

    let mut warnings = Vec::new();
    if state.aliased.iter().any(|&a| a) {
        let columns: Vec<usize> = (0..state.aliased.len()).filter(|&j| state.aliased[j]).collect();
        log::info!(
            "{} coefficient(s) not defined because of singularities: columns {:?}",
            columns.len(),
            columns
        );
        warnings.push(FitWarning::Aliased { columns });
    }
    if !state.converged {
        log::warn!(
            "IRLS did not converge after {} iterations (relative deviance change {:.3e})",
            state.iterations,
            state.rel_change
        );
        warnings.push(FitWarning::DidNotConverge {
            iterations: state.iterations,
            relative_change: state.rel_change,
        });
    }

    let coefficients = state
        .coefficients
        .iter()
        .zip(state.aliased.iter())
        .map(|(&b, &a)| if a { Coefficient::Aliased } else { Coefficient::Estimated(b) })
        .collect();

    let column_names = (0..x.ncols()).map(|j| format!("x{}", j)).collect();

    Ok(FittedModel {
        coefficients,
        column_names,
        family,
        link,
        y: y.clone(),
        fitted_values: state.mu,
        linear_predictor: state.eta,
        prior_weights,
        offset: offset_vec,
        irls_weights: state.irls_weights,
        covariance_unscaled: state.covariance_unscaled,
        deviance: state.deviance,
        null_deviance: null_dev,
        iterations: state.iterations,
        converged: state.converged,
        rank: state.rank,
        has_intercept,
        warnings,
    })
}

// =============================================================================
// Validation
// =============================================================================

fn validate_inputs(
    y: &Array1<f64>,
    x: &Array2<f64>,
    offset: Option<&Array1<f64>>,
    weights: Option<&Array1<f64>>,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let n = y.len();

    if n == 0 {
        return Err(ClaimFreqError::EmptyInput("y is empty".to_string()));
    }
    if x.ncols() == 0 {
        return Err(ClaimFreqError::EmptyInput("X has no columns".to_string()));
    }
    if x.nrows() != n {
        return Err(ClaimFreqError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            n
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ClaimFreqError::InvalidInput(
            "design matrix contains non-finite values".to_string(),
        ));
    }

    let offset_vec = match offset {
        Some(o) => {
            if o.len() != n {
                return Err(ClaimFreqError::DimensionMismatch(format!(
                    "offset has {} elements but y has {}",
                    o.len(),
                    n
                )));
            }
            if o.iter().any(|v| !v.is_finite()) {
                return Err(ClaimFreqError::InvalidInput(
                    "offset contains non-finite values (zero exposure?)".to_string(),
                ));
            }
            o.clone()
        }
        None => Array1::zeros(n),
    };

    let prior_weights = match weights {
        Some(w) => {
            if w.len() != n {
                return Err(ClaimFreqError::DimensionMismatch(format!(
                    "weights has {} elements but y has {}",
                    w.len(),
                    n
                )));
            }
            if w.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
                return Err(ClaimFreqError::InvalidInput(
                    "weights must be finite and strictly positive".to_string(),
                ));
            }
            w.clone()
        }
        None => Array1::ones(n),
    };

    Ok((offset_vec, prior_weights))
}

// =============================================================================
// The Iteration
// =============================================================================

struct IrlsState {
    coefficients: Array1<f64>,
    aliased: Vec<bool>,
    rank: usize,
    covariance_unscaled: Array2<f64>,
    irls_weights: Array1<f64>,
    mu: Array1<f64>,
    eta: Array1<f64>,
    deviance: f64,
    rel_change: f64,
    iterations: usize,
    converged: bool,
}

fn run_irls(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: &dyn Family,
    link: &dyn Link,
    config: &IRLSConfig,
    offset: &Array1<f64>,
    prior_weights: &Array1<f64>,
) -> Result<IrlsState> {
    let mut mu = family.initialize_mu(y);
    if !family.is_valid_mu(&mu) {
        mu = initialize_mu_safe(y, family);
    }
    let mut eta = link.link(&mu);
    let mut deviance = family.deviance(y, &mu, Some(prior_weights));

    let mut state: Option<IrlsState> = None;
    let mut previous_beta: Option<Array1<f64>> = None;
    let mut rel_change = f64::INFINITY;
    let mut converged = false;
    let mut iteration = 0;

    while iteration < config.max_iterations {
        iteration += 1;

        // Step 1: working weights, clipped away from 0 and ∞
        let variance = family.variance(&mu);
        let link_deriv = link.derivative(&mu);
        let irls_weights: Array1<f64> = variance
            .iter()
            .zip(link_deriv.iter())
            .map(|(&v, &d)| (1.0 / (v * d * d)).max(config.min_weight).min(MAX_IRLS_WEIGHT))
            .collect();
        let combined_weights = prior_weights * &irls_weights;

        // Step 2: working response on the Xβ scale
        let working_response: Array1<f64> = eta
            .iter()
            .zip(offset.iter())
            .zip(y.iter().zip(mu.iter()))
            .zip(link_deriv.iter())
            .map(|(((&e, &o), (&yi, &mui)), &d)| e - o + (yi - mui) * d)
            .collect();

        // Step 3: weighted least squares with alias detection
        let solution = solve_weighted_least_squares(
            x,
            &working_response,
            &combined_weights,
            config.rank_tolerance,
        )?;
        let mut beta = solution.coefficients.clone();

        // Step 4: update η and μ, halving the step while the deviance is not finite
        let (mut new_eta, mut new_mu, mut new_deviance) =
            evaluate(y, x, &beta, offset, family, link, prior_weights);
        let mut halvings = 0;
        while !new_deviance.is_finite() {
            let Some(prev) = previous_beta.as_ref() else { break };
            if halvings >= config.max_step_halvings {
                break;
            }
            halvings += 1;
            beta = (&beta + prev) / 2.0;
            (new_eta, new_mu, new_deviance) = evaluate(y, x, &beta, offset, family, link, prior_weights);
            log::debug!("step halved ({}): deviance = {}", halvings, new_deviance);
        }
        if !new_deviance.is_finite() {
            return Err(ClaimFreqError::LinearAlgebraError(format!(
                "deviance is not finite at iteration {} after {} step halvings",
                iteration, halvings
            )));
        }

        // Step 5: convergence on relative deviance change
        rel_change = if deviance.abs() > DEVIANCE_ZERO {
            (deviance - new_deviance).abs() / deviance.abs()
        } else {
            (deviance - new_deviance).abs()
        };

        if config.verbose {
            log::info!(
                "IRLS iteration {}: deviance = {:.6}, rel_change = {:.2e}, rank = {}",
                iteration, new_deviance, rel_change, solution.rank
            );
        } else {
            log::debug!(
                "IRLS iteration {}: deviance = {:.6}, rel_change = {:.2e}, rank = {}",
                iteration, new_deviance, rel_change, solution.rank
            );
        }

        eta = new_eta;
        mu = new_mu;
        deviance = new_deviance;
        previous_beta = Some(beta.clone());

        state = Some(IrlsState {
            coefficients: beta,
            aliased: solution.aliased,
            rank: solution.rank,
            covariance_unscaled: solution.covariance_unscaled,
            irls_weights,
            mu: mu.clone(),
            eta: eta.clone(),
            deviance,
            rel_change,
            iterations: iteration,
            converged: false,
        });

        if rel_change < config.tolerance {
            converged = true;
            break;
        }
    }

    let mut state = state.ok_or_else(|| {
        ClaimFreqError::InvalidInput("max_iterations must be at least 1".to_string())
    })?;
    state.converged = converged;
    state.rel_change = rel_change;
    Ok(state)
}

/// η, μ and deviance for a candidate β.
fn evaluate(
    y: &Array1<f64>,
    x: &Array2<f64>,
    beta: &Array1<f64>,
    offset: &Array1<f64>,
    family: &dyn Family,
    link: &dyn Link,
    prior_weights: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>, f64) {
    let eta = x.dot(beta) + offset;
    let mu = family.clamp_mu(&link.inverse(&eta));
    let deviance = family.deviance(y, &mu, Some(prior_weights));
    (eta, mu, deviance)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn with_intercept(values: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((values.len(), 2), |(i, j)| if j == 0 { 1.0 } else { values[i] })
    }

    #[test]
    fn test_intercept_only_constant_response() {
        let x = Array2::ones((4, 1));
        let y = array![3.0, 3.0, 3.0, 3.0];

        let model = fit_poisson(&x, &y, None, None, &IRLSConfig::default()).unwrap();

        assert!(model.converged());
        assert_eq!(model.iterations(), 1);
        assert_abs_diff_eq!(model.params()[0], 3.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_poisson_log_link() {
        let x = with_intercept(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = array![2.0, 2.0, 3.0, 4.0, 5.0, 7.0];

        let model = fit_poisson(&x, &y, None, None, &IRLSConfig::default()).unwrap();

        assert!(model.converged());
        assert!(model.fitted_values().iter().all(|&m| m > 0.0));
        // Poisson score equations with an intercept: Σ μ = Σ y
        assert_abs_diff_eq!(model.fitted_values().sum(), y.sum(), epsilon = 1e-6);
        assert!(model.params()[1] > 0.0);
    }

    #[test]
    fn test_two_group_scenario() {
        // groups a = [0,1,0], b = [2,0]
        let x = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 0.0, 2.0, 0.0];
        let offset = Array1::<f64>::ones(5).mapv(f64::ln);

        let model = fit_poisson(&x, &y, Some(&offset), None, &IRLSConfig::default()).unwrap();

        assert!(model.converged());
        assert!(model.iterations() <= 10);
        let beta = model.params();
        assert_abs_diff_eq!(beta[0].exp(), 1.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!((beta[0] + beta[1]).exp(), 1.0, epsilon = 1e-6);
        assert_eq!(model.df_resid(), 3);
    }

    #[test]
    fn test_collinear_columns_alias_one() {
        let v = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
        let x = Array2::from_shape_fn((6, 3), |(i, j)| match j {
            0 => 1.0,
            1 => v[i],
            _ => 2.0 * v[i],
        });
        let y = array![1.0, 1.0, 2.0, 2.0, 4.0, 5.0];

        let model = fit_poisson(&x, &y, None, None, &IRLSConfig::default()).unwrap();

        let aliased: Vec<bool> = model.coefficients().iter().map(|c| c.is_aliased()).collect();
        assert_eq!(aliased, vec![false, false, true]);
        assert_eq!(model.rank(), 2);
        assert_eq!(model.df_resid(), 4);
        assert!(model
            .warnings()
            .iter()
            .any(|w| matches!(w, FitWarning::Aliased { columns } if columns == &vec![2])));

        let mu = model.predict(&x, None).unwrap();
        assert!(mu.iter().all(|m| m.is_finite() && *m > 0.0));
    }

    #[test]
    fn test_offset_shift_moves_only_intercept() {
        let x = with_intercept(&[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        let y = array![1.0, 2.0, 4.0, 0.0, 3.0, 5.0];
        let exposure = array![1.0, 0.5, 2.0, 1.5, 1.0, 0.8];
        let offset = exposure.mapv(f64::ln);
        let k = 0.7;
        let shifted = offset.mapv(|o| o + k);

        let config = IRLSConfig::default();
        let a = fit_poisson(&x, &y, Some(&offset), None, &config).unwrap();
        let b = fit_poisson(&x, &y, Some(&shifted), None, &config).unwrap();

        assert_abs_diff_eq!(a.params()[1], b.params()[1], epsilon = 1e-7);
        assert_abs_diff_eq!(a.params()[0] - k, b.params()[0], epsilon = 1e-7);
        assert_abs_diff_eq!(a.deviance(), b.deviance(), epsilon = 1e-7);
    }

    #[test]
    fn test_did_not_converge_is_a_warning() {
        let x = with_intercept(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let y = array![0.0, 1.0, 1.0, 4.0, 9.0];
        let config = IRLSConfig {
            max_iterations: 1,
            ..IRLSConfig::default()
        };

        let model = fit_poisson(&x, &y, None, None, &config).unwrap();

        assert!(!model.converged());
        assert_eq!(model.iterations(), 1);
        assert!(model
            .warnings()
            .iter()
            .any(|w| matches!(w, FitWarning::DidNotConverge { iterations: 1, .. })));
        assert!(model.params().iter().all(|b| b.is_finite()));
    }

    #[test]
    fn test_invalid_inputs_are_fatal() {
        let x = with_intercept(&[0.0, 1.0, 2.0]);
        let config = IRLSConfig::default();

        let negative = fit_poisson(&x, &array![1.0, -1.0, 2.0], None, None, &config);
        assert!(matches!(negative, Err(ClaimFreqError::InvalidInput(_))));

        let zero_weight =
            fit_poisson(&x, &array![1.0, 1.0, 2.0], None, Some(&array![1.0, 0.0, 1.0]), &config);
        assert!(matches!(zero_weight, Err(ClaimFreqError::InvalidInput(_))));

        let short_offset = fit_poisson(&x, &array![1.0, 1.0, 2.0], Some(&array![0.0]), None, &config);
        assert!(matches!(short_offset, Err(ClaimFreqError::DimensionMismatch(_))));

        let bad_offset = fit_poisson(
            &x,
            &array![1.0, 1.0, 2.0],
            Some(&array![0.0, f64::NEG_INFINITY, 0.0]),
            None,
            &config,
        );
        assert!(matches!(bad_offset, Err(ClaimFreqError::InvalidInput(_))));
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let x = with_intercept(&[1.0, 2.0, 3.0]);
        let result = fit_poisson(&x, &array![1.0, 2.0], None, None, &IRLSConfig::default());
        assert!(matches!(result, Err(ClaimFreqError::DimensionMismatch(_))));
    }

    #[test]
    fn test_prior_weights_equal_replicated_rows() {
        // weight 2 on a row is the same as seeing that row twice
        let x_w = with_intercept(&[0.0, 1.0, 2.0]);
        let y_w = array![1.0, 2.0, 5.0];
        let w = array![2.0, 1.0, 1.0];
        let x_r = with_intercept(&[0.0, 0.0, 1.0, 2.0]);
        let y_r = array![1.0, 1.0, 2.0, 5.0];

        let config = IRLSConfig::default();
        let weighted = fit_poisson(&x_w, &y_w, None, Some(&w), &config).unwrap();
        let replicated = fit_poisson(&x_r, &y_r, None, None, &config).unwrap();

        assert_abs_diff_eq!(weighted.params()[0], replicated.params()[0], epsilon = 1e-7);
        assert_abs_diff_eq!(weighted.params()[1], replicated.params()[1], epsilon = 1e-7);
    }
}
