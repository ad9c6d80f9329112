// =============================================================================
// Likelihood, Information Criteria and Null Deviance
// =============================================================================
//
// AIC and BIC count only estimable coefficients: an aliased column is not a
// parameter the model actually used.
//
// THE NULL MODEL WITH AN OFFSET
// -----------------------------
// The null deviance is the deviance of the model with an intercept only,
// keeping the same offset and prior weights. For the log link the intercept
// has a closed form:
//
//     μᵢ = exposureᵢ × (Σ w y) / (Σ w exposure)
//
// i.e. every policy gets the portfolio claim frequency. Other links are
// solved with a one-parameter IRLS loop. Without an intercept the "null"
// model is μ = g⁻¹(offset).
//
// =============================================================================

use ndarray::Array1;

use crate::constants::DEVIANCE_ZERO;
use crate::families::{Family, PoissonFamily};
use crate::links::LinkFunction;

/// Poisson log-likelihood Σ w [y log μ - μ - log y!].
pub fn log_likelihood_poisson(y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
    PoissonFamily.log_likelihood(y, mu, weights)
}

/// AIC = -2ℓ + 2k
pub fn aic(llf: f64, n_params: usize) -> f64 {
    -2.0 * llf + 2.0 * n_params as f64
}

/// BIC = -2ℓ + k log(n)
pub fn bic(llf: f64, n_params: usize, n_obs: usize) -> f64 {
    -2.0 * llf + n_params as f64 * (n_obs as f64).ln()
}

/// Deviance of the intercept-only model sharing `offset` and `weights`.
pub fn null_deviance(
    y: &Array1<f64>,
    family: &dyn Family,
    link: LinkFunction,
    offset: &Array1<f64>,
    weights: Option<&Array1<f64>>,
    has_intercept: bool,
) -> f64 {
    let n = y.len();
    let w = weights.cloned().unwrap_or_else(|| Array1::ones(n));
    let lnk = link.as_link();

    let mu = if !has_intercept {
        lnk.inverse(offset)
    } else if link == LinkFunction::Log {
        let exposure = offset.mapv(f64::exp);
        let claims: f64 = w.iter().zip(y.iter()).map(|(&wi, &yi)| wi * yi).sum();
        let exposed: f64 = w.iter().zip(exposure.iter()).map(|(&wi, &ei)| wi * ei).sum();
        exposure.mapv(|e| e * claims / exposed)
    } else {
        intercept_only_irls(y, family, link, offset, &w)
    };

    family.deviance(y, &family.clamp_mu(&mu), Some(&w))
}

/// Scalar IRLS for β₀ in g(μ) = β₀ + offset.
fn intercept_only_irls(
    y: &Array1<f64>,
    family: &dyn Family,
    link: LinkFunction,
    offset: &Array1<f64>,
    w: &Array1<f64>,
) -> Array1<f64> {
    let lnk = link.as_link();
    let mut mu = family.clamp_mu(&family.initialize_mu(y));
    let mut deviance = family.deviance(y, &mu, Some(w));

    for _ in 0..50 {
        let variance = family.variance(&mu);
        let deriv = lnk.derivative(&mu);
        let eta = lnk.link(&mu);

        let (mut num, mut den) = (0.0, 0.0);
        for i in 0..y.len() {
            let wi = w[i] / (variance[i] * deriv[i] * deriv[i]);
            let zi = eta[i] - offset[i] + (y[i] - mu[i]) * deriv[i];
            num += wi * zi;
            den += wi;
        }
        if !(den > 0.0) {
            break;
        }
        let beta0 = num / den;

        mu = family.clamp_mu(&lnk.inverse(&offset.mapv(|o| o + beta0)));
        let new_deviance = family.deviance(y, &mu, Some(w));
        let change = (deviance - new_deviance).abs() / deviance.abs().max(DEVIANCE_ZERO);
        deviance = new_deviance;
        if change < 1e-10 {
            break;
        }
    }
    mu
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_information_criteria() {
        assert_abs_diff_eq!(aic(-10.0, 3), 26.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bic(-10.0, 2, 100), 20.0 + 2.0 * 100f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_null_deviance_without_offset_uses_mean() {
        let y = array![0.0, 2.0, 4.0];
        let offset = Array1::zeros(3);
        let dev = null_deviance(&y, &PoissonFamily, LinkFunction::Log, &offset, None, true);
        let expected = PoissonFamily.deviance(&y, &Array1::from_elem(3, 2.0), None);
        assert_abs_diff_eq!(dev, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_null_deviance_with_exposure() {
        // portfolio frequency = 4 claims / 2 years = 2 per year
        let y = array![1.0, 3.0];
        let exposure = array![1.5, 0.5];
        let dev = null_deviance(&y, &PoissonFamily, LinkFunction::Log, &exposure.mapv(f64::ln), None, true);
        let expected = PoissonFamily.deviance(&y, &array![3.0, 1.0], None);
        assert_abs_diff_eq!(dev, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_null_deviance_identity_link_matches_mean() {
        let y = array![1.0, 2.0, 6.0];
        let dev = null_deviance(&y, &PoissonFamily, LinkFunction::Identity, &Array1::zeros(3), None, true);
        let expected = PoissonFamily.deviance(&y, &Array1::from_elem(3, 3.0), None);
        assert_abs_diff_eq!(dev, expected, epsilon = 1e-8);
    }

    #[test]
    fn test_log_likelihood_poisson() {
        let ll = log_likelihood_poisson(&array![0.0], &array![2.0], None);
        assert_abs_diff_eq!(ll, -2.0, epsilon = 1e-12);
    }
}
