// Dispersion estimates.
//
// Under a correct Poisson model φ = 1. Values well above 1 mean the claims
// are overdispersed and Poisson standard errors are too small; refit as
// quasi-Poisson to inflate them by √φ.

use ndarray::Array1;

use crate::families::Family;

/// Pearson statistic X² = Σ w (y - μ)² / V(μ).
pub fn pearson_chi2(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    family: &dyn Family,
    weights: Option<&Array1<f64>>,
) -> f64 {
    let variance = family.variance(mu);
    (0..y.len())
        .map(|i| {
            let w = weights.map_or(1.0, |w| w[i]);
            w * (y[i] - mu[i]).powi(2) / variance[i]
        })
        .sum()
}

/// φ = X² / df_resid. NaN when there are no residual degrees of freedom.
pub fn estimate_dispersion_pearson(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    family: &dyn Family,
    df_resid: usize,
    weights: Option<&Array1<f64>>,
) -> f64 {
    if df_resid == 0 {
        return f64::NAN;
    }
    pearson_chi2(y, mu, family, weights) / df_resid as f64
}

/// φ = D / df_resid.
pub fn estimate_dispersion_deviance(deviance: f64, df_resid: usize) -> f64 {
    if df_resid == 0 {
        return f64::NAN;
    }
    deviance / df_resid as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::PoissonFamily;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pearson_chi2() {
        // (3-1)²/1 + (1-2)²/2 = 4.5
        let x2 = pearson_chi2(&array![3.0, 1.0], &array![1.0, 2.0], &PoissonFamily, None);
        assert_abs_diff_eq!(x2, 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_dispersion_estimates() {
        let phi = estimate_dispersion_pearson(&array![3.0, 1.0], &array![1.0, 2.0], &PoissonFamily, 1, None);
        assert_abs_diff_eq!(phi, 4.5, epsilon = 1e-12);
        assert!(estimate_dispersion_pearson(&array![1.0], &array![1.0], &PoissonFamily, 0, None).is_nan());
        assert_abs_diff_eq!(estimate_dispersion_deviance(10.0, 4), 2.5, epsilon = 1e-12);
    }
}
