// =============================================================================
// Classical Residuals
// =============================================================================
//
//   response:  y - μ
//   pearson:   (y - μ) √w / √V(μ)
//   deviance:  sign(y - μ) √(w d(y, μ))      Σ r² = deviance
//   working:   (y - μ) g'(μ)                 the IRLS scale
//
// =============================================================================

use ndarray::Array1;

use crate::families::Family;
use crate::links::Link;

pub fn resid_response(y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
    y - mu
}

pub fn resid_pearson(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    family: &dyn Family,
    weights: Option<&Array1<f64>>,
) -> Array1<f64> {
    let variance = family.variance(mu);
    (0..y.len())
        .map(|i| {
            let w = weights.map_or(1.0, |w| w[i]);
            (y[i] - mu[i]) * w.sqrt() / variance[i].sqrt()
        })
        .collect()
}

pub fn resid_deviance(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    family: &dyn Family,
    weights: Option<&Array1<f64>>,
) -> Array1<f64> {
    let unit = family.unit_deviance(y, mu);
    (0..y.len())
        .map(|i| {
            let w = weights.map_or(1.0, |w| w[i]);
            let magnitude = (w * unit[i]).max(0.0).sqrt();
            if y[i] >= mu[i] {
                magnitude
            } else {
                -magnitude
            }
        })
        .collect()
}

pub fn resid_working(y: &Array1<f64>, mu: &Array1<f64>, link: &dyn Link) -> Array1<f64> {
    let deriv = link.derivative(mu);
    (y - mu) * &deriv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::PoissonFamily;
    use crate::links::LogLink;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pearson_poisson() {
        // (4 - 1) / √1 = 3, (0 - 4) / √4 = -2
        let r = resid_pearson(&array![4.0, 0.0], &array![1.0, 4.0], &PoissonFamily, None);
        assert_abs_diff_eq!(r[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[1], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deviance_sign_follows_response() {
        let r = resid_deviance(&array![0.0, 3.0], &array![1.0, 1.0], &PoissonFamily, None);
        assert!(r[0] < 0.0);
        assert!(r[1] > 0.0);
        assert_abs_diff_eq!(r[0], -(2.0f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_weights_scale_residuals() {
        let y = array![3.0];
        let mu = array![1.0];
        let plain = resid_pearson(&y, &mu, &PoissonFamily, None);
        let weighted = resid_pearson(&y, &mu, &PoissonFamily, Some(&array![4.0]));
        assert_abs_diff_eq!(weighted[0], 2.0 * plain[0], epsilon = 1e-12);
    }

    #[test]
    fn test_working_residual_log_link() {
        let r = resid_working(&array![3.0], &array![2.0], &LogLink);
        assert_abs_diff_eq!(r[0], 0.5, epsilon = 1e-12);
        assert_eq!(resid_response(&array![3.0], &array![2.0])[0], 1.0);
    }
}
