// Hold-out loss metrics for comparing predictions on data the model did not
// see. Lower is better for all four.

use ndarray::Array1;

use crate::families::{Family, PoissonFamily};

pub fn mse(y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
    (y - mu).mapv(|r| r * r).mean().unwrap_or(f64::NAN)
}

pub fn rmse(y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
    mse(y, mu).sqrt()
}

pub fn mae(y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
    (y - mu).mapv(f64::abs).mean().unwrap_or(f64::NAN)
}

/// Weighted mean of the Poisson unit deviance: Σ w d(y, μ) / Σ w.
pub fn mean_poisson_deviance(y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
    let total = PoissonFamily.deviance(y, mu, weights);
    let weight_sum = weights.map_or(y.len() as f64, |w| w.sum());
    if weight_sum > 0.0 {
        total / weight_sum
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_point_losses() {
        let y = array![0.0, 2.0, 1.0];
        let mu = array![1.0, 1.0, 1.0];
        assert_abs_diff_eq!(mse(&y, &mu), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rmse(&y, &mu), (2.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(mae(&y, &mu), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_poisson_deviance_perfect_fit() {
        let y = array![1.0, 3.0];
        assert_abs_diff_eq!(mean_poisson_deviance(&y, &y.clone(), None), 0.0, epsilon = 1e-12);
        assert!(mean_poisson_deviance(&y, &array![2.0, 2.0], None) > 0.0);
    }
}
