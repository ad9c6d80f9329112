// =============================================================================
// Poisson and Quasi-Poisson Families
// =============================================================================
//
// Poisson: P(Y = y) = μʸ e^(-μ) / y!
//
//     V(μ) = μ
//     d(y, μ) = 2 [ y log(y/μ) - (y - μ) ]      (with 0·log 0 = 0)
//
// Quasi-Poisson shares V(μ) and d(y, μ); it only differs in that the
// dispersion is estimated and there is no proper likelihood.
//
// =============================================================================

use ndarray::Array1;
use statrs::function::gamma::ln_gamma;

use super::Family;
use crate::constants::MU_MIN_POSITIVE;
use crate::error::{ClaimFreqError, Result};

fn poisson_unit_deviance(y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
    y.iter()
        .zip(mu.iter())
        .map(|(&yi, &mui)| {
            let mui = mui.max(MU_MIN_POSITIVE);
            if yi > 0.0 {
                2.0 * (yi * (yi / mui).ln() - (yi - mui))
            } else {
                2.0 * mui
            }
        })
        .collect()
}

/// Statsmodels-style start: halfway between each yᵢ and the overall mean.
fn poisson_initialize_mu(y: &Array1<f64>) -> Array1<f64> {
    let y_mean = y.mean().unwrap_or(1.0);
    y.mapv(|yi| (yi + y_mean) / 2.0)
}

fn check_non_negative(y: &Array1<f64>, family: &str) -> Result<()> {
    if let Some((i, &v)) = y.iter().enumerate().find(|(_, v)| !v.is_finite() || **v < 0.0) {
        return Err(ClaimFreqError::InvalidInput(format!(
            "{} response must be finite and non-negative (y[{}] = {})",
            family, i, v
        )));
    }
    Ok(())
}

/// Poisson family for claim counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonFamily;

impl Family for PoissonFamily {
    fn name(&self) -> &str {
        "Poisson"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_POSITIVE))
    }

    fn unit_deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
        poisson_unit_deviance(y, mu)
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        poisson_initialize_mu(y)
    }

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool {
        mu.iter().all(|&m| m.is_finite() && m > 0.0)
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_POSITIVE))
    }

    fn validate_response(&self, y: &Array1<f64>) -> Result<()> {
        check_non_negative(y, self.name())?;
        let non_integer = y.iter().filter(|&&v| v.fract() != 0.0).count();
        if non_integer > 0 {
            log::warn!(
                "{} non-integer response values for the Poisson family; \
                 consider quasipoisson",
                non_integer
            );
        }
        Ok(())
    }

    fn fixed_dispersion(&self) -> bool {
        true
    }

    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
        y.iter()
            .zip(mu.iter())
            .enumerate()
            .map(|(i, (&yi, &mui))| {
                let w = weights.map_or(1.0, |w| w[i]);
                let mui = mui.max(MU_MIN_POSITIVE);
                w * (yi * mui.ln() - mui - ln_gamma(yi + 1.0))
            })
            .sum()
    }
}

/// Poisson mean/variance structure with an estimated dispersion.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuasiPoissonFamily;

impl Family for QuasiPoissonFamily {
    fn name(&self) -> &str {
        "QuasiPoisson"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_POSITIVE))
    }

    fn unit_deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
        poisson_unit_deviance(y, mu)
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        poisson_initialize_mu(y)
    }

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool {
        mu.iter().all(|&m| m.is_finite() && m > 0.0)
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_POSITIVE))
    }

    fn validate_response(&self, y: &Array1<f64>) -> Result<()> {
        check_non_negative(y, self.name())
    }

    fn fixed_dispersion(&self) -> bool {
        false
    }

    fn log_likelihood(&self, _y: &Array1<f64>, _mu: &Array1<f64>, _weights: Option<&Array1<f64>>) -> f64 {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_unit_deviance_zero_at_perfect_fit() {
        let y = array![0.0, 1.0, 3.0];
        let d = PoissonFamily.unit_deviance(&y, &array![1e-12, 1.0, 3.0]);
        for v in d.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unit_deviance_zero_count() {
        // d(0, μ) = 2μ
        let d = PoissonFamily.unit_deviance(&array![0.0], &array![0.7]);
        assert_abs_diff_eq!(d[0], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_deviance() {
        let y = array![0.0, 2.0];
        let mu = array![0.5, 1.0];
        let unit = PoissonFamily.unit_deviance(&y, &mu);
        let dev = PoissonFamily.deviance(&y, &mu, Some(&array![2.0, 1.0]));
        assert_abs_diff_eq!(dev, 2.0 * unit[0] + unit[1], epsilon = 1e-12);
    }

    #[test]
    fn test_log_likelihood_matches_pmf() {
        // log P(Y=2 | μ=1.5) = 2 ln 1.5 - 1.5 - ln 2
        let ll = PoissonFamily.log_likelihood(&array![2.0], &array![1.5], None);
        assert_abs_diff_eq!(ll, 2.0 * 1.5f64.ln() - 1.5 - 2.0f64.ln(), epsilon = 1e-10);
    }

    #[test]
    fn test_quasi_has_no_likelihood() {
        assert!(QuasiPoissonFamily.log_likelihood(&array![1.0], &array![1.0], None).is_nan());
        assert!(!QuasiPoissonFamily.fixed_dispersion());
    }

    #[test]
    fn test_negative_response_rejected() {
        let err = PoissonFamily.validate_response(&array![1.0, -1.0]).unwrap_err();
        assert!(matches!(err, ClaimFreqError::InvalidInput(_)));
        assert!(QuasiPoissonFamily.validate_response(&array![0.5, 2.5]).is_ok());
    }

    #[test]
    fn test_initialize_constant_response_is_exact() {
        let mu = PoissonFamily.initialize_mu(&array![3.0, 3.0, 3.0]);
        assert!(mu.iter().all(|&m| (m - 3.0).abs() < 1e-15));
    }
}
