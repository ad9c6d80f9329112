// =============================================================================
// Randomized Quantile Residuals
// =============================================================================
//
// Pearson and deviance residuals of low-frequency claim data clump into
// bands (one band per observed count), so a normal Q-Q plot of them says
// little. Quantile residuals (Dunn & Smyth, 1996) fix this by spreading each
// discrete observation over its CDF step:
//
//     a = F(y - 1; μ)          (0 when y = 0)
//     b = F(y; μ)
//     u ~ Uniform[a, b)
//     r = Φ⁻¹(u)
//
// If the model is right, r is exactly standard normal.
//
// The uniform draw comes from a caller-supplied random source. Seed it to
// make a diagnostic run repeatable.
//
// FALLBACK
// --------
// Far in the tails the CDF saturates in double precision (u rounds to 0 or
// 1) and Φ⁻¹ returns ±∞. For those observations only, the classical deviance
// or Pearson residual computed from the same fitted means is substituted.
//
// =============================================================================

use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, DiscreteCDF, Normal, Poisson};

use super::residuals::{resid_deviance, resid_pearson};
use crate::families::PoissonFamily;

/// Classical residual substituted where a quantile residual is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidualFallback {
    #[default]
    Deviance,
    Pearson,
}

/// Quantile residuals for one diagnostic run.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileResiduals {
    pub residuals: Array1<f64>,

    /// Observations that received the fallback residual.
    pub substituted: Vec<usize>,
}

impl QuantileResiduals {
    pub fn mean(&self) -> f64 {
        self.residuals.mean().unwrap_or(f64::NAN)
    }

    /// Sample variance (n - 1 denominator).
    pub fn variance(&self) -> f64 {
        if self.residuals.len() < 2 {
            return f64::NAN;
        }
        self.residuals.var(1.0)
    }
}

/// Quantile residual of a single Poisson observation for a given uniform
/// draw in [0, 1).
///
/// Returns `None` when the residual is not a finite number.
pub fn poisson_quantile_residual(y: f64, mu: f64, uniform: f64) -> Option<f64> {
    if !(y >= 0.0) || !y.is_finite() {
        return None;
    }
    let dist = Poisson::new(mu).ok()?;
    let k = y.floor() as u64;
    let upper = dist.cdf(k);
    let lower = if k == 0 { 0.0 } else { dist.cdf(k - 1) };

    let u = lower + (upper - lower) * uniform;
    if !(u > 0.0 && u < 1.0) {
        return None;
    }
    let r = Normal::new(0.0, 1.0).ok()?.inverse_cdf(u);
    r.is_finite().then_some(r)
}

/// Randomized quantile residuals for Poisson responses `y` at means `mu`.
///
/// One uniform is drawn per observation, in order, whether or not the
/// observation ends up using the fallback. Both the quantile residuals and
/// the fallback ignore prior weights, so substituted entries share the scale
/// of the rest.
pub fn randomized_quantile_residuals<R: Rng + ?Sized>(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    fallback: ResidualFallback,
    rng: &mut R,
) -> QuantileResiduals {
    let mut residuals = Array1::zeros(y.len());
    let mut substituted = Vec::new();

    for i in 0..y.len() {
        let uniform: f64 = rng.gen();
        match poisson_quantile_residual(y[i], mu[i], uniform) {
            Some(r) => residuals[i] = r,
            None => substituted.push(i),
        }
    }

    if !substituted.is_empty() {
        let classical = match fallback {
            ResidualFallback::Deviance => resid_deviance(y, mu, &PoissonFamily, None),
            ResidualFallback::Pearson => resid_pearson(y, mu, &PoissonFamily, None),
        };
        for &i in &substituted {
            residuals[i] = classical[i];
        }
        log::debug!(
            "{} of {} quantile residuals replaced by {:?} residuals",
            substituted.len(),
            y.len(),
            fallback
        );
    }

    QuantileResiduals { residuals, substituted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_single_residual_inside_cdf_step() {
        // y = 0, μ = 1: u ∈ [0, e⁻¹); midpoint u = e⁻¹/2
        let u_mid = (-1.0f64).exp() / 2.0;
        let r = poisson_quantile_residual(0.0, 1.0, 0.5).unwrap();
        let expected = Normal::new(0.0, 1.0).unwrap().inverse_cdf(u_mid);
        assert_abs_diff_eq!(r, expected, epsilon = 1e-12);
        assert!(r < 0.0);
    }

    #[test]
    fn test_median_draw_gives_zero() {
        // Φ⁻¹(0.5) = 0: pick y, μ and the draw so u lands on 0.5
        let dist = Poisson::new(2.0).unwrap();
        let (a, b) = (dist.cdf(1), dist.cdf(2));
        let uniform = (0.5 - a) / (b - a);
        let r = poisson_quantile_residual(2.0, 2.0, uniform).unwrap();
        assert_abs_diff_eq!(r, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_extreme_tail_is_undefined() {
        // F(59; 0.5) rounds to 1, F(0; 800) rounds to 0
        assert!(poisson_quantile_residual(60.0, 0.5, 0.3).is_none());
        assert!(poisson_quantile_residual(0.0, 800.0, 0.3).is_none());
    }

    #[test]
    fn test_fallback_uses_deviance_residual() {
        let y = array![60.0, 1.0, 0.0];
        let mu = array![0.5, 1.0, 800.0];
        let mut rng = StdRng::seed_from_u64(3);

        let res = randomized_quantile_residuals(&y, &mu, ResidualFallback::Deviance, &mut rng);
        let dev = resid_deviance(&y, &mu, &PoissonFamily, None);

        assert_eq!(res.substituted, vec![0, 2]);
        assert_abs_diff_eq!(res.residuals[0], dev[0], epsilon = 1e-12);
        assert_abs_diff_eq!(res.residuals[2], dev[2], epsilon = 1e-12);
        assert!(res.residuals[0] > 0.0 && res.residuals[2] < 0.0);
        assert!(res.residuals.iter().all(|r| r.is_finite()));
    }

    #[test]
    fn test_fallback_pearson() {
        let y = array![60.0];
        let mu = array![0.5];
        let mut rng = StdRng::seed_from_u64(3);
        let res = randomized_quantile_residuals(&y, &mu, ResidualFallback::Pearson, &mut rng);
        assert_abs_diff_eq!(res.residuals[0], 59.5 / 0.5f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_different_sources_differ_on_ties() {
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0];
        let mu = Array1::from_elem(5, 0.8);

        let a = randomized_quantile_residuals(&y, &mu, ResidualFallback::Deviance, &mut StdRng::seed_from_u64(1));
        let b = randomized_quantile_residuals(&y, &mu, ResidualFallback::Deviance, &mut StdRng::seed_from_u64(2));

        assert!(a.substituted.is_empty());
        assert_ne!(a.residuals, b.residuals);
        // tied counts no longer share a residual
        assert_ne!(a.residuals[0], a.residuals[1]);
    }
}
