// =============================================================================
// Statistical Inference
// =============================================================================
//
// Tests and intervals for individual coefficients.
//
// FOR ACTUARIES:
// --------------
// With a log link, a coefficient β for "region = North" means North's claim
// frequency is exp(β) times the reference region's. A 95% interval
// [l, u] on β becomes [exp(l), exp(u)] on that relativity.
//
// Poisson fixes φ = 1, so coefficients are tested against the standard
// normal (z). Quasi-Poisson estimates φ, so they are tested against
// Student's t with df_resid degrees of freedom.
//
// =============================================================================

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Above this many degrees of freedom t and z are indistinguishable.
const T_AS_NORMAL_DF: f64 = 1000.0;

/// Two-sided p-value for a z statistic.
pub fn pvalue_z(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * (1.0 - normal.cdf(z.abs())),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value for a t statistic with `df` degrees of freedom.
pub fn pvalue_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() || !(df > 0.0) {
        return f64::NAN;
    }
    if df > T_AS_NORMAL_DF {
        return pvalue_z(t);
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Normal-theory interval `estimate ± z_{(1+confidence)/2} × std_error`.
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite()
        || !std_error.is_finite()
        || std_error <= 0.0
        || !(confidence > 0.0 && confidence < 1.0)
    {
        return (f64::NAN, f64::NAN);
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => {
            let margin = normal.inverse_cdf(0.5 + confidence / 2.0) * std_error;
            (estimate - margin, estimate + margin)
        }
        Err(_) => (f64::NAN, f64::NAN),
    }
}

pub fn confidence_interval_t(estimate: f64, std_error: f64, df: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite()
        || !std_error.is_finite()
        || std_error <= 0.0
        || !(df > 0.0)
        || !(confidence > 0.0 && confidence < 1.0)
    {
        return (f64::NAN, f64::NAN);
    }
    if df > T_AS_NORMAL_DF {
        return confidence_interval_z(estimate, std_error, confidence);
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => {
            let margin = dist.inverse_cdf(0.5 + confidence / 2.0) * std_error;
            (estimate - margin, estimate + margin)
        }
        Err(_) => (f64::NAN, f64::NAN),
    }
}

/// R-style significance codes.
pub fn significance_stars(pvalue: f64) -> &'static str {
    match pvalue {
        p if p < 0.001 => "***",
        p if p < 0.01 => "**",
        p if p < 0.05 => "*",
        p if p < 0.1 => ".",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_pvalue_z_known_values() {
        assert_abs_diff_eq!(pvalue_z(0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pvalue_z(1.96), 0.05, epsilon = 1e-3);
        assert_abs_diff_eq!(pvalue_z(-2.5), pvalue_z(2.5), epsilon = 1e-15);
        assert!(pvalue_z(f64::NAN).is_nan());
    }

    #[test]
    fn test_pvalue_t_heavier_tails() {
        assert!(pvalue_t(2.0, 5.0) > pvalue_z(2.0));
        assert_abs_diff_eq!(pvalue_t(2.0, 5000.0), pvalue_z(2.0), epsilon = 1e-12);
        assert!(pvalue_t(2.0, 0.0).is_nan());
    }

    #[test]
    fn test_confidence_interval_z() {
        let (lo, hi) = confidence_interval_z(1.0, 0.5, 0.95);
        assert_abs_diff_eq!(lo, 1.0 - 1.959964 * 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(hi, 1.0 + 1.959964 * 0.5, epsilon = 1e-5);
        assert!(confidence_interval_z(1.0, 0.0, 0.95).0.is_nan());
    }

    #[test]
    fn test_normal_quantities_match_tables() {
        assert_abs_diff_eq!(pvalue_z(1.959964), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(pvalue_z(2.575829), 0.01, epsilon = 1e-6);
        let (lo, hi) = confidence_interval_z(0.0, 1.0, 0.90);
        assert_abs_diff_eq!(hi, 1.644854, epsilon = 1e-5);
        assert_abs_diff_eq!(lo, -hi, epsilon = 1e-12);
    }

    #[test]
    fn test_confidence_level_out_of_range() {
        assert!(confidence_interval_z(1.0, 0.5, 1.5).0.is_nan());
        assert!(confidence_interval_z(1.0, 0.5, 0.0).1.is_nan());
        assert!(confidence_interval_t(1.0, 0.5, 4.0, 1.0).0.is_nan());
    }

    #[test]
    fn test_confidence_interval_t_wider() {
        let (lo_t, hi_t) = confidence_interval_t(0.0, 1.0, 4.0, 0.95);
        let (lo_z, hi_z) = confidence_interval_z(0.0, 1.0, 0.95);
        assert!(hi_t - lo_t > hi_z - lo_z);
        // t_{0.975, 4} = 2.776
        assert_abs_diff_eq!(hi_t, 2.776445, epsilon = 1e-4);
    }

    #[test]
    fn test_significance_stars() {
        assert_eq!(significance_stars(0.0001), "***");
        assert_eq!(significance_stars(0.005), "**");
        assert_eq!(significance_stars(0.03), "*");
        assert_eq!(significance_stars(0.08), ".");
        assert_eq!(significance_stars(0.5), "");
    }
}
