// =============================================================================
// Link Functions
// =============================================================================
//
// The link g connects the mean of the response to the linear predictor:
//
//     g(μ) = η = Xβ + offset
//
// For claim counts the log link is the natural choice: it keeps μ positive
// and turns additive effects on η into multiplicative relativities on μ,
// which is exactly how rating factors are quoted. The identity and square
// root links are the other two links conventionally allowed for Poisson.
//
// IRLS only needs three things from a link: g, g⁻¹ and dη/dμ.
//
// =============================================================================

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::constants::{ETA_MAX, MU_MIN_POSITIVE};
use crate::error::{ClaimFreqError, Result};

/// A GLM link function η = g(μ).
pub trait Link: Send + Sync {
    fn name(&self) -> &str;

    /// η = g(μ)
    fn link(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// μ = g⁻¹(η)
    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64>;

    /// dη/dμ evaluated at μ.
    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64>;
}

/// Log link: η = log(μ). Canonical for Poisson.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLink;

impl Link for LogLink {
    fn name(&self) -> &str {
        "log"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_POSITIVE).ln())
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        // exp overflows to inf past ~709
        eta.mapv(|e| e.min(ETA_MAX).exp())
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| 1.0 / m.max(MU_MIN_POSITIVE))
    }
}

/// Identity link: η = μ.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLink;

impl Link for IdentityLink {
    fn name(&self) -> &str {
        "identity"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.clone()
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.clone()
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        Array1::ones(mu.len())
    }
}

/// Square-root link: η = √μ.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqrtLink;

impl Link for SqrtLink {
    fn name(&self) -> &str {
        "sqrt"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(0.0).sqrt())
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.mapv(|e| e * e)
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| 0.5 / m.max(MU_MIN_POSITIVE).sqrt())
    }
}

/// Serializable selector for a link, stored on fitted models so prediction
/// can apply the same inverse link later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFunction {
    #[default]
    Log,
    Identity,
    Sqrt,
}

impl LinkFunction {
    pub fn as_link(&self) -> &'static dyn Link {
        match self {
            LinkFunction::Log => &LogLink,
            LinkFunction::Identity => &IdentityLink,
            LinkFunction::Sqrt => &SqrtLink,
        }
    }

    /// Look up a link by the name its `Link::name` reports.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "log" => Ok(LinkFunction::Log),
            "identity" => Ok(LinkFunction::Identity),
            "sqrt" => Ok(LinkFunction::Sqrt),
            other => Err(ClaimFreqError::InvalidInput(format!(
                "unknown link '{}': expected log, identity or sqrt",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_log_link_roundtrip() {
        let mu = array![0.5, 1.0, 4.0];
        let eta = LogLink.link(&mu);
        let back = LogLink.inverse(&eta);
        for i in 0..3 {
            assert_abs_diff_eq!(back[i], mu[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_link_derivative_is_reciprocal() {
        let d = LogLink.derivative(&array![2.0, 0.25]);
        assert_abs_diff_eq!(d[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(d[1], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_link_inverse_does_not_overflow() {
        let mu = LogLink.inverse(&array![1e6]);
        assert!(mu[0].is_finite());
    }

    #[test]
    fn test_sqrt_link() {
        let mu = array![9.0];
        assert_abs_diff_eq!(SqrtLink.link(&mu)[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(SqrtLink.derivative(&mu)[0], 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_link_from_name() {
        assert_eq!(LinkFunction::from_name("Log").unwrap(), LinkFunction::Log);
        assert_eq!(LinkFunction::from_name("sqrt").unwrap().as_link().name(), "sqrt");
        assert!(LinkFunction::from_name("logit").is_err());
    }
}
