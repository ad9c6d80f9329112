// =============================================================================
// Distribution Families
// =============================================================================
//
// A family tells IRLS how the variance of the response depends on its mean
// and how to measure lack of fit (the deviance).
//
// FOR ACTUARIES:
// --------------
// Claim counts are modelled as Poisson: Var(Y) = μ. In practice claim data
// is often overdispersed (Var(Y) > μ). The quasi-Poisson family keeps the
// same mean model and the same coefficient estimates, but estimates a
// dispersion φ from the data, so standard errors grow by √φ.
//
//   | Family        | V(μ) | φ                  | Likelihood |
//   |---------------|------|--------------------|------------|
//   | Poisson       | μ    | 1 (fixed)          | yes        |
//   | QuasiPoisson  | μ    | Pearson X²/df      | no         |
//
// =============================================================================

mod poisson;

pub use poisson::{PoissonFamily, QuasiPoissonFamily};

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ClaimFreqError, Result};

/// A GLM response distribution.
pub trait Family: Send + Sync {
    fn name(&self) -> &str;

    /// Variance function V(μ).
    fn variance(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// Per-observation deviance contributions d(y, μ).
    fn unit_deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64>;

    /// Total deviance D = Σ wᵢ d(yᵢ, μᵢ).
    fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
        let unit = self.unit_deviance(y, mu);
        match weights {
            Some(w) => unit.iter().zip(w.iter()).map(|(&d, &wi)| wi * d).sum(),
            None => unit.sum(),
        }
    }

    /// Starting values for μ before the first IRLS step.
    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64>;

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool;

    /// Force μ back into the family's valid range.
    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// Reject responses outside the family's support.
    fn validate_response(&self, y: &Array1<f64>) -> Result<()>;

    /// True when φ is fixed at 1 rather than estimated.
    fn fixed_dispersion(&self) -> bool;

    /// Log-likelihood at μ; NaN for quasi families.
    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64;
}

/// Serializable selector for a family, stored on fitted models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    #[default]
    Poisson,
    QuasiPoisson,
}

impl FamilyKind {
    pub fn as_family(&self) -> &'static dyn Family {
        match self {
            FamilyKind::Poisson => &PoissonFamily,
            FamilyKind::QuasiPoisson => &QuasiPoissonFamily,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "poisson" => Ok(FamilyKind::Poisson),
            "quasipoisson" => Ok(FamilyKind::QuasiPoisson),
            other => Err(ClaimFreqError::InvalidInput(format!(
                "unknown family '{}': expected poisson or quasipoisson",
                other
            ))),
        }
    }
}
