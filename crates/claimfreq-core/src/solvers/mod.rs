// =============================================================================
// GLM Solvers
// =============================================================================
//
// Fitting a Poisson GLM means finding β such that
//
//     log(E[claims]) = Xβ + log(exposure)
//
// maximizes the Poisson likelihood. There is no closed form, so we use IRLS
// (Iteratively Reweighted Least Squares):
//   1. Linearize the problem around the current fitted means
//   2. Solve a weighted least squares problem (dropping aliased columns)
//   3. Update the means and repeat until the deviance stops moving
//
// =============================================================================

mod irls;
mod wls;

pub use irls::{fit_glm, fit_glm_full, fit_poisson, IRLSConfig};
pub use wls::{compute_xtwx, detect_aliased_columns, solve_weighted_least_squares, WlsSolution};

use ndarray::Array1;

use crate::families::Family;

/// Safe initialization of μ that works for any family.
///
/// Used when `family.initialize_mu(y)` produces invalid values (all-zero
/// claims give μ = 0 for Poisson).
pub(crate) fn initialize_mu_safe(y: &Array1<f64>, family: &dyn Family) -> Array1<f64> {
    let y_mean = y.mean().unwrap_or(1.0).max(0.01);
    let raw: Array1<f64> = y.mapv(|yi| (yi + y_mean) / 2.0);
    family.clamp_mu(&raw)
}
