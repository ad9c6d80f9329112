//! Numeric guards shared by the families, the solver and the diagnostics.

/// Smallest mean the Poisson families will hand to `ln` or divide by.
pub const MU_MIN_POSITIVE: f64 = 1e-10;

/// Upper clip for IRLS working weights.
pub const MAX_IRLS_WEIGHT: f64 = 1e10;

/// Deviance below which the convergence check switches from relative to
/// absolute change.
pub const DEVIANCE_ZERO: f64 = 1e-10;

/// Linear predictor cap before exponentiation (exp(700) is still finite).
pub const ETA_MAX: f64 = 700.0;
