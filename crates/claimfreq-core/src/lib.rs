// =============================================================================
// claimfreq Core Library
// =============================================================================
//
// Poisson GLMs for insurance claim frequency, in pure Rust.
//
// STRUCTURE:
// ----------
//   - links:         Link functions (Log, Identity, Sqrt)
//   - families:      Poisson and quasi-Poisson
//   - solvers:       IRLS with offsets, prior weights and alias detection
//   - model:         The fitted model, coefficients, prediction
//   - diagnostics:   Residuals (incl. randomized quantile), dispersion, AIC/BIC
//   - inference:     p-values and confidence intervals
//   - formula:       R-style formula parsing
//   - design_matrix: Datasets, categorical encoding, interactions
//   - frequency:     Formula + data in, fitted frequency model out
//   - error:         Error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//
// =============================================================================

pub mod constants;
pub mod convert;
pub mod design_matrix;
pub mod diagnostics;
pub mod error;
pub mod families;
pub mod formula;
pub mod frequency;
pub mod inference;
pub mod links;
pub mod model;
pub mod solvers;

pub use design_matrix::{Column, Dataset, DesignMatrix, DesignSpec};
pub use diagnostics::{QuantileResiduals, ResidualFallback};
pub use error::{ClaimFreqError, Result};
pub use families::{Family, FamilyKind};
pub use formula::{parse_formula, ParsedFormula};
pub use frequency::{train_test_split, FrequencyModel, HoldoutMetrics};
pub use inference::{confidence_interval_t, confidence_interval_z, pvalue_t, pvalue_z};
pub use links::{Link, LinkFunction};
pub use model::{Coefficient, CoefficientSummary, FitWarning, FittedModel};
pub use solvers::{fit_glm, fit_glm_full, fit_poisson, IRLSConfig};
