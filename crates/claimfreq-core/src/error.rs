// =============================================================================
// Error Types
// =============================================================================
//
// Every fallible operation in the library returns `Result<T>`, which is
// `std::result::Result<T, ClaimFreqError>`.
//
// Two conditions that sound like errors are NOT errors here:
//   - Hitting the iteration cap: the fit is returned with a
//     `FitWarning::DidNotConverge` attached.
//   - Linearly dependent design columns: the affected coefficients come back
//     as `Coefficient::Aliased`.
//
// =============================================================================

use thiserror::Error;

/// Errors raised while validating inputs, building design matrices or fitting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClaimFreqError {
    /// Lengths or shapes of the inputs disagree.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An input has no rows or no columns.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Values outside the domain of the model (negative counts, non-positive
    /// weights, non-finite offsets, unseen factor levels, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The leading design column is degenerate, so not even an intercept
    /// can be estimated.
    #[error("singular design: {0}")]
    SingularDesign(String),

    /// A linear solve failed on the reduced (full-rank) system.
    #[error("linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// The model formula could not be parsed or refers to unusable columns.
    #[error("formula error: {0}")]
    Formula(String),
}

pub type Result<T> = std::result::Result<T, ClaimFreqError>;
