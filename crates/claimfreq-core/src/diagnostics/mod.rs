// =============================================================================
// Model Diagnostics
// =============================================================================
//
// Tools for judging a fitted claim-frequency model:
//
// - RESIDUALS: response, Pearson, deviance, working, and randomized quantile
//   residuals (the only ones that look normal for low-count data)
// - DISPERSION: Pearson and deviance estimates of φ
// - MODEL FIT: log-likelihood, AIC, BIC, null deviance
// - HOLD-OUT LOSS: MSE, RMSE, MAE, mean Poisson deviance on new data
//
// STATSMODELS COMPATIBILITY:
// --------------------------
// Residual names follow statsmodels: resid_response, resid_pearson,
// resid_deviance, resid_working.
//
// =============================================================================

mod dispersion;
mod loss;
mod model_fit;
mod quantile;
mod residuals;

pub use residuals::{resid_deviance, resid_pearson, resid_response, resid_working};

pub use quantile::{
    poisson_quantile_residual, randomized_quantile_residuals, QuantileResiduals, ResidualFallback,
};

pub use dispersion::{estimate_dispersion_deviance, estimate_dispersion_pearson, pearson_chi2};

pub use model_fit::{aic, bic, log_likelihood_poisson, null_deviance};

pub use loss::{mae, mean_poisson_deviance, mse, rmse};
