use serde::{Deserialize, Serialize};

/// A single regression coefficient.
///
/// `Aliased` marks a design column that was a linear combination of earlier
/// columns. It has no estimate (R prints `NA`), contributes nothing to
/// predictions, and is still listed so reports line up with the design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Coefficient {
    Estimated(f64),
    Aliased,
}

impl Coefficient {
    pub fn value(&self) -> Option<f64> {
        match self {
            Coefficient::Estimated(v) => Some(*v),
            Coefficient::Aliased => None,
        }
    }

    pub fn is_aliased(&self) -> bool {
        matches!(self, Coefficient::Aliased)
    }

    /// Contribution weight for prediction: the estimate, or 0 if aliased.
    pub fn value_or_zero(&self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

/// Non-fatal conditions encountered during a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    /// The iteration cap was reached before the deviance settled; the
    /// model holds the last iterate.
    DidNotConverge { iterations: usize, relative_change: f64 },

    /// Design columns that were linearly dependent on earlier columns.
    Aliased { columns: Vec<usize> },
}

/// One row of a coefficient table.
///
/// Every statistic is `None` for an aliased coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSummary {
    pub name: String,
    pub estimate: Option<f64>,
    pub std_error: Option<f64>,
    /// z statistic for Poisson, t statistic for quasi-Poisson.
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    /// exp(estimate): the multiplicative effect on claim frequency.
    pub relativity: Option<f64>,
    pub significance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliased_contributes_zero() {
        assert_eq!(Coefficient::Aliased.value(), None);
        assert_eq!(Coefficient::Aliased.value_or_zero(), 0.0);
        assert_eq!(Coefficient::Estimated(0.4).value_or_zero(), 0.4);
        assert!(!Coefficient::Estimated(0.4).is_aliased());
    }
}
