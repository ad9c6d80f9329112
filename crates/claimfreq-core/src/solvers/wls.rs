// =============================================================================
// Rank-Revealing Weighted Least Squares
// =============================================================================
//
// Each IRLS iteration solves
//
//     minimize Σ wᵢ (zᵢ - xᵢ'β)²
//
// When two design columns are linearly dependent (an interaction level that
// never occurs, a numeric column that is a multiple of another, a full set of
// dummies next to the intercept) X'WX is singular and the plain normal
// equations have no unique solution.
//
// ALIASING
// --------
// We run a column-ordered Gram-Schmidt QR on √W·X. Column j is projected
// onto the orthogonal complement of the columns accepted before it; if what
// is left is negligible relative to the column's own norm, column j adds no
// new direction and is ALIASED. Its coefficient is reported as NA and it is
// dropped from the solve. Because columns are visited left to right, the
// later of two dependent columns is the one flagged, which is the pattern
// users know from R's `glm` summary ("1 not defined because of
// singularities").
//
// The surviving columns are full rank, so the reduced normal equations can
// be solved by Cholesky as usual.
//
// =============================================================================

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use crate::convert::solve_and_invert;
use crate::error::{ClaimFreqError, Result};

/// Output of one weighted least-squares solve over the full design.
#[derive(Debug, Clone)]
pub struct WlsSolution {
    /// One entry per design column; aliased columns hold 0.0.
    pub coefficients: Array1<f64>,

    /// `true` where the column was linearly dependent on earlier ones.
    pub aliased: Vec<bool>,

    /// Number of estimable columns.
    pub rank: usize,

    /// (X'WX)⁻¹ expanded back to p × p; NaN in aliased rows/columns.
    pub covariance_unscaled: Array2<f64>,
}

/// Flag columns of √W·X that are linear combinations of earlier columns.
///
/// A column is aliased when the norm of its residual after projection falls
/// to `tolerance` times its original norm or less. An all-zero column is
/// always aliased.
pub fn detect_aliased_columns(x: &Array2<f64>, sqrt_w: &Array1<f64>, tolerance: f64) -> Vec<bool> {
    let p = x.ncols();
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(p);
    let mut aliased = vec![false; p];

    for j in 0..p {
        let mut v: Array1<f64> = &x.column(j) * sqrt_w;
        let norm0 = v.dot(&v).sqrt();
        if !(norm0 > 0.0) {
            aliased[j] = true;
            continue;
        }

        // two passes of modified Gram-Schmidt keep the residual honest
        for _ in 0..2 {
            for q in &basis {
                let proj = q.dot(&v);
                v.scaled_add(-proj, q);
            }
        }

        let norm = v.dot(&v).sqrt();
        if norm <= tolerance * norm0 {
            aliased[j] = true;
        } else {
            v /= norm;
            basis.push(v);
        }
    }

    aliased
}

/// Compute X'WX, accumulating rows in parallel.
pub fn compute_xtwx(x: &Array2<f64>, w: &Array1<f64>) -> Array2<f64> {
    let p = x.ncols();

    let mut xtwx = (0..x.nrows())
        .into_par_iter()
        .with_min_len(512)
        .fold(
            || Array2::<f64>::zeros((p, p)),
            |mut acc, i| {
                let row = x.row(i);
                let wi = w[i];
                for a in 0..p {
                    let wa = wi * row[a];
                    if wa == 0.0 {
                        continue;
                    }
                    for b in a..p {
                        acc[[a, b]] += wa * row[b];
                    }
                }
                acc
            },
        )
        .reduce(|| Array2::<f64>::zeros((p, p)), |a, b| a + b);

    for a in 0..p {
        for b in 0..a {
            xtwx[[a, b]] = xtwx[[b, a]];
        }
    }
    xtwx
}

/// Solve the weighted least-squares problem, dropping aliased columns.
///
/// Fails with `SingularDesign` if the leading column is degenerate (nothing
/// can be estimated relative to it) and with `LinearAlgebraError` if the
/// reduced system still cannot be factorized.
pub fn solve_weighted_least_squares(
    x: &Array2<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
    rank_tolerance: f64,
) -> Result<WlsSolution> {
    let p = x.ncols();
    let sqrt_w = w.mapv(f64::sqrt);

    let aliased = detect_aliased_columns(x, &sqrt_w, rank_tolerance);
    if aliased.first().copied().unwrap_or(true) {
        return Err(ClaimFreqError::SingularDesign(
            "the leading design column is zero under the current weights".to_string(),
        ));
    }

    let kept: Vec<usize> = (0..p).filter(|&j| !aliased[j]).collect();
    let rank = kept.len();

    let x_kept = if rank == p { x.to_owned() } else { x.select(Axis(1), &kept) };
    let xtwx = compute_xtwx(&x_kept, w);
    let xtwz = x_kept.t().dot(&(w * z));

    let (beta_kept, inv_kept) = solve_and_invert(&xtwx, &xtwz).ok_or_else(|| {
        ClaimFreqError::LinearAlgebraError(
            "X'WX is singular even after removing aliased columns".to_string(),
        )
    })?;

    let mut coefficients = Array1::zeros(p);
    let mut covariance_unscaled = Array2::from_elem((p, p), f64::NAN);
    for (a, &ja) in kept.iter().enumerate() {
        coefficients[ja] = beta_kept[a];
        for (b, &jb) in kept.iter().enumerate() {
            covariance_unscaled[[ja, jb]] = inv_kept[[a, b]];
        }
    }

    Ok(WlsSolution {
        coefficients,
        aliased,
        rank,
        covariance_unscaled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_full_rank_matches_ols() {
        let x = array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]];
        let z = array![3.0, 5.0, 7.0, 9.0];
        let sol = solve_weighted_least_squares(&x, &z, &Array1::ones(4), 1e-11).unwrap();
        assert_eq!(sol.rank, 2);
        assert!(sol.aliased.iter().all(|&a| !a));
        assert_abs_diff_eq!(sol.coefficients[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(sol.coefficients[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_later_duplicate_column_is_aliased() {
        // third column = 2 × second column
        let x = array![[1.0, 1.0, 2.0], [1.0, 2.0, 4.0], [1.0, 3.0, 6.0], [1.0, 5.0, 10.0]];
        let aliased = detect_aliased_columns(&x, &Array1::ones(4), 1e-11);
        assert_eq!(aliased, vec![false, false, true]);
    }

    #[test]
    fn test_zero_column_is_aliased() {
        let x = array![[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 0.0, 2.0]];
        let sol = solve_weighted_least_squares(&x, &array![1.0, 2.0, 3.0], &Array1::ones(3), 1e-11)
            .unwrap();
        assert_eq!(sol.aliased, vec![false, true, false]);
        assert_eq!(sol.rank, 2);
        assert_eq!(sol.coefficients[1], 0.0);
        assert!(sol.covariance_unscaled[[1, 1]].is_nan());
        assert!(sol.covariance_unscaled[[0, 2]].is_finite());
    }

    #[test]
    fn test_dummies_summing_to_intercept() {
        // full dummy set alongside the intercept: last dummy is aliased
        let x = array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 1.0], [1.0, 0.0, 1.0]];
        let aliased = detect_aliased_columns(&x, &array![1.0, 2.0, 0.5, 3.0].mapv(f64::sqrt), 1e-11);
        assert_eq!(aliased, vec![false, false, true]);
    }

    #[test]
    fn test_degenerate_leading_column() {
        let x = array![[0.0, 1.0], [0.0, 2.0]];
        let err = solve_weighted_least_squares(&x, &array![1.0, 2.0], &Array1::ones(2), 1e-11)
            .unwrap_err();
        assert!(matches!(err, ClaimFreqError::SingularDesign(_)));
    }

    #[test]
    fn test_xtwx_symmetric() {
        let x = array![[1.0, 2.0], [1.0, -1.0], [1.0, 0.5]];
        let w = array![1.0, 2.0, 3.0];
        let m = compute_xtwx(&x, &w);
        assert_abs_diff_eq!(m[[0, 0]], 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[0, 1]], m[[1, 0]], epsilon = 1e-12);
        assert_abs_diff_eq!(m[[0, 1]], 2.0 - 2.0 + 1.5, epsilon = 1e-12);
    }
}
