// =============================================================================
// ndarray ↔ nalgebra Conversion
// =============================================================================
//
// Data lives in ndarray throughout the library; the factorizations come from
// nalgebra. The weighted least-squares solver crosses that boundary once per
// IRLS iteration, through the helpers below.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Convert an ndarray matrix to a nalgebra `DMatrix` (row-major read).
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    v.iter().copied().collect()
}

/// Solve A·x = b for symmetric A and also return A⁻¹.
///
/// Cholesky first; LU plus explicit inverse when A is not numerically
/// positive definite. `None` if A is singular.
pub fn solve_and_invert(a: &Array2<f64>, b: &Array1<f64>) -> Option<(Array1<f64>, Array2<f64>)> {
    let p = a.nrows();
    let a_nalg = to_dmatrix(a);
    let b_nalg = to_dvector(b);

    if let Some(chol) = a_nalg.clone().cholesky() {
        let solution = chol.solve(&b_nalg);
        let inverse = chol.solve(&DMatrix::identity(p, p));
        return Some((to_array1(&solution), to_array2(&inverse)));
    }

    let solution = a_nalg.clone().lu().solve(&b_nalg)?;
    let inverse = a_nalg.try_inverse()?;
    Some((to_array1(&solution), to_array2(&inverse)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_matrix_roundtrip() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(to_array2(&to_dmatrix(&a)), a);
    }

    #[test]
    fn test_vector_roundtrip() {
        let v = array![1.0, -2.0, 3.5];
        assert_eq!(to_array1(&to_dvector(&v)), v);
    }

    #[test]
    fn test_solve_and_invert_spd() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![5.0, 4.0];
        let (x, inv) = solve_and_invert(&a, &b).unwrap();
        assert!((4.0 * x[0] + x[1] - 5.0).abs() < 1e-10);
        assert!((x[0] + 3.0 * x[1] - 4.0).abs() < 1e-10);
        let id = a.dot(&inv);
        assert!((id[[0, 0]] - 1.0).abs() < 1e-10);
        assert!(id[[0, 1]].abs() < 1e-10);
    }

    #[test]
    fn test_solve_and_invert_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(solve_and_invert(&a, &array![1.0, 2.0]).is_none());
    }
}
